//! Reconstruction-only loop: encoder, quantizer, speaker encoder and decoder learn to rebuild
//! the mel, the vocoder is fixed and only renders validation audio.
use candle::{Device, IndexOp, Tensor};
use vqgan_models::{Generator, Vocoder};
use vqgan_nn::loss::masked_l1_loss;
use vqgan_nn::{ScheduledOptimizer, UpdateReport};

use crate::params::{CheckpointState, Group, ParamGroups, Partition};
use crate::plot::plot_mels;
use crate::stack::CodecStack;
use crate::{Batch, Error, Result, TrainingContext, VqganConfig};

/// Losses of one [`VqNaiveTrainer::training_step`], `loss` still attached to the graph.
#[derive(Debug, Clone)]
pub struct NaiveStepOutput {
    pub loss: Tensor,
    pub loss_mel: f64,
    pub loss_vq: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NaiveStepReport {
    pub loss: f64,
    pub update: UpdateReport,
    pub lr: f64,
}

pub struct VqNaiveTrainer {
    config: VqganConfig,
    stack: CodecStack,
    vocoder: Box<dyn Vocoder>,
    groups: ParamGroups,
    optimizer: ScheduledOptimizer,
}

impl std::fmt::Debug for VqNaiveTrainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VqNaiveTrainer")
            .field("groups", &self.groups)
            .field("optimizer", &self.optimizer)
            .finish()
    }
}

impl VqNaiveTrainer {
    /// Builds the reference networks described by `config.model`.
    pub fn new(config: VqganConfig, device: &Device) -> Result<Self> {
        config.validate()?;
        let mut groups = ParamGroups::new(device);
        let stack = CodecStack::new(config.mel.clone(), &config.model, &mut groups)?;
        let vocoder = Generator::new(
            config.model.n_mels,
            &config.model.generator,
            groups.var_builder(Group::Generator),
        )?;
        Self::from_parts(config, stack, Box::new(vocoder), groups)
    }

    /// Assembles a trainer around networks built by the caller, the vocoder is never trained.
    pub fn from_parts(
        config: VqganConfig,
        stack: CodecStack,
        vocoder: Box<dyn Vocoder>,
        groups: ParamGroups,
    ) -> Result<Self> {
        if vocoder.upsample_factor() != stack.hop_length() {
            return Err(Error::InvalidConfig(format!(
                "vocoder upsamples by {} but mel frames are {} samples apart",
                vocoder.upsample_factor(),
                stack.hop_length()
            )));
        }
        let optimizer = ScheduledOptimizer::new(
            "vq",
            groups.vars(&Partition::naive())?,
            &config.optimizer,
            &config.scheduler,
        )?;
        tracing::info!(
            trainable = optimizer.vars().len(),
            vocoder_parameters = groups.num_parameters(Group::Generator)?,
            "naive trainer"
        );
        Ok(Self {
            config,
            stack,
            vocoder,
            groups,
            optimizer,
        })
    }

    pub fn groups(&self) -> &ParamGroups {
        &self.groups
    }

    /// Loads the fixed vocoder weights from a generator checkpoint file.
    pub fn load_vocoder<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let tensors = candle::safetensors::load(path, self.groups.device())?;
        for (name, var) in self.groups.named_vars(Group::Generator)? {
            match tensors.get(&name) {
                Some(t) => var.set(t)?,
                None => {
                    return Err(Error::Checkpoint {
                        path: path.to_path_buf(),
                        msg: format!("missing vocoder tensor {name}"),
                    })
                }
            }
        }
        Ok(())
    }

    pub fn optimizer(&self) -> &ScheduledOptimizer {
        &self.optimizer
    }

    pub fn save_checkpoint<P: AsRef<std::path::Path>>(&self, dir: P, step: usize) -> Result<()> {
        let state = CheckpointState::new(step).with_optimizer(&self.optimizer);
        self.groups.save(dir, &state)
    }

    /// Restores the weights and the LR schedule, returns the global step to resume from.
    pub fn load_checkpoint<P: AsRef<std::path::Path>>(&mut self, dir: P) -> Result<usize> {
        let state = self.groups.load(dir)?;
        state.restore(&mut self.optimizer);
        Ok(state.global_step)
    }

    /// Computes and logs the reconstruction loss, the caller runs the update.
    pub fn training_step(&self, batch: &Batch, ctx: &mut TrainingContext) -> Result<NaiveStepOutput> {
        let step = ctx.global_step;
        let batch = &batch.to_device(&ctx.device)?;
        let encoded = self.stack.encode(batch)?;
        let speaker = self.stack.speaker_embedding(&encoded)?;
        let decoded_mels = self.stack.decode(&encoded, speaker.as_ref())?;
        let loss_mel = masked_l1_loss(&encoded.gt_mels, &decoded_mels, &encoded.mel_mask)?;
        let loss = (&loss_mel + &encoded.quantized.loss)?;

        let output = NaiveStepOutput {
            loss_mel: loss_mel.to_scalar::<f32>()? as f64,
            loss_vq: encoded.quantized.loss.to_scalar::<f32>()? as f64,
            loss,
        };
        let logger = &mut ctx.logger;
        logger.log_scalar("train/generator/loss", output.loss.to_scalar::<f32>()? as f64, step)?;
        logger.log_scalar("train/loss_mel", output.loss_mel, step)?;
        logger.log_scalar("train/generator/loss_vq", output.loss_vq, step)?;
        Ok(output)
    }

    /// [`Self::training_step`] followed by one clipped update and one scheduler step.
    pub fn fit_step(&mut self, batch: &Batch, ctx: &mut TrainingContext) -> Result<NaiveStepReport> {
        let output = self.training_step(batch, ctx)?;
        let update = self
            .optimizer
            .backward_step(&output.loss, self.config.grad_clip)?;
        let lr = self.optimizer.step_scheduler();
        let loss = output.loss.to_scalar::<f32>()? as f64;
        tracing::debug!(step = ctx.global_step, loss, lr, "train step");
        ctx.global_step += 1;
        Ok(NaiveStepReport { loss, update, lr })
    }

    /// Logs the mel loss of the decoded mel, a two panel plot and a pair of clips per example.
    pub fn validation_step(&self, batch: &Batch, ctx: &mut TrainingContext) -> Result<f64> {
        let step = ctx.global_step;
        let batch = &batch.to_device(&ctx.device)?;
        let encoded = self.stack.encode(batch)?;
        let speaker = self.stack.speaker_embedding(&encoded)?;
        let decoded_mels = self.stack.decode(&encoded, speaker.as_ref())?.detach();
        let fake_audios = self.vocoder.forward(&decoded_mels)?.detach();
        let mel_loss = masked_l1_loss(&encoded.gt_mels, &decoded_mels, &encoded.mel_mask)?
            .to_scalar::<f32>()? as f64;
        ctx.logger.log_scalar("val/mel_loss", mel_loss, step)?;

        let frames = encoded.gt_mels.dim(2)?;
        let sample_rate = self.config.sample_rate as u32;
        for (idx, &audio_len) in batch.audio_lengths().iter().enumerate() {
            let mel_len = encoded.mel_lengths[idx].max(1).min(frames);
            let mels = [&decoded_mels, &encoded.gt_mels]
                .iter()
                .map(|m| m.i(idx)?.narrow(1, 0, mel_len))
                .collect::<candle::Result<Vec<_>>>()?;
            let (image, caption) = plot_mels(&mels, &["Generated", "Ground-Truth"])?;
            ctx.logger
                .log_image(&format!("sample-{idx}/mels"), &image, &caption, step)?;

            let gt = batch.audios().i(idx)?.narrow(0, 0, audio_len)?.to_vec1::<f32>()?;
            let fake_len = audio_len.min(fake_audios.dim(2)?);
            let prediction = fake_audios.i((idx, 0))?.narrow(0, 0, fake_len)?.to_vec1::<f32>()?;
            ctx.logger
                .log_audio(&format!("sample-{idx}/wavs/gt"), &gt, sample_rate, step)?;
            ctx.logger.log_audio(
                &format!("sample-{idx}/wavs/prediction"),
                &prediction,
                sample_rate,
                step,
            )?;
        }
        tracing::info!(step, mel_loss, "validation");
        Ok(mel_loss)
    }
}
