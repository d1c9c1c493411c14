//! Adversarial training loop: a generator side and a discriminator side optimizer stepped by
//! hand every batch.
use candle::{Device, IndexOp, Module, Tensor};
use vqgan_models::{Discriminator, EnsembleDiscriminator, Generator, Vocoder};
use vqgan_nn::loss::{discriminator_loss, feature_loss, generator_loss, masked_l1_loss};
use vqgan_nn::{rand_slice_segments, slice_segments, ScheduledOptimizer};

use crate::params::{CheckpointState, Group, ParamGroups, Partition};
use crate::plot::plot_mels;
use crate::stack::CodecStack;
use crate::{Batch, Error, Result, TrainingContext, VqganConfig};

/// Scalars produced by one [`VqganTrainer::train_step`].
#[derive(Debug, Clone, PartialEq)]
pub struct VqganStepReport {
    pub loss: f64,
    /// `None` in stage 1, when the discriminator is not trained.
    pub loss_discriminator: Option<f64>,
    pub loss_decoded_mel: f64,
    pub loss_mel: f64,
    pub loss_fm: f64,
    pub loss_adv: f64,
    pub loss_vq: f64,
    pub skipped_generator: bool,
    pub skipped_discriminator: bool,
}

pub struct VqganTrainer {
    config: VqganConfig,
    stack: CodecStack,
    generator: Box<dyn Vocoder>,
    discriminator: Box<dyn Discriminator>,
    groups: ParamGroups,
    partition: Partition,
    optim_g: ScheduledOptimizer,
    optim_d: ScheduledOptimizer,
}

impl std::fmt::Debug for VqganTrainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VqganTrainer")
            .field("partition", &self.partition)
            .field("optim_g", &self.optim_g)
            .field("optim_d", &self.optim_d)
            .finish()
    }
}

impl VqganTrainer {
    /// Builds the reference networks described by `config.model`.
    pub fn new(config: VqganConfig, device: &Device) -> Result<Self> {
        config.validate()?;
        let mut groups = ParamGroups::new(device);
        let stack = CodecStack::new(config.mel.clone(), &config.model, &mut groups)?;
        let generator = Generator::new(
            config.model.n_mels,
            &config.model.generator,
            groups.var_builder(Group::Generator),
        )?;
        let discriminator = EnsembleDiscriminator::new(
            &config.model.discriminator,
            groups.var_builder(Group::Discriminator),
        )?;
        Self::from_parts(
            config,
            stack,
            Box::new(generator),
            Box::new(discriminator),
            groups,
        )
    }

    /// Assembles a trainer around networks built by the caller. Their variables must live in
    /// `groups` under the matching [`Group`] for the optimizers to pick them up.
    pub fn from_parts(
        config: VqganConfig,
        stack: CodecStack,
        generator: Box<dyn Vocoder>,
        discriminator: Box<dyn Discriminator>,
        groups: ParamGroups,
    ) -> Result<Self> {
        if generator.upsample_factor() != stack.hop_length() {
            return Err(Error::InvalidConfig(format!(
                "vocoder upsamples by {} but mel frames are {} samples apart",
                generator.upsample_factor(),
                stack.hop_length()
            )));
        }
        let partition = Partition::vqgan(config.freeze_hifigan, config.freeze_vq);
        let optim_g = ScheduledOptimizer::new(
            "generator",
            groups.vars(&partition.generator)?,
            &config.optimizer,
            &config.scheduler,
        )?;
        let optim_d = ScheduledOptimizer::new(
            "discriminator",
            groups.vars(&partition.discriminator)?,
            &config.optimizer,
            &config.scheduler,
        )?;
        for group in Group::ALL.iter().filter(|g| groups.contains(**g)) {
            tracing::info!(
                group = group.name(),
                parameters = groups.num_parameters(*group)?,
                generator_side = partition.generator.contains(group),
                discriminator_side = partition.discriminator.contains(group),
                "parameter group"
            );
        }
        Ok(Self {
            config,
            stack,
            generator,
            discriminator,
            groups,
            partition,
            optim_g,
            optim_d,
        })
    }

    pub fn config(&self) -> &VqganConfig {
        &self.config
    }

    pub fn groups(&self) -> &ParamGroups {
        &self.groups
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn generator_optimizer(&self) -> &ScheduledOptimizer {
        &self.optim_g
    }

    pub fn discriminator_optimizer(&self) -> &ScheduledOptimizer {
        &self.optim_d
    }

    /// Saves the weights together with the position of both LR schedules.
    pub fn save_checkpoint<P: AsRef<std::path::Path>>(&self, dir: P, step: usize) -> Result<()> {
        let state = CheckpointState::new(step)
            .with_optimizer(&self.optim_g)
            .with_optimizer(&self.optim_d);
        self.groups.save(dir, &state)
    }

    /// Restores the weights and the LR schedules, returns the global step to resume from.
    pub fn load_checkpoint<P: AsRef<std::path::Path>>(&mut self, dir: P) -> Result<usize> {
        let state = self.groups.load(dir)?;
        state.restore(&mut self.optim_g);
        state.restore(&mut self.optim_d);
        Ok(state.global_step)
    }

    pub fn train_step(
        &mut self,
        batch: &Batch,
        ctx: &mut TrainingContext,
    ) -> Result<VqganStepReport> {
        let step = ctx.global_step;
        let clip = self.config.grad_clip;
        let batch = &batch.to_device(&ctx.device)?;

        let encoded = self.stack.encode(batch)?;
        let speaker = self.stack.speaker_embedding(&encoded)?;
        let decoded_mels = self.stack.decode(&encoded, speaker.as_ref())?;
        let fake_audios = self.generator.forward(&decoded_mels)?;

        let audios = batch.audios().unsqueeze(1)?;
        let (y, starts) = rand_slice_segments(
            &audios,
            batch.audio_lengths(),
            self.config.segment_size,
            &mut ctx.rng,
        )?;
        let y_hat = slice_segments(&fake_audios, &starts, self.config.segment_size)?;
        if y.dims() != y_hat.dims() {
            return Err(Error::SegmentShapeMismatch {
                real: y.dims().to_vec(),
                generated: y_hat.dims().to_vec(),
            });
        }
        let fake_mels = self.stack.mel_transform.forward(&fake_audios.squeeze(1)?)?;

        let mut loss_discriminator = None;
        let mut skipped_discriminator = false;
        if !self.config.freeze_hifigan {
            let out = self.discriminator.forward(&y, &y_hat.detach())?;
            let loss = discriminator_loss(&out.real_scores, &out.fake_scores)?;
            let report = self.optim_d.backward_step(&loss.total, clip)?;
            skipped_discriminator = !report.applied;
            let loss = loss.total.to_scalar::<f32>()? as f64;
            ctx.logger.log_scalar("train/discriminator/loss", loss, step)?;
            loss_discriminator = Some(loss);
        }

        let out = self.discriminator.forward(&y, &y_hat)?;
        let mel_mask = &encoded.mel_mask;
        let loss_decoded_mel = masked_l1_loss(&encoded.gt_mels, &decoded_mels, mel_mask)?;
        let loss_mel = masked_l1_loss(&encoded.gt_mels, &fake_mels, mel_mask)?;
        let (loss_adv, _) = generator_loss(&out.fake_scores)?;
        let loss_fm = feature_loss(&out.real_fmaps, &out.fake_fmaps)?;
        let loss_vq = &encoded.quantized.loss;
        let loss = if self.config.freeze_hifigan {
            (&loss_decoded_mel + loss_vq)?
        } else {
            ((((&loss_mel * 45.)? + (loss_vq * 45.)?)? + &loss_fm)? + &loss_adv)?
        };
        let report = self.optim_g.backward_step(&loss, clip)?;

        self.optim_g.step_scheduler();
        self.optim_d.step_scheduler();

        let scalar = |t: &Tensor| -> Result<f64> { Ok(t.to_scalar::<f32>()? as f64) };
        let report = VqganStepReport {
            loss: scalar(&loss)?,
            loss_discriminator,
            loss_decoded_mel: scalar(&loss_decoded_mel)?,
            loss_mel: scalar(&loss_mel)?,
            loss_fm: scalar(&loss_fm)?,
            loss_adv: scalar(&loss_adv)?,
            loss_vq: scalar(loss_vq)?,
            skipped_generator: !report.applied,
            skipped_discriminator,
        };
        let logger = &mut ctx.logger;
        logger.log_scalar("train/generator/loss", report.loss, step)?;
        logger.log_scalar("train/generator/loss_decoded_mel", report.loss_decoded_mel, step)?;
        logger.log_scalar("train/generator/loss_mel", report.loss_mel, step)?;
        logger.log_scalar("train/generator/loss_fm", report.loss_fm, step)?;
        logger.log_scalar("train/generator/loss_adv", report.loss_adv, step)?;
        logger.log_scalar("train/generator/loss_vq", report.loss_vq, step)?;
        tracing::debug!(
            step,
            loss = report.loss,
            loss_discriminator = ?report.loss_discriminator,
            lr = self.optim_g.learning_rate(),
            "train step"
        );
        ctx.global_step += 1;
        Ok(report)
    }

    /// Runs the full pipeline without updating anything and logs the mel loss, one mel plot and
    /// one pair of clips per example. Returns the mel loss.
    pub fn validation_step(&self, batch: &Batch, ctx: &mut TrainingContext) -> Result<f64> {
        let step = ctx.global_step;
        let batch = &batch.to_device(&ctx.device)?;
        let encoded = self.stack.encode(batch)?;
        let speaker = self.stack.speaker_embedding(&encoded)?;
        let decoded_mels = self.stack.decode(&encoded, speaker.as_ref())?.detach();
        let fake_audios = self.generator.forward(&decoded_mels)?.detach();
        let fake_mels = self
            .stack
            .mel_transform
            .forward(&fake_audios.squeeze(1)?)?
            .detach();

        let min_len = decoded_mels
            .dim(2)?
            .min(encoded.gt_mels.dim(2)?)
            .min(fake_mels.dim(2)?);
        let gt_mels = encoded.gt_mels.narrow(2, 0, min_len)?;
        let decoded_mels = decoded_mels.narrow(2, 0, min_len)?;
        let fake_mels = fake_mels.narrow(2, 0, min_len)?;
        let mel_mask = encoded.mel_mask.narrow(2, 0, min_len)?;
        let mel_loss = masked_l1_loss(&gt_mels, &fake_mels, &mel_mask)?.to_scalar::<f32>()? as f64;
        ctx.logger.log_scalar("val/mel_loss", mel_loss, step)?;

        let sample_rate = self.config.sample_rate as u32;
        for (idx, &audio_len) in batch.audio_lengths().iter().enumerate() {
            let mel_len = encoded.mel_lengths[idx].max(1).min(min_len);
            let mels = [&fake_mels, &decoded_mels, &gt_mels]
                .iter()
                .map(|m| m.i(idx)?.narrow(1, 0, mel_len))
                .collect::<candle::Result<Vec<_>>>()?;
            let (image, caption) = plot_mels(&mels, &["Generated", "Decoded", "Ground-Truth"])?;
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
