//! Parameter groups, one [`VarMap`] per network.
//!
//! Freezing a stage never touches the variables themselves: the set of groups handed to each
//! optimizer is decided once, when the trainer is built.
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use candle::{DType, Device, Tensor, Var};
use candle_nn::{VarBuilder, VarMap};
use vqgan_nn::ScheduledOptimizer;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Group {
    Downsample,
    MelEncoder,
    VqEncoder,
    SpeakerEncoder,
    Decoder,
    Generator,
    Discriminator,
}

impl Group {
    pub const ALL: [Group; 7] = [
        Group::Downsample,
        Group::MelEncoder,
        Group::VqEncoder,
        Group::SpeakerEncoder,
        Group::Decoder,
        Group::Generator,
        Group::Discriminator,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Downsample => "downsample",
            Self::MelEncoder => "mel_encoder",
            Self::VqEncoder => "vq_encoder",
            Self::SpeakerEncoder => "speaker_encoder",
            Self::Decoder => "decoder",
            Self::Generator => "generator",
            Self::Discriminator => "discriminator",
        }
    }
}

impl std::fmt::Display for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Groups handed to the generator side and the discriminator side optimizers of the
/// adversarial loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub generator: Vec<Group>,
    pub discriminator: Vec<Group>,
}

impl Partition {
    /// The speaker encoder is a fixed conditioning network in the adversarial loop and is never
    /// part of either side.
    pub fn vqgan(freeze_hifigan: bool, freeze_vq: bool) -> Self {
        let mut generator = vec![];
        if !freeze_vq {
            generator.extend([Group::Downsample, Group::MelEncoder, Group::VqEncoder]);
        }
        generator.push(Group::Decoder);
        let mut discriminator = vec![];
        if !freeze_hifigan {
            generator.push(Group::Generator);
            discriminator.push(Group::Discriminator);
        }
        Self {
            generator,
            discriminator,
        }
    }

    /// Single optimizer over the encoder side, the speaker encoder and the decoder, the vocoder
    /// stays fixed.
    pub fn naive() -> Vec<Group> {
        vec![
            Group::Downsample,
            Group::MelEncoder,
            Group::VqEncoder,
            Group::SpeakerEncoder,
            Group::Decoder,
        ]
    }
}

pub struct ParamGroups {
    maps: HashMap<Group, VarMap>,
    device: Device,
}

impl std::fmt::Debug for ParamGroups {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut groups = self.maps.keys().collect::<Vec<_>>();
        groups.sort();
        f.debug_struct("ParamGroups")
            .field("groups", &groups)
            .field("device", &self.device)
            .finish()
    }
}

impl ParamGroups {
    pub fn new(device: &Device) -> Self {
        Self {
            maps: HashMap::new(),
            device: device.clone(),
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Variable builder creating (or reusing) the variables of `group`.
    pub fn var_builder(&mut self, group: Group) -> VarBuilder<'static> {
        let varmap = self.maps.entry(group).or_insert_with(VarMap::new);
        VarBuilder::from_varmap(varmap, DType::F32, &self.device)
    }

    pub fn contains(&self, group: Group) -> bool {
        self.maps.contains_key(&group)
    }

    /// Variables of `group` sorted by name, empty when the group was never built.
    pub fn named_vars(&self, group: Group) -> Result<Vec<(String, Var)>> {
        let Some(varmap) = self.maps.get(&group) else {
            return Ok(vec![]);
        };
        let data = varmap
            .data()
            .lock()
            .map_err(|_| candle::Error::Msg(format!("{group} variables poisoned")))?;
        let mut vars = data
            .iter()
            .map(|(name, var)| (name.clone(), var.clone()))
            .collect::<Vec<_>>();
        vars.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(vars)
    }

    pub fn vars(&self, groups: &[Group]) -> Result<Vec<Var>> {
        let mut vars = vec![];
        for &group in groups {
            vars.extend(self.named_vars(group)?.into_iter().map(|(_, v)| v));
        }
        Ok(vars)
    }

    pub fn num_parameters(&self, group: Group) -> Result<usize> {
        Ok(self
            .named_vars(group)?
            .iter()
            .map(|(_, v)| v.elem_count())
            .sum())
    }

    /// Copies of the current values of `group`, keyed by variable name.
    pub fn snapshot(&self, group: Group) -> Result<HashMap<String, Tensor>> {
        self.named_vars(group)?
            .into_iter()
            .map(|(name, var)| Ok((name, var.as_tensor().copy()?)))
            .collect()
    }

    /// Writes every group to `<dir>/<group>.safetensors`, tagging each file with `state`.
    pub fn save<P: AsRef<Path>>(&self, dir: P, state: &CheckpointState) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        for &group in Group::ALL.iter().filter(|g| self.contains(**g)) {
            let vars = self.named_vars(group)?;
            let tensors = vars
                .iter()
                .map(|(name, var)| (name.as_str(), var.as_tensor()))
                .collect::<Vec<_>>();
            let mut metadata = state.to_metadata();
            metadata.insert("group".to_string(), group.name().to_string());
            let path = dir.join(format!("{group}.safetensors"));
            safetensors::serialize_to_file(tensors, Some(metadata), &path)?;
        }
        tracing::info!(?dir, global_step = state.global_step, "saved checkpoint");
        Ok(())
    }

    /// Restores every built group from `dir` and returns the state recorded in the files.
    pub fn load<P: AsRef<Path>>(&mut self, dir: P) -> Result<CheckpointState> {
        let dir = dir.as_ref();
        let mut state: Option<CheckpointState> = None;
        for &group in Group::ALL.iter() {
            let Some(varmap) = self.maps.get_mut(&group) else {
                continue;
            };
            let path = dir.join(format!("{group}.safetensors"));
            let bytes = std::fs::read(&path)?;
            let (_, metadata) = safetensors::SafeTensors::read_metadata(&bytes)?;
            let Some(file_state) = metadata
                .metadata()
                .as_ref()
                .and_then(CheckpointState::from_metadata)
            else {
                return Err(Error::Checkpoint {
                    path,
                    msg: "missing global_step metadata".to_string(),
                });
            };
            if let Some(s) = &state {
                if *s != file_state {
                    return Err(Error::Checkpoint {
                        path,
                        msg: format!(
                            "saved at step {}, other groups at step {}",
                            file_state.global_step, s.global_step
                        ),
                    });
                }
            }
            state = Some(file_state);
            varmap.load(&path)?;
        }
        let state = state.unwrap_or_default();
        tracing::info!(?dir, step = state.global_step, "loaded checkpoint");
        Ok(state)
    }
}

const OPTIMIZER_PREFIX: &str = "optimizer_steps.";

/// Training position stored next to the weights: the global step and how many scheduler steps
/// each named optimizer has taken.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointState {
    pub global_step: usize,
    pub optimizer_steps: BTreeMap<String, usize>,
}

impl CheckpointState {
    pub fn new(global_step: usize) -> Self {
        Self {
            global_step,
            optimizer_steps: BTreeMap::new(),
        }
    }

    pub fn with_optimizer(mut self, optimizer: &ScheduledOptimizer) -> Self {
        self.optimizer_steps
            .insert(optimizer.name().to_string(), optimizer.steps());
        self
    }

    /// Moves the schedule of `optimizer` to the recorded position, a checkpoint without an
    /// entry for it restarts the schedule.
    pub fn restore(&self, optimizer: &mut ScheduledOptimizer) {
        match self.optimizer_steps.get(optimizer.name()) {
            Some(&steps) => {
                let lr = optimizer.resume_at(steps);
                tracing::info!(optimizer = optimizer.name(), steps, lr, "restored schedule");
            }
            None => {
                optimizer.resume_at(0);
                tracing::warn!(
                    optimizer = optimizer.name(),
                    "checkpoint has no schedule position, starting from step 0"
                )
            }
        }
    }

    fn to_metadata(&self) -> HashMap<String, String> {
        let mut metadata = HashMap::from([(
            "global_step".to_string(),
            self.global_step.to_string(),
        )]);
        for (name, steps) in self.optimizer_steps.iter() {
            metadata.insert(format!("{OPTIMIZER_PREFIX}{name}"), steps.to_string());
        }
        metadata
    }

    fn from_metadata(metadata: &HashMap<String, String>) -> Option<Self> {
        let global_step = metadata.get("global_step")?.parse().ok()?;
        let mut optimizer_steps = BTreeMap::new();
        for (key, value) in metadata.iter() {
            if let Some(name) = key.strip_prefix(OPTIMIZER_PREFIX) {
                optimizer_steps.insert(name.to_string(), value.parse().ok()?);
            }
        }
        Some(Self {
            global_step,
            optimizer_steps,
        })
    }
}
