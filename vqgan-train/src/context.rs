use candle::Device;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::logger::LogSink;

/// Everything a step needs besides the model: where to log, where to run, which step it is and
/// the random source for segment sampling.
pub struct TrainingContext {
    pub logger: Box<dyn LogSink>,
    pub device: Device,
    pub global_step: usize,
    pub epoch: usize,
    pub rng: StdRng,
}

impl TrainingContext {
    pub fn new(logger: Box<dyn LogSink>, device: Device, seed: u64) -> Self {
        Self {
            logger,
            device,
            global_step: 0,
            epoch: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl std::fmt::Debug for TrainingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainingContext")
            .field("device", &self.device)
            .field("global_step", &self.global_step)
            .field("epoch", &self.epoch)
            .finish()
    }
}
