//! Learning rate schedules stepped once per optimizer step.
use serde::Deserialize;

/// The interface LR schedulers should implement.
pub trait LrScheduler: Send {
    /// Step the scheduler and return the new learning rate.
    fn step(&mut self) -> f64;

    /// Get the current learning rate.
    fn lr(&self) -> f64;
}

/// Keeps the learning rate untouched.
pub struct ConstantLr {
    lr: f64,
}

impl ConstantLr {
    pub fn new(lr: f64) -> Self {
        Self { lr }
    }
}

impl LrScheduler for ConstantLr {
    fn step(&mut self) -> f64 {
        self.lr
    }

    fn lr(&self) -> f64 {
        self.lr
    }
}

/// Decays the learning rate by gamma every step.
// https://pytorch.org/docs/stable/generated/torch.optim.lr_scheduler.ExponentialLR.html
pub struct ExponentialLr {
    gamma: f64,
    lr: f64,
}

impl ExponentialLr {
    pub fn new(gamma: f64, lr: f64) -> Self {
        Self { gamma, lr }
    }
}

impl LrScheduler for ExponentialLr {
    fn step(&mut self) -> f64 {
        self.lr *= self.gamma;
        self.lr
    }

    fn lr(&self) -> f64 {
        self.lr
    }
}

/// Decays the learning rate by gamma every `step_size` steps.
// https://pytorch.org/docs/stable/generated/torch.optim.lr_scheduler.StepLR.html
pub struct StepLr {
    step_size: usize,
    last_step: usize,
    gamma: f64,
    lr: f64,
}

impl StepLr {
    pub fn new(step_size: usize, gamma: f64, lr: f64) -> Self {
        Self {
            step_size: step_size.max(1),
            last_step: 0,
            gamma,
            lr,
        }
    }
}

impl LrScheduler for StepLr {
    fn step(&mut self) -> f64 {
        self.last_step += 1;
        if self.last_step % self.step_size == 0 {
            self.lr *= self.gamma;
        }
        self.lr
    }

    fn lr(&self) -> f64 {
        self.lr
    }
}

/// Linear warmup from zero to the base rate followed by a cosine decay to `final_lr_ratio * base`.
pub struct WarmupCosineLr {
    base_lr: f64,
    warmup_steps: usize,
    total_steps: usize,
    final_lr_ratio: f64,
    last_step: usize,
    lr: f64,
}

impl WarmupCosineLr {
    pub fn new(base_lr: f64, warmup_steps: usize, total_steps: usize, final_lr_ratio: f64) -> Self {
        let mut s = Self {
            base_lr,
            warmup_steps,
            total_steps: total_steps.max(warmup_steps + 1),
            final_lr_ratio,
            last_step: 0,
            lr: 0.,
        };
        s.lr = s.lr_at(0);
        s
    }

    fn lr_at(&self, step: usize) -> f64 {
        if step < self.warmup_steps {
            return self.base_lr * step as f64 / self.warmup_steps.max(1) as f64;
        }
        let progress = (step - self.warmup_steps) as f64 / (self.total_steps - self.warmup_steps) as f64;
        let cosine = 0.5 * (1. + (std::f64::consts::PI * progress.min(1.)).cos());
        self.base_lr * (self.final_lr_ratio + (1. - self.final_lr_ratio) * cosine)
    }
}

impl LrScheduler for WarmupCosineLr {
    fn step(&mut self) -> f64 {
        self.last_step += 1;
        self.lr = self.lr_at(self.last_step);
        self.lr
    }

    fn lr(&self) -> f64 {
        self.lr
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulerConfig {
    Constant,
    Exponential {
        gamma: f64,
    },
    Step {
        step_size: usize,
        gamma: f64,
    },
    WarmupCosine {
        warmup_steps: usize,
        total_steps: usize,
        #[serde(default)]
        final_lr_ratio: f64,
    },
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::Exponential { gamma: 0.999999 }
    }
}

impl SchedulerConfig {
    pub fn build(&self, base_lr: f64) -> Box<dyn LrScheduler> {
        match *self {
            Self::Constant => Box::new(ConstantLr::new(base_lr)),
            Self::Exponential { gamma } => Box::new(ExponentialLr::new(gamma, base_lr)),
            Self::Step { step_size, gamma } => Box::new(StepLr::new(step_size, gamma, base_lr)),
            Self::WarmupCosine {
                warmup_steps,
                total_steps,
                final_lr_ratio,
            } => Box::new(WarmupCosineLr::new(
                base_lr,
                warmup_steps,
                total_steps,
                final_lr_ratio,
            )),
        }
    }
}
