//! An AdamW optimizer bound to one parameter group and paired with its own LR schedule.
use candle::backprop::GradStore;
use candle::{Result, Tensor, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use serde::Deserialize;

use crate::scheduler::{LrScheduler, SchedulerConfig};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    pub weight_decay: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            lr: 2e-4,
            beta1: 0.8,
            beta2: 0.99,
            eps: 1e-5,
            weight_decay: 0.01,
        }
    }
}

impl OptimizerConfig {
    pub fn params(&self) -> ParamsAdamW {
        ParamsAdamW {
            lr: self.lr,
            beta1: self.beta1,
            beta2: self.beta2,
            eps: self.eps,
            weight_decay: self.weight_decay,
        }
    }
}

/// Outcome of one clipped update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateReport {
    /// Total gradient norm of the group, measured before clipping.
    pub grad_norm: f64,
    /// `false` when the update was skipped because the norm was not finite.
    pub applied: bool,
}

pub struct ScheduledOptimizer {
    name: &'static str,
    vars: Vec<Var>,
    optimizer: AdamW,
    schedule: SchedulerConfig,
    base_lr: f64,
    scheduler: Box<dyn LrScheduler>,
    steps: usize,
}

impl std::fmt::Debug for ScheduledOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledOptimizer")
            .field("name", &self.name)
            .field("vars", &self.vars.len())
            .field("lr", &self.scheduler.lr())
            .field("steps", &self.steps)
            .finish()
    }
}

impl ScheduledOptimizer {
    pub fn new(
        name: &'static str,
        vars: Vec<Var>,
        config: &OptimizerConfig,
        schedule: &SchedulerConfig,
    ) -> Result<Self> {
        let scheduler = schedule.build(config.lr);
        let params = ParamsAdamW {
            lr: scheduler.lr(),
            ..config.params()
        };
        let optimizer = AdamW::new(vars.clone(), params)?;
        Ok(Self {
            name,
            vars,
            optimizer,
            schedule: schedule.clone(),
            base_lr: config.lr,
            scheduler,
            steps: 0,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn vars(&self) -> &[Var] {
        &self.vars
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn learning_rate(&self) -> f64 {
        self.optimizer.learning_rate()
    }

    /// Number of scheduler steps taken so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Runs a fresh backward pass on `loss`, clips this group's gradients and applies the update.
    pub fn backward_step(&mut self, loss: &Tensor, max_norm: f64) -> Result<UpdateReport> {
        let mut grads = loss.backward()?;
        self.clip_and_step(&mut grads, max_norm)
    }

    /// Clips the gradients of this group to `max_norm` and applies the update.
    ///
    /// Gradients held in `grads` for variables outside of the group are ignored.
    pub fn clip_and_step(&mut self, grads: &mut GradStore, max_norm: f64) -> Result<UpdateReport> {
        let grad_norm = crate::grad::clip_grad_norm(grads, &self.vars, max_norm)?;
        if !grad_norm.is_finite() {
            tracing::warn!(
                optimizer = self.name,
                grad_norm,
                "non-finite gradient norm, skipping update"
            );
            return Ok(UpdateReport {
                grad_norm,
                applied: false,
            });
        }
        self.optimizer.step(grads)?;
        Ok(UpdateReport {
            grad_norm,
            applied: true,
        })
    }

    /// Advances the LR schedule by one step and pushes the new rate to the optimizer.
    pub fn step_scheduler(&mut self) -> f64 {
        let lr = self.scheduler.step();
        self.optimizer.set_learning_rate(lr);
        self.steps += 1;
        lr
    }

    /// Restarts the LR schedule and replays it for `steps` scheduler steps, used when resuming
    /// a run. The AdamW moments are not part of a checkpoint and keep their current values.
    pub fn resume_at(&mut self, steps: usize) -> f64 {
        self.scheduler = self.schedule.build(self.base_lr);
        self.optimizer.set_learning_rate(self.scheduler.lr());
        self.steps = 0;
        while self.steps < steps {
            self.step_scheduler();
        }
        self.learning_rate()
    }
}
