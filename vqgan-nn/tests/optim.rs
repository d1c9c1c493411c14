use anyhow::Result;
use candle::{Device, Tensor, Var};
use vqgan_nn::scheduler::{ExponentialLr, LrScheduler, StepLr, WarmupCosineLr};
use vqgan_nn::{clip_grad_norm, grad_norm, OptimizerConfig, ScheduledOptimizer, SchedulerConfig};

#[test]
fn clip_rescales_only_the_group() -> Result<()> {
    let cpu = Device::Cpu;
    let a = Var::new(&[0f32, 0.], &cpu)?;
    let b = Var::new(&[0f32], &cpu)?;
    // d/da = [3, 4], d/db = [10]
    let loss = ((a.as_tensor() * &Tensor::new(&[3f32, 4.], &cpu)?)?.sum_all()?
        + (b.as_tensor() * 10.)?.sum_all()?)?;
    let mut grads = loss.backward()?;
    assert_eq!(grad_norm(&grads, &[a.clone()])?, 5.);
    let norm = clip_grad_norm(&mut grads, &[a.clone()], 1.)?;
    assert_eq!(norm, 5.);
    let ga = grads.get(&a).unwrap().to_vec1::<f32>()?;
    assert!((ga[0] - 0.6).abs() < 1e-5 && (ga[1] - 0.8).abs() < 1e-5);
    assert_eq!(grads.get(&b).unwrap().to_vec1::<f32>()?, [10.]);

    // Already below the threshold: untouched.
    let norm = clip_grad_norm(&mut grads, &[b.clone()], 100.)?;
    assert_eq!(norm, 10.);
    assert_eq!(grads.get(&b).unwrap().to_vec1::<f32>()?, [10.]);
    Ok(())
}

#[test]
fn non_finite_gradients_skip_the_update() -> Result<()> {
    let cpu = Device::Cpu;
    let x = Var::new(&[1f32, 4.], &cpu)?;
    let mut opt = ScheduledOptimizer::new(
        "test",
        vec![x.clone()],
        &OptimizerConfig::default(),
        &SchedulerConfig::Constant,
    )?;
    // sqrt'(0) is infinite.
    let loss = (x.as_tensor() - 1.)?.sqrt()?.sum_all()?;
    let report = opt.backward_step(&loss, 1.)?;
    assert!(!report.applied);
    assert!(!report.grad_norm.is_finite());
    assert_eq!(x.to_vec1::<f32>()?, [1., 4.]);

    let loss = x.as_tensor().sqr()?.sum_all()?;
    let report = opt.backward_step(&loss, 1.)?;
    assert!(report.applied);
    assert_ne!(x.to_vec1::<f32>()?, [1., 4.]);
    Ok(())
}

#[test]
fn optimizers_leave_foreign_vars_alone() -> Result<()> {
    let cpu = Device::Cpu;
    let mine = Var::new(&[1f32], &cpu)?;
    let other = Var::new(&[1f32], &cpu)?;
    let mut opt = ScheduledOptimizer::new(
        "mine",
        vec![mine.clone()],
        &OptimizerConfig::default(),
        &SchedulerConfig::Constant,
    )?;
    let loss = (mine.as_tensor() * other.as_tensor())?.sum_all()?;
    opt.backward_step(&loss, 1.)?;
    assert_ne!(mine.to_vec1::<f32>()?, [1.]);
    assert_eq!(other.to_vec1::<f32>()?, [1.]);
    Ok(())
}

#[test]
fn scheduler_drives_the_learning_rate() -> Result<()> {
    let cpu = Device::Cpu;
    let x = Var::new(&[1f32], &cpu)?;
    let config = OptimizerConfig {
        lr: 1.,
        ..Default::default()
    };
    let mut opt = ScheduledOptimizer::new(
        "x",
        vec![x],
        &config,
        &SchedulerConfig::Exponential { gamma: 0.5 },
    )?;
    assert_eq!(opt.learning_rate(), 1.);
    assert_eq!(opt.step_scheduler(), 0.5);
    assert_eq!(opt.step_scheduler(), 0.25);
    assert_eq!(opt.learning_rate(), 0.25);
    assert_eq!(opt.steps(), 2);
    Ok(())
}

#[test]
fn schedules() {
    let mut s = ExponentialLr::new(0.9, 1.);
    s.step();
    assert!((s.lr() - 0.9).abs() < 1e-12);

    let mut s = StepLr::new(2, 0.1, 1.);
    let lrs = (0..4).map(|_| s.step()).collect::<Vec<_>>();
    assert!((lrs[0] - 1.).abs() < 1e-12 && (lrs[1] - 0.1).abs() < 1e-12);
    assert!((lrs[3] - 0.01).abs() < 1e-12);

    let mut s = WarmupCosineLr::new(1., 2, 4, 0.);
    assert_eq!(s.lr(), 0.);
    assert!((s.step() - 0.5).abs() < 1e-12);
    assert!((s.step() - 1.).abs() < 1e-12);
    assert!((s.step() - 0.5).abs() < 1e-12);
    assert!(s.step().abs() < 1e-12);
    assert!(s.step().abs() < 1e-12);
}

#[test]
fn scheduler_config_from_json() -> Result<()> {
    let cfg: SchedulerConfig = serde_json::from_str(r#"{"type": "step", "step_size": 10, "gamma": 0.5}"#)?;
    assert_eq!(
        cfg,
        SchedulerConfig::Step {
            step_size: 10,
            gamma: 0.5
        }
    );
    let cfg: SchedulerConfig = serde_json::from_str(r#"{"type": "constant"}"#)?;
    assert_eq!(cfg.build(3e-4).lr(), 3e-4);
    Ok(())
}

#[test]
fn resuming_replays_the_schedule() -> Result<()> {
    let cpu = Device::Cpu;
    let schedule = SchedulerConfig::WarmupCosine {
        warmup_steps: 4,
        total_steps: 10,
        final_lr_ratio: 0.,
    };
    let config = OptimizerConfig {
        lr: 1e-3,
        ..OptimizerConfig::default()
    };
    let mut trained = ScheduledOptimizer::new("g", vec![Var::new(&[0f32], &cpu)?], &config, &schedule)?;
    for _ in 0..6 {
        trained.step_scheduler();
    }
    let mut resumed = ScheduledOptimizer::new("g", vec![Var::new(&[0f32], &cpu)?], &config, &schedule)?;
    assert_eq!(resumed.learning_rate(), 0.);
    let lr = resumed.resume_at(6);
    assert_eq!(resumed.steps(), 6);
    assert_eq!(lr, trained.learning_rate());

    // Rewinding restarts the schedule.
    assert_eq!(trained.resume_at(2), 1e-3 * 2. / 4.);
    assert_eq!(trained.steps(), 2);
    Ok(())
}
