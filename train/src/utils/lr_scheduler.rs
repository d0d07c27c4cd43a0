use crate::{common::*, config::LearningRateSchedule};

/// Produces the learning rate of every optimization step.
#[derive(Debug, Clone)]
pub enum LrScheduler {
    Constant {
        lr: R64,
    },
    StepWise {
        lr_cache: f64,
        step: usize,
        index: usize,
        steps: Vec<(usize, R64)>,
    },
    InverseTimeDecay {
        init_lr: f64,
        decay: f64,
        step: usize,
    },
}

impl LrScheduler {
    pub fn new(
        config: &LearningRateSchedule,
        epochs: usize,
        init_step: impl Into<Option<usize>>,
    ) -> Result<Self> {
        let init_step = init_step.into();

        let mut scheduler = match *config {
            LearningRateSchedule::Constant { lr } => {
                ensure!(lr >= 0.0, "the lr must be positive");
                Self::Constant { lr }
            }
            LearningRateSchedule::StepWise { ref steps } => {
                ensure!(
                    !steps.is_empty() && steps[0].0 == 0,
                    "the steps must start from zero"
                );

                steps.iter().try_fold(None, |prev_step, (curr_step, lr)| {
                    if let Some(prev_step) = prev_step {
                        ensure!(curr_step > prev_step, "the steps must be monotonic");
                    }
                    ensure!(lr.raw() > 0.0, "lr must be positive");
                    Ok(Some(curr_step))
                })?;

                Self::StepWise {
                    lr_cache: steps[0].1.raw(),
                    step: 0,
                    index: 0,
                    steps: steps.clone(),
                }
            }
            LearningRateSchedule::InverseTimeDecay { lr, decay } => {
                ensure!(lr > 0.0, "the lr must be positive");
                ensure!(epochs > 0, "the number of epochs must be positive");
                let decay = decay
                    .map(|decay| decay.raw())
                    .unwrap_or_else(|| lr.raw() / epochs as f64);
                ensure!(decay >= 0.0, "the decay must be non-negative");

                Self::InverseTimeDecay {
                    init_lr: lr.raw(),
                    decay,
                    step: 0,
                }
            }
        };

        if let Some(init_step) = init_step {
            scheduler.set_step(init_step);
        }

        Ok(scheduler)
    }

    pub fn set_step(&mut self, new_step: usize) {
        match self {
            Self::StepWise {
                step,
                index,
                steps,
                lr_cache,
            } => {
                *step = new_step;
                let new_index = match steps
                    .binary_search_by_key(&new_step, |(step_thresh, _lr)| *step_thresh)
                {
                    Ok(new_index) => new_index,
                    Err(new_index) => new_index.saturating_sub(1),
                };
                *index = new_index;
                *lr_cache = steps[new_index].1.raw();
            }
            Self::InverseTimeDecay { step, .. } => {
                *step = new_step;
            }
            Self::Constant { .. } => (),
        }
    }

    /// The learning rate of the current step.
    pub fn lr(&self) -> f64 {
        match *self {
            Self::Constant { lr } => lr.raw(),
            Self::StepWise { lr_cache, .. } => lr_cache,
            Self::InverseTimeDecay {
                init_lr,
                decay,
                step,
            } => init_lr / (1.0 + decay * step as f64),
        }
    }

    /// Returns the learning rate of the current step and advances by one step.
    pub fn next(&mut self) -> f64 {
        match self {
            Self::Constant { lr } => lr.raw(),
            Self::StepWise {
                step,
                index,
                steps,
                lr_cache,
            } => {
                let lr = steps[*index].1.raw();
                *step += 1;
                let next_index = *index + 1;
                if next_index < steps.len() && *step == steps[next_index].0 {
                    *index = next_index;
                }
                *lr_cache = lr;
                lr
            }
            Self::InverseTimeDecay {
                init_lr,
                decay,
                step,
            } => {
                let lr = *init_lr / (1.0 + *decay * *step as f64);
                *step += 1;
                lr
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn step_wise_schedule() -> Result<()> {
        let config = LearningRateSchedule::StepWise {
            steps: vec![(0, r64(0.1)), (2, r64(0.01)), (4, r64(0.001))],
        };
        let mut scheduler = LrScheduler::new(&config, 1, None)?;
        let lrs: Vec<_> = (0..5).map(|_| scheduler.next()).collect();
        assert_eq!(lrs, [0.1, 0.1, 0.01, 0.01, 0.001]);

        let scheduler = LrScheduler::new(&config, 1, 3)?;
        assert_abs_diff_eq!(scheduler.lr(), 0.01);
        Ok(())
    }

    #[test]
    fn step_wise_rejects_unordered_steps() {
        let config = LearningRateSchedule::StepWise {
            steps: vec![(0, r64(0.1)), (5, r64(0.01)), (3, r64(0.001))],
        };
        assert!(LrScheduler::new(&config, 1, None).is_err());
    }

    #[test]
    fn inverse_time_decay_defaults_to_lr_over_epochs() -> Result<()> {
        let config = LearningRateSchedule::InverseTimeDecay {
            lr: r64(1e-4),
            decay: None,
        };
        let mut scheduler = LrScheduler::new(&config, 20, None)?;
        assert_abs_diff_eq!(scheduler.next(), 1e-4);

        let decay = 1e-4 / 20.0;
        assert_abs_diff_eq!(scheduler.next(), 1e-4 / (1.0 + decay), epsilon = 1e-12);

        scheduler.set_step(1000);
        assert_abs_diff_eq!(scheduler.lr(), 1e-4 / (1.0 + decay * 1000.0), epsilon = 1e-12);
        Ok(())
    }
}
