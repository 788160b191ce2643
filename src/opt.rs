//! Gradient-based optimisation: an exponential learning-rate schedule and a
//! bias-corrected adaptive-moment descent loop over a caller-supplied loss.

use anyhow::bail;
use tracing::debug;

/// Learning rate decaying geometrically from `lr_start` at the first step to `lr_end` at
/// the last.
#[derive(Clone, Debug, PartialEq)]
pub struct ExponentialSchedule {
    pub lr_start: f64,
    pub lr_end: f64,
    pub steps: u64,
}
impl ExponentialSchedule {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.lr_start <= 0.0 || self.lr_end <= 0.0 {
            bail!("learning rates must be positive");
        }
        if self.steps == 0 {
            bail!("at least one step must be scheduled");
        }
        Ok(())
    }

    pub fn learning_rate(&self, step: u64) -> f64 {
        let last = self.steps - 1;
        if step < last {
            self.lr_start * (self.lr_end / self.lr_start).powf(step as f64 / last as f64)
        } else {
            // covers the degenerate single-step schedule, where no decay is possible
            self.lr_end
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AdamConfig {
    pub schedule: ExponentialSchedule,
    pub beta_1: f64,
    pub beta_2: f64,
    pub epsilon: f64,
    /// Log progress every this many steps; 0 disables.
    pub verbose_every: u64,
}
impl AdamConfig {
    pub fn with_schedule(schedule: ExponentialSchedule) -> Self {
        Self {
            schedule,
            beta_1: 0.9,
            beta_2: 0.999,
            epsilon: 1e-8,
            verbose_every: 0,
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.schedule.validate()?;
        if !(0.0..1.0).contains(&self.beta_1) || !(0.0..1.0).contains(&self.beta_2) {
            bail!("moment decay rates must lie in [0, 1)");
        }
        if self.epsilon <= 0.0 {
            bail!("epsilon must be positive");
        }
        Ok(())
    }
}

/// One recorded optimisation step.
#[derive(Clone, Debug, PartialEq)]
pub struct TracePoint {
    pub iteration: u64,
    pub loss: f64,
}

/// Minimises `loss_f` over `params` in place, taking one bias-corrected adaptive-moment
/// step per scheduled iteration. `loss_f` evaluates the loss at the supplied parameters
/// and writes its gradient over the second argument. Returns the per-iteration loss
/// trace. Iterations are strictly sequential: each step consumes the parameters the
/// previous one produced.
pub fn adam_descent(
    config: &AdamConfig,
    params: &mut [f64],
    mut loss_f: impl FnMut(&[f64], &mut [f64]) -> f64,
) -> Vec<TracePoint> {
    config.validate().unwrap();

    let mut grad = vec![0.0; params.len()];
    let mut first_moments = vec![0.0; params.len()];
    let mut second_moments = vec![0.0; params.len()];
    let mut trace = Vec::with_capacity(config.schedule.steps as usize);

    for step in 0..config.schedule.steps {
        let loss = loss_f(params, &mut grad);
        let learning_rate = config.schedule.learning_rate(step);
        let correction_1 = 1.0 - config.beta_1.powi(step as i32 + 1);
        let correction_2 = 1.0 - config.beta_2.powi(step as i32 + 1);

        for (index, param) in params.iter_mut().enumerate() {
            let first = &mut first_moments[index];
            let second = &mut second_moments[index];
            *first = config.beta_1 * *first + (1.0 - config.beta_1) * grad[index];
            *second = config.beta_2 * *second + (1.0 - config.beta_2) * grad[index] * grad[index];
            let corrected_first = *first / correction_1;
            let corrected_second = *second / correction_2;
            *param -= learning_rate * corrected_first / (corrected_second.sqrt() + config.epsilon);
        }

        if config.verbose_every != 0 && step % config.verbose_every == 0 {
            debug!(
                "step {step}/{}: loss {loss:.6}, lr {learning_rate:.6}",
                config.schedule.steps
            );
        }
        trace.push(TracePoint {
            iteration: step,
            loss,
        });
    }
    trace
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_float_eq::*;

    fn schedule(lr_start: f64, lr_end: f64, steps: u64) -> ExponentialSchedule {
        ExponentialSchedule {
            lr_start,
            lr_end,
            steps,
        }
    }

    #[test]
    fn schedule_endpoints() {
        let schedule = schedule(0.1, 0.001, 1000);
        assert_float_absolute_eq!(0.1, schedule.learning_rate(0), 1e-15);
        assert_float_absolute_eq!(0.001, schedule.learning_rate(999), 1e-15);
        assert!(schedule.learning_rate(500) < schedule.learning_rate(499));
    }

    #[test]
    fn schedule_is_monotonic() {
        let schedule = schedule(0.2, 0.002, 50);
        let mut previous = f64::MAX;
        for step in 0..50 {
            let lr = schedule.learning_rate(step);
            assert!(lr < previous, "lr rose at step {step}");
            previous = lr;
        }
    }

    #[test]
    fn single_step_schedule_degenerates_to_lr_end() {
        assert_eq!(0.001, schedule(0.1, 0.001, 1).learning_rate(0));
    }

    #[test]
    fn invalid_configs_rejected() {
        assert!(schedule(0.0, 0.001, 10).validate().is_err());
        assert!(schedule(0.1, 0.001, 0).validate().is_err());
        let mut config = AdamConfig::with_schedule(schedule(0.1, 0.001, 10));
        assert!(config.validate().is_ok());
        config.beta_2 = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn descends_a_quadratic_bowl() {
        // (x−3)² + (y+1)²: minimum at (3, −1)
        let config = AdamConfig::with_schedule(schedule(0.2, 0.001, 800));
        let mut params = vec![0.0, 0.0];
        let trace = adam_descent(&config, &mut params, |params, grad| {
            grad[0] = 2.0 * (params[0] - 3.0);
            grad[1] = 2.0 * (params[1] + 1.0);
            (params[0] - 3.0).powi(2) + (params[1] + 1.0).powi(2)
        });
        assert_eq!(800, trace.len());
        assert_eq!(0, trace[0].iteration);
        assert_eq!(799, trace[799].iteration);
        assert!(trace[799].loss < trace[0].loss);
        assert_float_absolute_eq!(3.0, params[0], 1e-2);
        assert_float_absolute_eq!(-1.0, params[1], 1e-2);
    }
}
