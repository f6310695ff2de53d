//! Simulation runner and result recording.

use tracing::{debug, warn};

use crate::error::{SimError, SimResult};
use crate::integrator::{ForwardEuler, Integrator, RK4};
use crate::model::TransientModel;

/// Integrator selection for simulation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IntegratorType {
    /// 4th-order Runge-Kutta (default, 4 rhs calls per step).
    #[default]
    RK4,
    /// Forward Euler (1st-order, 1 rhs call per step).
    ForwardEuler,
}

/// Options for simulation runs.
#[derive(Clone, Debug)]
pub struct SimOptions {
    /// Fixed time step (seconds). The last step is shortened to land on `t_end`.
    pub dt: f64,
    /// Final simulation time (seconds)
    pub t_end: f64,
    /// Maximum number of steps (safety limit)
    pub max_steps: usize,
    /// Record every N-th step (decimation)
    pub record_every: usize,
    pub integrator: IntegratorType,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            dt: 1e-3,
            t_end: 1.0,
            max_steps: 100_000,
            record_every: 10,
            integrator: IntegratorType::default(),
        }
    }
}

/// Recorded trajectory. The first and last samples are always present.
#[derive(Clone, Debug)]
pub struct SimRecord<S> {
    pub t: Vec<f64>,
    pub x: Vec<S>,
}

impl<S> SimRecord<S> {
    pub fn last(&self) -> Option<(f64, &S)> {
        Some((*self.t.last()?, self.x.last()?))
    }
}

/// Integrate `model` from `t = 0` to `opts.t_end`.
pub fn run_sim<M: TransientModel>(
    model: &mut M,
    opts: &SimOptions,
) -> SimResult<SimRecord<M::State>> {
    if !(opts.dt.is_finite() && opts.dt > 0.0) {
        return Err(SimError::InvalidArg {
            what: "dt must be positive",
        });
    }
    if !(opts.t_end.is_finite() && opts.t_end >= 0.0) {
        return Err(SimError::InvalidArg {
            what: "t_end must be non-negative",
        });
    }
    if opts.max_steps == 0 {
        return Err(SimError::InvalidArg {
            what: "max_steps must be positive",
        });
    }
    if opts.record_every == 0 {
        return Err(SimError::InvalidArg {
            what: "record_every must be positive",
        });
    }

    // Steps shorter than this fraction of dt are absorbed into the previous one.
    let slack = 1e-9 * opts.dt;
    let mut t = 0.0;
    let mut x = model.initial_state()?;
    let mut record = SimRecord {
        t: vec![t],
        x: vec![x.clone()],
    };

    let mut step = 0;
    while t < opts.t_end - slack {
        if step == opts.max_steps {
            warn!(t, max_steps = opts.max_steps, "simulation stopped at step limit");
            break;
        }
        let remaining = opts.t_end - t;
        let h = if remaining < opts.dt + slack {
            remaining
        } else {
            opts.dt
        };
        x = match opts.integrator {
            IntegratorType::RK4 => RK4.step(model, t, &x, h)?,
            IntegratorType::ForwardEuler => ForwardEuler.step(model, t, &x, h)?,
        };
        t += h;
        step += 1;

        if step % opts.record_every == 0 {
            record.t.push(t);
            record.x.push(x.clone());
        }
    }

    if step % opts.record_every != 0 {
        record.t.push(t);
        record.x.push(x);
    }
    debug!(steps = step, t, "simulation finished");
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `x_dot = 1`
    struct Clock;

    impl TransientModel for Clock {
        type State = f64;

        fn initial_state(&self) -> SimResult<f64> {
            Ok(0.0)
        }

        fn rhs(&mut self, _t: f64, _x: &f64) -> SimResult<f64> {
            Ok(1.0)
        }

        fn add(&self, a: &f64, b: &f64) -> f64 {
            a + b
        }

        fn scale(&self, a: &f64, scale: f64) -> f64 {
            a * scale
        }
    }

    #[test]
    fn sim_options_defaults() {
        let opts = SimOptions::default();
        assert_eq!(opts.dt, 1e-3);
        assert_eq!(opts.t_end, 1.0);
        assert_eq!(opts.max_steps, 100_000);
        assert_eq!(opts.record_every, 10);
        assert_eq!(opts.integrator, IntegratorType::RK4);
    }

    #[test]
    fn invalid_options_are_rejected() {
        for opts in [
            SimOptions {
                dt: 0.0,
                ..SimOptions::default()
            },
            SimOptions {
                t_end: -1.0,
                ..SimOptions::default()
            },
            SimOptions {
                record_every: 0,
                ..SimOptions::default()
            },
        ] {
            assert!(matches!(
                run_sim(&mut Clock, &opts),
                Err(SimError::InvalidArg { .. })
            ));
        }
    }

    #[test]
    fn last_step_lands_on_t_end() {
        let opts = SimOptions {
            dt: 0.1,
            t_end: 0.25,
            record_every: 1,
            integrator: IntegratorType::ForwardEuler,
            ..SimOptions::default()
        };
        let record = run_sim(&mut Clock, &opts).unwrap();
        assert_eq!(record.t.len(), 4);
        let (t, x) = record.last().unwrap();
        assert!((t - 0.25).abs() < 1e-15);
        assert!((x - 0.25).abs() < 1e-15);
    }

    #[test]
    fn decimation_keeps_first_and_last() {
        let opts = SimOptions {
            dt: 0.1,
            t_end: 1.0,
            record_every: 3,
            ..SimOptions::default()
        };
        let record = run_sim(&mut Clock, &opts).unwrap();
        // steps 3, 6, 9, plus initial and final (step 10)
        assert_eq!(record.t.len(), 5);
        assert!((record.t[4] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn step_limit_truncates() {
        let opts = SimOptions {
            dt: 0.1,
            t_end: 1.0,
            max_steps: 2,
            record_every: 1,
            ..SimOptions::default()
        };
        let record = run_sim(&mut Clock, &opts).unwrap();
        assert_eq!(record.t.len(), 3);
    }
}
