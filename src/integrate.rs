//! Driving increments across a sequence of target times.
//!
//! Every accepted step is written to a [`StateWriter`] together with its time,
//! fluid state and fluid properties, so state `n` of the store is the state
//! after `n` accepted steps. Reaching a target time additionally records the
//! index of the state at that time as a measurement index.

use itertools::Itertools;

use crate::{
    adaptive::AdaptiveController,
    config::{CouplingScheme, IntegratorConfig},
    fluid::FluidModel,
    forward::{Increment, Stepper},
    model::FsiModel,
    properties::{FluidSchedule, SolidProperties},
    residual::SolidResidual,
    state::{FluidInfo, FluidState, SolidState, StepInfo},
    store::StateWriter,
    Error, Result,
};

/// Diagnostics of a whole forward run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunSummary {
    /// Diagnostics of each accepted step, in order.
    pub steps: Vec<StepInfo>,
    /// State indices recorded as measurements.
    pub meas_indices: Vec<usize>,
    /// Minimum channel area of every stored state, including the initial one.
    pub glottal_width: Vec<f64>,
    /// Flow rate of every stored state, including the initial one.
    pub flow_rate: Vec<f64>,
}

impl RunSummary {
    fn record(&mut self, fluid: &FluidInfo) {
        self.glottal_width.push(fluid.a_min);
        self.flow_rate.push(fluid.flow_rate);
    }
}

/// The time integration driver.
#[derive(Clone, Copy, Debug)]
pub struct Integrator<'a, S, F> {
    stepper: Stepper<'a, S, F>,
}

impl<'a, S, F> Integrator<'a, S, F>
where
    S: SolidResidual,
    F: FluidModel,
{
    /// Create a driver, validating the configuration.
    pub fn new(
        model: &'a FsiModel<S, F>,
        solid_props: &'a SolidProperties,
        config: &'a IntegratorConfig,
    ) -> Result<Self> {
        Ok(Self {
            stepper: Stepper::new(model, solid_props, config)?,
        })
    }

    fn config(&self) -> &IntegratorConfig {
        self.stepper.config
    }

    /// Store the initial state and return the fluid state on it.
    fn start(
        &self,
        initial: &SolidState,
        t0: f64,
        schedule: &FluidSchedule,
        store: &mut impl StateWriter,
        summary: &mut RunSummary,
    ) -> Result<FluidState> {
        let props = schedule.at(t0);
        let (fluid, info) = self.stepper.model.fluid_state(initial, &props)?;
        store.set_solid_properties(self.stepper.solid_props)?;
        store.append_time(t0)?;
        store.append_state(initial)?;
        store.append_fluid_state(&fluid)?;
        store.append_fluid_properties(&props)?;
        summary.record(&info);
        Ok(fluid)
    }

    /// Store an accepted step.
    fn accept(
        &self,
        inc: &Increment,
        n_state: usize,
        t1: f64,
        schedule: &FluidSchedule,
        store: &mut impl StateWriter,
        summary: &mut RunSummary,
    ) -> Result<()> {
        store.append_time(t1)?;
        store.append_state(&inc.state)?;
        store.append_fluid_state(&inc.fluid)?;
        store.append_fluid_properties(&schedule.at(t1))?;
        log::debug!(
            "step {n_state}: t = {t1:.6e}, dt = {:.3e}, fixed-point iterations {}, flow rate {:.4e}, min area {:.4e}",
            inc.info.dt,
            inc.info.fixed_point_iterations,
            inc.info.fluid.flow_rate,
            inc.info.fluid.a_min,
        );
        summary.steps.push(inc.info);
        summary.record(&inc.info.fluid);
        Ok(())
    }

    /// A fixed-size increment with the configured coupling.
    fn fixed_step(
        &self,
        state: &SolidState,
        fluid: &FluidState,
        t: f64,
        dt: f64,
        schedule: &FluidSchedule,
    ) -> Result<Increment> {
        let props1 = schedule.at(t + dt);
        match self.config().scheme {
            CouplingScheme::Implicit => self.stepper.implicit(state, fluid, dt, &props1),
            CouplingScheme::Explicit | CouplingScheme::Adaptive => {
                self.stepper.explicit(state, fluid, dt, &props1)
            }
        }
    }

    /// Integrate from `initial` at time `t0` through each of `targets`.
    ///
    /// Steps are at most `dt_max` long and never step past a target.
    /// The targets must be strictly increasing, at least two long and not before `t0`.
    /// A target equal to `t0` marks the initial state as a measurement.
    pub fn integrate(
        &self,
        initial: &SolidState,
        t0: f64,
        targets: &[f64],
        schedule: &FluidSchedule,
        store: &mut impl StateWriter,
    ) -> Result<RunSummary> {
        check_times(targets)?;
        if targets[0] < t0 {
            return Err(Error::InvalidTimes {
                reason: format!("first target {} is before the start time {t0}", targets[0]),
            });
        }
        let config = self.config();
        log::info!(
            "integrating {:?} coupling through {} targets up to t = {}, dt_max = {:e}",
            config.scheme,
            targets.len(),
            targets[targets.len() - 1],
            config.dt_max,
        );

        let mut summary = RunSummary::default();
        let mut fluid = self.start(initial, t0, schedule, store, &mut summary)?;
        let mut state = initial.clone();
        let mut t = t0;
        let mut n_state = 0;
        let controller = AdaptiveController::new(self.stepper);

        for &target in targets {
            // a remainder step clamped to the previous target is no guide here
            let mut dt_proposal = config.dt_max;
            while !config.time_reached(t, target) {
                let dt_limit = f64::min(config.dt_max, target - t);
                let inc = match config.scheme {
                    CouplingScheme::Adaptive => {
                        controller.step(&state, &fluid, t, dt_proposal, dt_limit, schedule)?
                    }
                    _ => self.fixed_step(&state, &fluid, t, dt_limit, schedule)?,
                };
                dt_proposal = inc.info.dt;
                t += inc.info.dt;
                n_state += 1;
                self.accept(&inc, n_state, t, schedule, store, &mut summary)?;
                state = inc.state;
                fluid = inc.fluid;
            }
            store.append_measurement_index(n_state)?;
            summary.meas_indices.push(n_state);
        }

        log::info!(
            "forward run finished: {} steps, final time {t}",
            summary.steps.len()
        );
        Ok(summary)
    }

    /// Integrate over a prescribed time grid, one increment per interval.
    ///
    /// `meas_indices` are recorded as given and must index into `times`.
    /// Adaptive coupling takes plain explicit increments here.
    pub fn integrate_times(
        &self,
        initial: &SolidState,
        times: &[f64],
        meas_indices: &[usize],
        schedule: &FluidSchedule,
        store: &mut impl StateWriter,
    ) -> Result<RunSummary> {
        check_times(times)?;
        if let Some(&bad) = meas_indices.iter().find(|&&n| n >= times.len()) {
            return Err(Error::InvalidTimes {
                reason: format!(
                    "measurement index {bad} out of range for {} times",
                    times.len()
                ),
            });
        }
        log::info!(
            "integrating {:?} coupling over {} fixed steps",
            self.config().scheme,
            times.len() - 1
        );

        let mut summary = RunSummary::default();
        let mut fluid = self.start(initial, times[0], schedule, store, &mut summary)?;
        let mut state = initial.clone();
        for (n, (&t0, &t1)) in times.iter().tuple_windows().enumerate() {
            let inc = self.fixed_step(&state, &fluid, t0, t1 - t0, schedule)?;
            self.accept(&inc, n + 1, t1, schedule, store, &mut summary)?;
            state = inc.state;
            fluid = inc.fluid;
        }
        for &n in meas_indices {
            store.append_measurement_index(n)?;
            summary.meas_indices.push(n);
        }

        log::info!("forward run finished: {} steps", summary.steps.len());
        Ok(summary)
    }
}

fn check_times(times: &[f64]) -> Result<()> {
    if times.len() < 2 {
        return Err(Error::InvalidTimes {
            reason: format!("need at least 2 times, got {}", times.len()),
        });
    }
    if let Some((a, b)) = times.iter().tuple_windows().find(|(a, b)| !(b > a)) {
        return Err(Error::InvalidTimes {
            reason: format!("times must be strictly increasing, got {a} then {b}"),
        });
    }
    Ok(())
}
