//! Step size control for explicitly coupled increments.
//!
//! A trial step is rejected and retried with a new size when either
//! - some interface vertex passes through the contact plane during the step,
//!   in which case the step is halved and later retries may not grow past the halved size, or
//! - the norm of the Zienkiewicz-Xie error estimate falls outside
//!   `abs_tol_bounds` times `abs_tol`, in which case the step is scaled by
//!   `(abs_tol / err)^(1/3)`.
//!
//! The contact rule is checked first. Once the step has been halved down to
//! `collision_dt_min`, a crossing step is accepted with a warning.

use crate::{
    fluid::FluidModel,
    forward::{Increment, Stepper},
    properties::FluidSchedule,
    residual::SolidResidual,
    state::{FluidState, SolidState},
    Error, Result,
};

/// Why a trial step was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Refinement {
    Collision,
    Accuracy,
}

/// Wraps a [`Stepper`] to choose step sizes automatically.
#[derive(Clone, Copy, Debug)]
pub struct AdaptiveController<'a, S, F> {
    stepper: Stepper<'a, S, F>,
}

impl<'a, S, F> AdaptiveController<'a, S, F>
where
    S: SolidResidual,
    F: FluidModel,
{
    /// Control the step size of `stepper`'s explicit increments.
    pub fn new(stepper: Stepper<'a, S, F>) -> Self {
        Self { stepper }
    }

    /// Take one accepted step from time `t0`.
    ///
    /// The first trial uses `dt_proposal`, and no trial exceeds `dt_limit`.
    /// The returned increment's `info.dt` is the size actually taken.
    pub fn step(
        &self,
        state0: &SolidState,
        fluid0: &FluidState,
        t0: f64,
        dt_proposal: f64,
        dt_limit: f64,
        schedule: &FluidSchedule,
    ) -> Result<Increment> {
        let config = &self.stepper.config.adaptive;
        let newmark = &self.stepper.config.newmark;
        let interface = &self.stepper.model.interface;
        let y_collision = self.stepper.solid_props.y_collision;

        let mut ceiling = dt_limit;
        let mut dt = f64::min(dt_proposal, ceiling);
        let mut refinements = 0;
        loop {
            if refinements > config.max_refinements || !(dt >= config.dt_min) {
                return Err(Error::StepSizeCollapsed { dt, refinements });
            }

            let mut inc = self
                .stepper
                .explicit(state0, fluid0, dt, &schedule.at(t0 + dt))?;
            let err_norm = newmark
                .error_estimate(&inc.state.a, &state0.a, dt)
                .norm();
            inc.info.err_norm = Some(err_norm);
            inc.info.refinements = refinements;

            let refinement = if interface.crosses_contact(&state0.u, &inc.state.u, y_collision) {
                if dt > config.collision_dt_min {
                    dt /= 2.0;
                    ceiling = dt;
                    Some(Refinement::Collision)
                } else {
                    log::warn!(
                        "accepting a step of {dt:e} at t = {t0} that crosses the contact plane"
                    );
                    None
                }
            } else {
                match config.abs_tol {
                    None => None,
                    Some(tol) => {
                        let (lower, upper) = config.abs_tol_bounds;
                        let too_large = err_norm > upper * tol;
                        let too_small = err_norm < lower * tol && dt < ceiling;
                        if too_large || too_small {
                            dt = f64::min((tol / err_norm).cbrt() * dt, ceiling);
                            Some(Refinement::Accuracy)
                        } else {
                            None
                        }
                    }
                }
            };

            match refinement {
                None => return Ok(inc),
                Some(reason) => {
                    refinements += 1;
                    log::debug!(
                        "refining step at t = {t0} ({reason:?}, error {err_norm:e}), retrying with dt = {dt:e}"
                    );
                }
            }
        }
    }
}
