//! The Newmark-beta update relating displacement, velocity and acceleration
//! across one time step.
//!
//! Given a trial displacement `u1` and the previous state `(u0, v0, a0)`,
//! the acceleration is solved first,
//! ```text
//! a1 = (u1 - u0 - dt v0 - dt^2 (1/2 - beta) a0) / (beta dt^2)
//! ```
//! and the velocity follows from it,
//! ```text
//! v1 = v0 + dt ((1 - gamma) a0 + gamma a1).
//! ```
//! Everything here is a pure function of its inputs.

use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::state::SolidState;

/// The two scalar parameters of the Newmark-beta family.
///
/// The default `gamma = 1/2, beta = 1/4` is the average acceleration rule,
/// unconditionally stable with no numerical damping.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewmarkParams {
    /// Weight of the end-of-step acceleration in the velocity update.
    pub gamma: f64,
    /// Weight of the end-of-step acceleration in the displacement update.
    pub beta: f64,
}

impl Default for NewmarkParams {
    fn default() -> Self {
        Self {
            gamma: 0.5,
            beta: 0.25,
        }
    }
}

/// Partial derivatives of the end-of-step velocity and acceleration
/// with respect to the trial displacement and the previous state.
///
/// All of them are scalar multiples of the identity,
/// so only the scalar factors are stored.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NewmarkDerivatives {
    /// ∂a1/∂u1
    pub da1_du1: f64,
    /// ∂a1/∂u0
    pub da1_du0: f64,
    /// ∂a1/∂v0
    pub da1_dv0: f64,
    /// ∂a1/∂a0
    pub da1_da0: f64,
    /// ∂v1/∂u1
    pub dv1_du1: f64,
    /// ∂v1/∂u0
    pub dv1_du0: f64,
    /// ∂v1/∂v0
    pub dv1_dv0: f64,
    /// ∂v1/∂a0
    pub dv1_da0: f64,
}

impl NewmarkParams {
    /// End-of-step acceleration for the trial displacement `u1`.
    pub fn acceleration(
        &self,
        u1: &na::DVector<f64>,
        state0: &SolidState,
        dt: f64,
    ) -> na::DVector<f64> {
        let SolidState { u: u0, v: v0, a: a0 } = state0;
        let dt2 = dt * dt;
        (u1 - u0 - v0 * dt - a0 * (dt2 * (0.5 - self.beta))) / (self.beta * dt2)
    }

    /// End-of-step velocity given the end-of-step acceleration `a1`.
    pub fn velocity(
        &self,
        a1: &na::DVector<f64>,
        state0: &SolidState,
        dt: f64,
    ) -> na::DVector<f64> {
        &state0.v + (&state0.a * (1.0 - self.gamma) + a1 * self.gamma) * dt
    }

    /// The full end-of-step state consistent with `u1`.
    pub fn update(&self, u1: na::DVector<f64>, state0: &SolidState, dt: f64) -> SolidState {
        let a = self.acceleration(&u1, state0, dt);
        let v = self.velocity(&a, state0, dt);
        SolidState { u: u1, v, a }
    }

    /// Zienkiewicz-Xie estimate of the local displacement truncation error.
    pub fn error_estimate(
        &self,
        a1: &na::DVector<f64>,
        a0: &na::DVector<f64>,
        dt: f64,
    ) -> na::DVector<f64> {
        (a1 - a0) * (0.5 * dt * dt * (2.0 * self.beta - 1.0 / 3.0))
    }

    /// Partial derivatives of the update for a step of size `dt`.
    pub fn derivatives(&self, dt: f64) -> NewmarkDerivatives {
        let NewmarkParams { gamma, beta } = *self;
        NewmarkDerivatives {
            da1_du1: 1.0 / (beta * dt * dt),
            da1_du0: -1.0 / (beta * dt * dt),
            da1_dv0: -1.0 / (beta * dt),
            da1_da0: 1.0 - 1.0 / (2.0 * beta),
            dv1_du1: gamma / (beta * dt),
            dv1_du0: -gamma / (beta * dt),
            dv1_dv0: 1.0 - gamma / beta,
            dv1_da0: dt * (1.0 - gamma / (2.0 * beta)),
        }
    }
}
