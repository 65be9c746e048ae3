//! Parameters controlling the nonlinear solves and time integration.
//!
//! Every struct here has a `Default` matching the reference tolerances,
//! so the usual pattern is to override only what you need:
//! ```
//! # use vocalfold::config::{IntegratorConfig, CouplingScheme};
//! let config = IntegratorConfig {
//!     scheme: CouplingScheme::Implicit,
//!     dt_max: 5e-5,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```
//! A whole configuration can also be read from JSON with
//! [`IntegratorConfig::from_json`]; missing fields take their defaults.

use serde::{Deserialize, Serialize};

use crate::{newmark::NewmarkParams, Error, Result};

/// Tolerances for the full-step Newton solve of the solid residual.
///
/// Convergence is reached when
/// `abs_err <= abs_tol` or `abs_err / initial_abs_err <= rel_tol`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonConfig {
    /// Absolute tolerance on the projected residual norm.
    pub abs_tol: f64,
    /// Tolerance on the residual norm relative to the initial residual.
    pub rel_tol: f64,
    /// Iterations allowed before giving up.
    pub max_iterations: usize,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            abs_tol: 1e-8,
            rel_tol: 1e-10,
            max_iterations: 25,
        }
    }
}

/// Tolerances for the fixed-point iteration of implicit coupling.
///
/// The relative error is measured against the residual norm
/// at the start of the iteration, not the previous iterate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedPointConfig {
    /// Absolute tolerance on the projected residual norm.
    pub abs_tol: f64,
    /// Tolerance relative to the initial residual norm.
    pub rel_tol: f64,
    /// Iterations allowed before failing with
    /// [`CouplingDiverged`][crate::Error::CouplingDiverged].
    pub max_iterations: usize,
}

impl Default for FixedPointConfig {
    fn default() -> Self {
        Self {
            abs_tol: 1e-8,
            rel_tol: 1e-11,
            max_iterations: 50,
        }
    }
}

/// Parameters of the adaptive step controller.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    /// Target norm of the local truncation error estimate.
    /// `None` disables refinement entirely.
    pub abs_tol: Option<f64>,
    /// A step is accepted when its error norm lies in
    /// `[abs_tol_bounds.0 * abs_tol, abs_tol_bounds.1 * abs_tol]`.
    pub abs_tol_bounds: (f64, f64),
    /// Maximum number of retries for a single step.
    pub max_refinements: usize,
    /// Smallest time step the controller may try.
    pub dt_min: f64,
    /// Below this step size a step crossing the contact plane is accepted anyway.
    pub collision_dt_min: f64,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            abs_tol: Some(1e-5),
            abs_tol_bounds: (0.8, 1.2),
            max_refinements: 32,
            dt_min: 1e-12,
            collision_dt_min: 1e-9,
        }
    }
}

/// How solid and fluid are coupled within a time step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CouplingScheme {
    /// Pressure from the previous state, one solid solve per step.
    #[default]
    Explicit,
    /// Fixed-point iteration between solid and fluid until the coupled residual converges.
    Implicit,
    /// Explicit coupling with error- and collision-controlled step sizes.
    Adaptive,
}

/// Complete configuration of a forward run.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorConfig {
    /// Coupling strategy.
    pub scheme: CouplingScheme,
    /// Largest time step taken between target times.
    pub dt_max: f64,
    /// Newmark-beta parameters.
    pub newmark: NewmarkParams,
    /// Newton solver tolerances.
    pub newton: NewtonConfig,
    /// Fixed-point tolerances for implicit coupling.
    pub fixed_point: FixedPointConfig,
    /// Step controller parameters for adaptive coupling.
    pub adaptive: AdaptiveConfig,
    /// Relative tolerance for deciding a target time has been reached.
    pub time_rel_tol: f64,
    /// Absolute tolerance for deciding a target time has been reached.
    pub time_abs_tol: f64,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            scheme: CouplingScheme::default(),
            dt_max: 1e-4,
            newmark: NewmarkParams::default(),
            newton: NewtonConfig::default(),
            fixed_point: FixedPointConfig::default(),
            adaptive: AdaptiveConfig::default(),
            time_rel_tol: 1e-7,
            time_abs_tol: 10.0 * f64::EPSILON,
        }
    }
}

impl IntegratorConfig {
    /// Parse a configuration from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that all values are in their valid ranges.
    pub fn validate(&self) -> Result<()> {
        if !(self.dt_max > 0.0) {
            return Err(Error::InvalidTimes {
                reason: format!("dt_max must be positive, got {}", self.dt_max),
            });
        }
        if !(self.newmark.beta > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "Newmark beta must be positive, got {}",
                self.newmark.beta
            )));
        }
        let (lo, hi) = self.adaptive.abs_tol_bounds;
        if lo > hi || lo < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "abs_tol_bounds must satisfy 0 <= lower <= upper, got ({lo}, {hi})"
            )));
        }
        if matches!(self.adaptive.abs_tol, Some(tol) if !(tol > 0.0)) {
            return Err(Error::InvalidConfig(
                "adaptive abs_tol must be positive".to_string(),
            ));
        }
        if self.newton.max_iterations == 0 || self.fixed_point.max_iterations == 0 {
            return Err(Error::InvalidConfig(
                "iteration caps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether `t` counts as having reached `target`.
    #[inline]
    pub fn time_reached(&self, t: f64, target: f64) -> bool {
        let scale = f64::max(t.abs(), target.abs());
        (t - target).abs() <= f64::max(self.time_rel_tol * scale, self.time_abs_tol)
    }
}
