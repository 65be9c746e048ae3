//! Material parameters of the solid and the flow.

use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::{error::check_len, Result};

/// Parameters of the solid body.
///
/// The elastic modulus field `emod` is the parameter
/// the adjoint differentiates with respect to.
#[derive(Clone, Debug, PartialEq)]
pub struct SolidProperties {
    /// Elastic modulus, one value per stiffness basis element.
    pub emod: na::DVector<f64>,
    /// Mass density.
    pub density: f64,
    /// Mass-proportional Rayleigh damping coefficient.
    pub rayleigh_m: f64,
    /// Stiffness-proportional Rayleigh damping coefficient.
    pub rayleigh_k: f64,
    /// Stiffness of the quadratic collision penalty.
    pub k_collision: f64,
    /// Vertical position of the contact plane.
    pub y_collision: f64,
}

impl SolidProperties {
    /// Undamped properties with a uniform modulus and no collision.
    pub fn uniform(num_parameters: usize, emod: f64, density: f64) -> Self {
        Self {
            emod: na::DVector::from_element(num_parameters, emod),
            density,
            rayleigh_m: 0.0,
            rayleigh_k: 0.0,
            k_collision: 0.0,
            y_collision: f64::INFINITY,
        }
    }

    /// Check that the modulus field has one entry per parameter.
    pub fn check(&self, num_parameters: usize) -> Result<()> {
        check_len("elastic modulus field", num_parameters, self.emod.len())
    }
}

/// Parameters of the quasi-steady flow.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FluidProperties {
    /// Subglottal (inlet) pressure.
    pub p_sub: f64,
    /// Supraglottal (outlet) pressure.
    pub p_sup: f64,
    /// Air density.
    pub rho: f64,
    /// Inlet channel area.
    pub a_sub: f64,
    /// Vertical position of the channel's symmetry line.
    pub y_midline: f64,
}

impl Default for FluidProperties {
    fn default() -> Self {
        // cgs units, typical of phonation
        Self {
            p_sub: 800.0 * 10.0,
            p_sup: 0.0,
            rho: 1.1225e-3,
            a_sub: 0.1,
            y_midline: 0.61,
        }
    }
}

/// Fluid properties as a function of time.
///
/// The subglottal pressure follows a piecewise linear ramp through
/// `(time, p_sub)` points and is held constant outside of them.
/// With no ramp points the base properties apply at all times.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FluidSchedule {
    /// Properties other than the ramped subglottal pressure.
    pub base: FluidProperties,
    /// Ramp points sorted by time.
    pub p_sub_ramp: Vec<(f64, f64)>,
}

impl From<FluidProperties> for FluidSchedule {
    fn from(base: FluidProperties) -> Self {
        Self {
            base,
            p_sub_ramp: Vec::new(),
        }
    }
}

impl FluidSchedule {
    /// The fluid properties in effect at time `t`.
    pub fn at(&self, t: f64) -> FluidProperties {
        let mut props = self.base;
        let ramp = &self.p_sub_ramp;
        let (Some(first), Some(last)) = (ramp.first(), ramp.last()) else {
            return props;
        };
        props.p_sub = if t <= first.0 {
            first.1
        } else if t >= last.0 {
            last.1
        } else {
            let idx = ramp.partition_point(|&(time, _)| time <= t);
            let (t0, p0) = ramp[idx - 1];
            let (t1, p1) = ramp[idx];
            p0 + (p1 - p0) * (t - t0) / (t1 - t0)
        };
        props
    }
}
