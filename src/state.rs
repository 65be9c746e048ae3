//! State tuples passed between the forward and adjoint passes,
//! plus the per-step diagnostics record.

use nalgebra as na;

use crate::Vec2;

/// Displacement, velocity and acceleration of the solid.
///
/// During a forward run `v` and `a` are only ever produced by
/// [`NewmarkParams::update`][crate::newmark::NewmarkParams::update],
/// so the three always satisfy the Newmark relations with the previous state.
#[derive(Clone, Debug, PartialEq)]
pub struct SolidState {
    /// Displacement.
    pub u: na::DVector<f64>,
    /// Velocity.
    pub v: na::DVector<f64>,
    /// Acceleration.
    pub a: na::DVector<f64>,
}

impl SolidState {
    /// A state with all three fields zero.
    pub fn zeros(num_dofs: usize) -> Self {
        Self {
            u: na::DVector::zeros(num_dofs),
            v: na::DVector::zeros(num_dofs),
            a: na::DVector::zeros(num_dofs),
        }
    }

    /// Number of degrees of freedom.
    #[inline]
    pub fn num_dofs(&self) -> usize {
        self.u.len()
    }
}

/// Flow rate and interface pressure.
///
/// Recomputed from the solid state whenever it changes,
/// never integrated in time.
#[derive(Clone, Debug, PartialEq)]
pub struct FluidState {
    /// Volumetric flow rate.
    pub q: f64,
    /// Pressure at each interface vertex.
    pub p: na::DVector<f64>,
}

impl FluidState {
    /// No flow and zero pressure on `num_vertices` vertices.
    pub fn zeros(num_vertices: usize) -> Self {
        Self {
            q: 0.0,
            p: na::DVector::zeros(num_vertices),
        }
    }
}

/// Adjoint variables of the coupled residual at a single time index.
#[derive(Clone, Debug, PartialEq)]
pub struct AdjointState {
    /// Multiplier of the displacement residual.
    pub u: na::DVector<f64>,
    /// Multiplier of the velocity update.
    pub v: na::DVector<f64>,
    /// Multiplier of the acceleration update.
    pub a: na::DVector<f64>,
}

/// Diagnostics of the fluid solution on one surface configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FluidInfo {
    /// Surface vertex where the flow separates.
    pub idx_sep: usize,
    /// Surface vertex with the smallest channel area.
    pub idx_min: usize,
    /// Deformed position of the minimum-area vertex.
    pub xy_min: Vec2,
    /// Deformed position of the separation vertex.
    pub xy_sep: Vec2,
    /// Smallest channel area.
    pub a_min: f64,
    /// Channel area at separation.
    pub a_sep: f64,
    /// Volumetric flow rate.
    pub flow_rate: f64,
}

/// Diagnostics of one accepted increment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepInfo {
    /// The step size actually taken.
    pub dt: f64,
    /// Newton iterations summed over all solid solves of the step.
    pub newton_iterations: usize,
    /// Fixed-point iterations (zero for explicit coupling).
    pub fixed_point_iterations: usize,
    /// Final absolute coupled residual norm (implicit coupling only).
    pub abs_err: f64,
    /// Final coupled residual norm relative to the initial one.
    pub rel_err: f64,
    /// L2 norm of the truncation error estimate, if the step was size-controlled.
    pub err_norm: Option<f64>,
    /// Number of times the step size was refined before acceptance.
    pub refinements: usize,
    /// Fluid diagnostics at the end of the step.
    pub fluid: FluidInfo,
}
