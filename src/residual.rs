//! The interface through which the time integrator and the adjoint
//! see the discretized solid.
//!
//! A provider evaluates the residual of one time step,
//! `f(u1; u0, v0, a0, dt, p, params) = 0`,
//! where `(v1, a1)` are eliminated through the Newmark update,
//! together with its partial derivatives.
//! All evaluations take the linearization point explicitly,
//! so providers hold no mutable state.

use nalgebra as na;
use nalgebra_sparse as nas;

use crate::{
    bc::DirichletBc, newmark::NewmarkParams, properties::SolidProperties, state::SolidState,
};

/// Everything a residual evaluation depends on.
#[derive(Clone, Copy, Debug)]
pub struct LinearizationPoint<'a> {
    /// State at the start of the step.
    pub state0: &'a SolidState,
    /// Trial displacement at the end of the step.
    pub u1: &'a na::DVector<f64>,
    /// Step size.
    pub dt: f64,
    /// Pressure on the interface vertices.
    pub pressure: &'a na::DVector<f64>,
    /// Solid material parameters.
    pub props: &'a SolidProperties,
    /// Newmark parameters relating `u1` to `v1` and `a1`.
    pub newmark: NewmarkParams,
}

impl<'a> LinearizationPoint<'a> {
    /// The end-of-step state implied by `u1`.
    pub fn state1(&self) -> SolidState {
        self.newmark.update(self.u1.clone(), self.state0, self.dt)
    }
}

/// Selects a partial derivative of the residual.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Wrt {
    /// End-of-step displacement.
    U1,
    /// Start-of-step displacement.
    U0,
    /// Start-of-step velocity.
    V0,
    /// Start-of-step acceleration.
    A0,
    /// Interface pressure.
    Pressure,
    /// Elastic modulus field.
    Parameter,
}

/// A discretized solid body advanced with the Newmark scheme.
///
/// Every Jacobian is returned unprojected;
/// callers apply [`dirichlet`][Self::dirichlet] where needed.
pub trait SolidResidual {
    /// Number of displacement DOFs.
    fn num_dofs(&self) -> usize;
    /// Number of interface vertices carrying a pressure.
    fn num_pressure_dofs(&self) -> usize;
    /// Length of the elastic modulus field.
    fn num_parameters(&self) -> usize;
    /// The essential boundary conditions of the body.
    fn dirichlet(&self) -> &DirichletBc;

    /// Evaluate the residual vector.
    fn residual(&self, at: &LinearizationPoint) -> na::DVector<f64>;
    /// ∂f/∂u1, square.
    fn df_du1(&self, at: &LinearizationPoint) -> nas::CsrMatrix<f64>;
    /// ∂f/∂u0, square.
    fn df_du0(&self, at: &LinearizationPoint) -> nas::CsrMatrix<f64>;
    /// ∂f/∂v0, square.
    fn df_dv0(&self, at: &LinearizationPoint) -> nas::CsrMatrix<f64>;
    /// ∂f/∂a0, square.
    fn df_da0(&self, at: &LinearizationPoint) -> nas::CsrMatrix<f64>;
    /// ∂f/∂p, `num_dofs x num_pressure_dofs`.
    fn df_dpressure(&self, at: &LinearizationPoint) -> nas::CsrMatrix<f64>;
    /// ∂f/∂E, `num_dofs x num_parameters`.
    fn df_dparameter(&self, at: &LinearizationPoint) -> nas::CsrMatrix<f64>;

    /// Dispatch to one of the partial derivatives.
    fn jacobian(&self, wrt: Wrt, at: &LinearizationPoint) -> nas::CsrMatrix<f64> {
        match wrt {
            Wrt::U1 => self.df_du1(at),
            Wrt::U0 => self.df_du0(at),
            Wrt::V0 => self.df_dv0(at),
            Wrt::A0 => self.df_da0(at),
            Wrt::Pressure => self.df_dpressure(at),
            Wrt::Parameter => self.df_dparameter(at),
        }
    }

    /// The residual with constrained entries zeroed.
    fn projected_residual(&self, at: &LinearizationPoint) -> na::DVector<f64> {
        self.dirichlet().applied(self.residual(at))
    }
}
