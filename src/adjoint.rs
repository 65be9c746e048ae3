//! Gradients of functionals by the discrete adjoint of the forward time stepping.
//!
//! Step `n` of a stored trajectory solves `f_n(u_n; u_{n-1}, v_{n-1}, a_{n-1}, p) = 0`
//! and sets `v_n`, `a_n` from the Newmark update. Sweeping backward from the last
//! state, each step gives a linear system in the adjoint displacement
//! ```text
//! (df_n/du_n)^T adj_u_n = dJ/du_n + (dv_n/du_n) adj_v_n + (da_n/du_n) adj_a_n
//!                         - (df_{n+1}/du_n)^T adj_u_{n+1}
//!                         + (dv_{n+1}/du_n) adj_v_{n+1} + (da_{n+1}/du_n) adj_a_{n+1}
//! ```
//! with `adj_v_n`, `adj_a_n` given explicitly by the next step's adjoint,
//! and the gradient accumulates `-(df_n/dE)^T adj_u_n`.
//! The last state has `adj_v = adj_a = 0`.
//!
//! The pressure load makes the residual depend on the displacement through
//! the fluid. With explicit coupling step `n` is loaded by the pressure on
//! `u_{n-1}`, so `df_n/du_{n-1}` gains `(df_n/dp) (dp/du)(u_{n-1})`.
//! With implicit coupling it is loaded by the pressure on `u_n`,
//! so `df_n/du_n` gains `(df_n/dp) (dp/du)(u_n)`.
//!
//! Functionals may only depend on displacements,
//! and the step sizes are taken as fixed,
//! so gradients of adaptively stepped runs neglect the dependence of
//! the chosen step sizes on the parameters.

use nalgebra as na;
use nalgebra_sparse as nas;

use crate::{
    bc::DirichletBc,
    config::{CouplingScheme, IntegratorConfig},
    error::check_len,
    fluid::FluidModel,
    functional::Functional,
    linalg,
    model::FsiModel,
    newmark::NewmarkParams,
    properties::SolidProperties,
    residual::{LinearizationPoint, SolidResidual, Wrt},
    state::AdjointState,
    store::StateReader,
    Error, Result,
};

/// The partial derivatives of one step's residual, pressure coupling included.
struct StepLinearization {
    dt: f64,
    df_du1: nas::CsrMatrix<f64>,
    df_du0: nas::CsrMatrix<f64>,
    df_dv0: nas::CsrMatrix<f64>,
    df_da0: nas::CsrMatrix<f64>,
    df_dparameter: nas::CsrMatrix<f64>,
}

/// Builds [`StepLinearization`]s from a stored trajectory.
struct Linearizer<'a, S, F> {
    model: &'a FsiModel<S, F>,
    reader: &'a dyn StateReader,
    solid_props: SolidProperties,
    times: Vec<f64>,
    newmark: NewmarkParams,
    implicit: bool,
}

impl<'a, S, F> Linearizer<'a, S, F>
where
    S: SolidResidual,
    F: FluidModel,
{
    /// Linearize step `n`, the one ending at state `n`.
    fn step(&self, n: usize) -> Result<StepLinearization> {
        let solid = &self.model.solid;
        let state0 = self.reader.get_state(n - 1)?;
        let state1 = self.reader.get_state(n)?;
        // the state whose pressure loads step n
        let n_load = if self.implicit { n } else { n - 1 };
        let pressure = self.reader.get_fluid_state(n_load)?.p;
        let dt = self.times[n] - self.times[n - 1];

        let at = LinearizationPoint {
            state0: &state0,
            u1: &state1.u,
            dt,
            pressure: &pressure,
            props: &self.solid_props,
            newmark: self.newmark,
        };
        let mut df_du1 = solid.jacobian(Wrt::U1, &at);
        let mut df_du0 = solid.jacobian(Wrt::U0, &at);

        if solid.num_pressure_dofs() > 0 {
            let load_state = if self.implicit { &state1 } else { &state0 };
            let fluid_props = self.reader.get_fluid_properties(n_load)?;
            let dp_du = self.model.dpressure_du(load_state, &fluid_props)?;
            let coupling = &solid.jacobian(Wrt::Pressure, &at) * &dp_du;
            if self.implicit {
                df_du1 = &df_du1 + &coupling;
            } else {
                df_du0 = &df_du0 + &coupling;
            }
        }

        Ok(StepLinearization {
            dt,
            df_du1,
            df_du0,
            df_dv0: solid.jacobian(Wrt::V0, &at),
            df_da0: solid.jacobian(Wrt::A0, &at),
            df_dparameter: solid.jacobian(Wrt::Parameter, &at),
        })
    }
}

/// Compute the gradient of `functional` with respect to the elastic modulus field
/// over the trajectory stored in `reader`.
///
/// `config` must carry the coupling scheme and Newmark parameters
/// the trajectory was computed with.
pub fn adjoint_gradient<S, F>(
    model: &FsiModel<S, F>,
    reader: &dyn StateReader,
    functional: &dyn Functional,
    config: &IntegratorConfig,
) -> Result<na::DVector<f64>>
where
    S: SolidResidual,
    F: FluidModel,
{
    let num_states = reader.get_num_states();
    if num_states < 2 {
        return Err(Error::TrajectoryMismatch {
            reason: format!("need at least 2 stored states, got {num_states}"),
        });
    }
    let times = reader.get_times();
    check_len("stored times", num_states, times.len())?;
    if let Some(&bad) = functional
        .sample_indices(reader)
        .iter()
        .find(|&&n| n >= num_states)
    {
        return Err(Error::TrajectoryMismatch {
            reason: format!("functional samples state {bad} of a {num_states}-state trajectory"),
        });
    }
    let solid_props = reader.get_solid_properties()?;
    solid_props.check(model.solid.num_parameters())?;

    let linearizer = Linearizer {
        model,
        reader,
        solid_props,
        times,
        newmark: config.newmark,
        implicit: config.scheme == CouplingScheme::Implicit,
    };
    let bc = model.solid.dirichlet();
    let num_dofs = model.solid.num_dofs();

    log::info!(
        "adjoint pass over {num_states} states with {:?} coupling",
        config.scheme
    );

    // last state
    let last = num_states - 1;
    let mut lin = linearizer.step(last)?;
    let rhs = bc.applied(functional.du(last, reader)?);
    check_len("functional gradient", num_dofs, rhs.len())?;
    let adj_u = linalg::solve(
        &bc.apply_matrix(&lin.df_du1.transpose()),
        &rhs,
        "terminal adjoint",
    )?;
    let mut grad = -linalg::transpose_mul(&lin.df_dparameter, &adj_u);
    let mut adjoint = AdjointState {
        u: adj_u,
        v: na::DVector::zeros(num_dofs),
        a: na::DVector::zeros(num_dofs),
    };

    for n in (1..last).rev() {
        log::debug!("adjoint step {n}");
        let lin_n = linearizer.step(n)?;
        let next_adjoint = backward_step(
            &lin_n,
            &lin,
            &adjoint,
            functional.du(n, reader)?,
            &linearizer.newmark,
            bc,
        )?;
        grad -= linalg::transpose_mul(&lin_n.df_dparameter, &next_adjoint.u);
        (adjoint, lin) = (next_adjoint, lin_n);
    }

    log::info!("adjoint pass finished, gradient norm {:e}", grad.norm());
    Ok(grad)
}

/// The adjoint state at step `n` from the one at step `n + 1`.
///
/// `lin` linearizes step `n` and `lin_next` step `n + 1`.
fn backward_step(
    lin: &StepLinearization,
    lin_next: &StepLinearization,
    adj_next: &AdjointState,
    dcost_du: na::DVector<f64>,
    newmark: &NewmarkParams,
    bc: &DirichletBc,
) -> Result<AdjointState> {
    check_len("functional gradient", adj_next.u.len(), dcost_du.len())?;
    let d = newmark.derivatives(lin.dt);
    let d_next = newmark.derivatives(lin_next.dt);

    let adj_a = bc.applied(
        -(linalg::transpose_mul(&lin_next.df_da0, &adj_next.u)
            - &adj_next.v * d_next.dv1_da0
            - &adj_next.a * d_next.da1_da0),
    );
    let adj_v = bc.applied(
        -(linalg::transpose_mul(&lin_next.df_dv0, &adj_next.u)
            - &adj_next.v * d_next.dv1_dv0
            - &adj_next.a * d_next.da1_dv0),
    );

    let rhs = dcost_du + &adj_v * d.dv1_du1 + &adj_a * d.da1_du1
        - linalg::transpose_mul(&lin_next.df_du0, &adj_next.u)
        + &adj_next.v * d_next.dv1_du0
        + &adj_next.a * d_next.da1_du0;
    let rhs = bc.applied(rhs);
    let adj_u = linalg::solve(
        &bc.apply_matrix(&lin.df_du1.transpose()),
        &rhs,
        "adjoint step",
    )?;

    Ok(AdjointState {
        u: adj_u,
        v: adj_v,
        a: adj_a,
    })
}
