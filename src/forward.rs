//! Advancing the coupled solid and fluid by one time step.
//!
//! Explicit coupling loads the solid with the pressure of the previous state
//! and solves the solid once, so the fluid lags the solid by one step.
//! Implicit coupling iterates solid solves and fluid updates until the solid
//! residual evaluated with the latest pressure is small.
//! In both cases the fluid is re-solved on the final surface
//! so the returned fluid state matches the returned solid state.

use nalgebra as na;

use crate::{
    config::IntegratorConfig,
    error::check_len,
    fluid::FluidModel,
    model::FsiModel,
    newton::{newton_solve, NewtonInfo},
    properties::{FluidProperties, SolidProperties},
    residual::{LinearizationPoint, SolidResidual},
    state::{FluidInfo, FluidState, SolidState, StepInfo},
    Error, Result,
};

/// The outcome of one accepted time step.
#[derive(Clone, Debug)]
pub struct Increment {
    /// Solid state at the end of the step.
    pub state: SolidState,
    /// Fluid state on the end-of-step surface.
    pub fluid: FluidState,
    /// Diagnostics.
    pub info: StepInfo,
}

/// Performs single increments of a model with fixed properties.
#[derive(Debug)]
pub struct Stepper<'a, S, F> {
    /// The coupled model.
    pub model: &'a FsiModel<S, F>,
    /// Solid properties, constant over the run.
    pub solid_props: &'a SolidProperties,
    /// Solver settings.
    pub config: &'a IntegratorConfig,
}

// manual impls, deriving would add `S: Copy, F: Copy` bounds
impl<'a, S, F> Clone for Stepper<'a, S, F> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<'a, S, F> Copy for Stepper<'a, S, F> {}

impl<'a, S, F> Stepper<'a, S, F>
where
    S: SolidResidual,
    F: FluidModel,
{
    /// Create a stepper, checking property and configuration consistency.
    pub fn new(
        model: &'a FsiModel<S, F>,
        solid_props: &'a SolidProperties,
        config: &'a IntegratorConfig,
    ) -> Result<Self> {
        solid_props.check(model.solid.num_parameters())?;
        config.validate()?;
        Ok(Self {
            model,
            solid_props,
            config,
        })
    }

    fn check_inputs(&self, state0: &SolidState, fluid0: &FluidState, dt: f64) -> Result<()> {
        let solid = &self.model.solid;
        check_len("solid displacement", solid.num_dofs(), state0.u.len())?;
        check_len("solid velocity", solid.num_dofs(), state0.v.len())?;
        check_len("solid acceleration", solid.num_dofs(), state0.a.len())?;
        check_len("pressure", solid.num_pressure_dofs(), fluid0.p.len())?;
        if !(dt > 0.0) {
            return Err(Error::InvalidTimes {
                reason: format!("time step must be positive, got {dt}"),
            });
        }
        Ok(())
    }

    fn point<'p>(
        &'p self,
        state0: &'p SolidState,
        u1: &'p na::DVector<f64>,
        dt: f64,
        pressure: &'p na::DVector<f64>,
    ) -> LinearizationPoint<'p> {
        LinearizationPoint {
            state0,
            u1,
            dt,
            pressure,
            props: self.solid_props,
            newmark: self.config.newmark,
        }
    }

    /// Solve the solid with a fixed pressure load.
    fn solve_solid(
        &self,
        state0: &SolidState,
        u_guess: na::DVector<f64>,
        dt: f64,
        pressure: &na::DVector<f64>,
    ) -> Result<(na::DVector<f64>, NewtonInfo)> {
        let solid = &self.model.solid;
        newton_solve(
            u_guess,
            |u1| solid.residual(&self.point(state0, u1, dt, pressure)),
            |u1| solid.df_du1(&self.point(state0, u1, dt, pressure)),
            solid.dirichlet(),
            &self.config.newton,
        )
    }

    /// Explicit increment of size `dt`.
    ///
    /// `fluid0` is the fluid state on the start-of-step surface
    /// and `fluid_props1` the fluid properties at the end of the step.
    pub fn explicit(
        &self,
        state0: &SolidState,
        fluid0: &FluidState,
        dt: f64,
        fluid_props1: &FluidProperties,
    ) -> Result<Increment> {
        self.check_inputs(state0, fluid0, dt)?;
        let (u1, newton) = self.solve_solid(state0, state0.u.clone(), dt, &fluid0.p)?;
        let state = self.config.newmark.update(u1, state0, dt);
        let (fluid, fluid_info) = self.model.fluid_state(&state, fluid_props1)?;
        Ok(Increment {
            state,
            fluid,
            info: step_info(dt, newton.iterations, 0, 0.0, 0.0, fluid_info),
        })
    }

    /// Implicit increment of size `dt`.
    ///
    /// The pressure guess starts from `fluid0.p` and is updated from the
    /// end-of-step surface after every solid solve. Iteration stops when the
    /// projected residual with the latest pressure meets the absolute tolerance
    /// or, relative to the residual at the start of the iteration,
    /// the relative tolerance.
    pub fn implicit(
        &self,
        state0: &SolidState,
        fluid0: &FluidState,
        dt: f64,
        fluid_props1: &FluidProperties,
    ) -> Result<Increment> {
        self.check_inputs(state0, fluid0, dt)?;
        let solid = &self.model.solid;
        let tol = &self.config.fixed_point;

        let mut u1 = state0.u.clone();
        let mut p1 = fluid0.p.clone();
        let mut latest: Option<(SolidState, FluidState, FluidInfo)> = None;

        let abs_err_0 = solid
            .projected_residual(&self.point(state0, &u1, dt, &p1))
            .norm();
        let mut abs_err = abs_err_0;
        let mut rel_err = if abs_err_0 > 0.0 { 1.0 } else { 0.0 };
        let mut iterations = 0;
        let mut newton_iterations = 0;

        while abs_err > tol.abs_tol && rel_err > tol.rel_tol {
            if iterations >= tol.max_iterations {
                return Err(Error::CouplingDiverged {
                    iterations,
                    abs_err,
                    rel_err,
                });
            }
            let (u_next, newton) = self.solve_solid(state0, u1, dt, &p1)?;
            newton_iterations += newton.iterations;
            let state = self.config.newmark.update(u_next.clone(), state0, dt);
            let (fluid, fluid_info) = self.model.fluid_state(&state, fluid_props1)?;

            u1 = u_next;
            p1 = fluid.p.clone();
            abs_err = solid
                .projected_residual(&self.point(state0, &u1, dt, &p1))
                .norm();
            rel_err = abs_err / abs_err_0;
            iterations += 1;
            log::trace!("fixed-point iteration {iterations}: abs {abs_err:e}, rel {rel_err:e}");
            latest = Some((state, fluid, fluid_info));
        }

        let (state, fluid, fluid_info) = match latest {
            Some(latest) => latest,
            // already converged at the start-of-step displacement
            None => {
                let state = self.config.newmark.update(u1, state0, dt);
                let (fluid, info) = self.model.fluid_state(&state, fluid_props1)?;
                (state, fluid, info)
            }
        };
        Ok(Increment {
            state,
            fluid,
            info: step_info(
                dt,
                newton_iterations,
                iterations,
                abs_err,
                rel_err,
                fluid_info,
            ),
        })
    }
}

fn step_info(
    dt: f64,
    newton_iterations: usize,
    fixed_point_iterations: usize,
    abs_err: f64,
    rel_err: f64,
    fluid: FluidInfo,
) -> StepInfo {
    StepInfo {
        dt,
        newton_iterations,
        fixed_point_iterations,
        abs_err,
        rel_err,
        err_norm: None,
        refinements: 0,
        fluid,
    }
}
