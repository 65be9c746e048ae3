//! Coupling of a solid residual provider and a fluid model
//! through the fluid-structure interface.

use nalgebra as na;
use nalgebra_sparse as nas;

use crate::{
    error::check_len,
    fluid::{FluidModel, SurfaceState},
    properties::FluidProperties,
    residual::SolidResidual,
    state::{FluidInfo, FluidState, SolidState},
    Result, Vec2,
};

/// Correspondence between interface vertices and solid DOFs.
///
/// Vertices are ordered in the flow direction,
/// and vertex `i` moves with DOFs `x_dofs[i]` and `y_dofs[i]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Interface {
    /// Horizontal displacement DOF of each vertex.
    pub x_dofs: Vec<usize>,
    /// Vertical displacement DOF of each vertex.
    pub y_dofs: Vec<usize>,
    /// Undeformed position of each vertex.
    pub reference: Vec<Vec2>,
}

impl Interface {
    /// An interface without vertices, for bodies not in contact with a flow.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of interface vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.reference.len()
    }

    /// Gather the interface displacement and velocity from a solid state.
    pub fn surface(&self, state: &SolidState) -> SurfaceState {
        SurfaceState {
            reference: self.reference.clone(),
            u: self.gather(&state.u),
            v: self.gather(&state.v),
        }
    }

    fn gather(&self, full: &na::DVector<f64>) -> na::DVector<f64> {
        na::DVector::from_iterator(
            2 * self.num_vertices(),
            self.x_dofs
                .iter()
                .zip(&self.y_dofs)
                .flat_map(|(&x, &y)| [full[x], full[y]]),
        )
    }

    /// The `2 num_vertices x num_dofs` matrix extracting surface displacements.
    pub fn selection(&self, num_dofs: usize) -> nas::CsrMatrix<f64> {
        let mut coo = nas::CooMatrix::new(2 * self.num_vertices(), num_dofs);
        for (i, (&x, &y)) in self.x_dofs.iter().zip(&self.y_dofs).enumerate() {
            coo.push(2 * i, x, 1.0);
            coo.push(2 * i + 1, y, 1.0);
        }
        nas::CsrMatrix::from(&coo)
    }

    /// Vertical distance from each vertex to the contact plane,
    /// negative for vertices beyond it.
    pub fn gaps<'a>(
        &'a self,
        u: &'a na::DVector<f64>,
        y_collision: f64,
    ) -> impl 'a + Iterator<Item = f64> {
        self.y_dofs
            .iter()
            .zip(&self.reference)
            .map(move |(&dof, xy)| y_collision - (xy.y + u[dof]))
    }

    /// Whether any vertex passes from in front of the contact plane at `u0`
    /// to beyond it at `u1`.
    pub fn crosses_contact(
        &self,
        u0: &na::DVector<f64>,
        u1: &na::DVector<f64>,
        y_collision: f64,
    ) -> bool {
        self.gaps(u0, y_collision)
            .zip(self.gaps(u1, y_collision))
            .any(|(g0, g1)| g0 > 0.0 && g1 < 0.0)
    }
}

/// A solid body coupled to a flow model.
#[derive(Clone, Debug)]
pub struct FsiModel<S, F> {
    /// The solid residual provider.
    pub solid: S,
    /// The quasi-steady flow model.
    pub fluid: F,
    /// Where the two meet.
    pub interface: Interface,
}

impl<S: SolidResidual, F: FluidModel> FsiModel<S, F> {
    /// Couple a solid and a fluid, checking that the interface matches the solid.
    pub fn new(solid: S, fluid: F, interface: Interface) -> Result<Self> {
        check_len(
            "interface vertices",
            solid.num_pressure_dofs(),
            interface.num_vertices(),
        )?;
        check_len(
            "interface vertical DOFs",
            interface.num_vertices(),
            interface.y_dofs.len(),
        )?;
        check_len(
            "interface horizontal DOFs",
            interface.num_vertices(),
            interface.x_dofs.len(),
        )?;
        Ok(Self {
            solid,
            fluid,
            interface,
        })
    }

    /// The fluid solution on the surface of `state`.
    pub fn fluid_state(
        &self,
        state: &SolidState,
        props: &FluidProperties,
    ) -> Result<(FluidState, FluidInfo)> {
        self.fluid.solve(&self.interface.surface(state), props)
    }

    /// Sensitivity of the interface pressure to the full solid displacement,
    /// `num_pressure_dofs x num_dofs`.
    ///
    /// This is the fluid's surface sensitivity composed with the
    /// interface selection matrix.
    pub fn dpressure_du(
        &self,
        state: &SolidState,
        props: &FluidProperties,
    ) -> Result<nas::CsrMatrix<f64>> {
        let num_dofs = self.solid.num_dofs();
        if self.interface.num_vertices() == 0 {
            return Ok(nas::CsrMatrix::zeros(0, num_dofs));
        }
        let dp_dsurface = self
            .fluid
            .dpressure_dsurface(&self.interface.surface(state), props)?;
        Ok(&dp_dsurface * &self.interface.selection(num_dofs))
    }

    /// Sensitivity of the flow rate to the full solid displacement.
    pub fn dflow_rate_du(
        &self,
        state: &SolidState,
        props: &FluidProperties,
    ) -> Result<na::DVector<f64>> {
        let num_dofs = self.solid.num_dofs();
        if self.interface.num_vertices() == 0 {
            return Ok(na::DVector::zeros(num_dofs));
        }
        let dq_dsurface = self
            .fluid
            .dflow_rate_dsurface(&self.interface.surface(state), props)?;
        Ok(crate::linalg::transpose_mul(
            &self.interface.selection(num_dofs),
            &dq_dsurface,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fluid::Bernoulli, solid::tiny_fold};
    use approx::relative_eq;

    fn bernoulli_fold() -> (FsiModel<crate::solid::LumpedSolid, Bernoulli>, FluidProperties) {
        let (solid, interface) = tiny_fold();
        let model = FsiModel::new(solid, Bernoulli, interface).unwrap();
        let props = FluidProperties {
            p_sub: 1.0,
            p_sup: 0.0,
            rho: 1.0,
            a_sub: 1.0,
            y_midline: 0.75,
        };
        (model, props)
    }

    #[test]
    fn chained_pressure_sensitivity_matches_finite_differences() {
        let (model, props) = bernoulli_fold();
        let n = model.solid.num_dofs();
        let mut state = SolidState::zeros(n);
        state.u = na::DVector::from_fn(n, |i, _| 5e-3 * (i as f64 * 1.3).cos());
        let dp = nas::convert::serial::convert_csr_dense(&model.dpressure_du(&state, &props).unwrap());
        let dq = model.dflow_rate_du(&state, &props).unwrap();
        let (base, _) = model.fluid_state(&state, &props).unwrap();
        let h = 1e-7;
        for j in 0..n {
            let mut perturbed = state.clone();
            perturbed.u[j] += h;
            let (fluid, _) = model.fluid_state(&perturbed, &props).unwrap();
            for i in 0..fluid.p.len() {
                let fd = (fluid.p[i] - base.p[i]) / h;
                assert!(
                    relative_eq!(fd, dp[(i, j)], epsilon = 1e-5, max_relative = 1e-4),
                    "dp[{i}]/du[{j}]: finite difference {fd} vs exact {}",
                    dp[(i, j)],
                );
            }
            let fd_q = (fluid.q - base.q) / h;
            assert!(relative_eq!(fd_q, dq[j], epsilon = 1e-5, max_relative = 1e-4));
        }
    }

    #[test]
    fn contact_crossing() {
        let (model, _) = bernoulli_fold();
        let n = model.solid.num_dofs();
        let top_mid = model.interface.y_dofs[2];
        // the middle of the top surface sits at 0.7
        let u0 = na::DVector::zeros(n);
        let mut u1 = na::DVector::zeros(n);
        u1[top_mid] = 0.02;
        assert!(!model.interface.crosses_contact(&u0, &u1, 0.75));
        assert!(model.interface.crosses_contact(&u0, &u1, 0.71));
        // already beyond the plane is not a crossing
        assert!(!model.interface.crosses_contact(&u1, &u1, 0.71));
    }

    #[test]
    fn mismatched_interface_is_rejected() {
        let (solid, mut interface) = tiny_fold();
        interface.reference.pop();
        assert!(FsiModel::new(solid, Bernoulli, interface).is_err());
    }
}
