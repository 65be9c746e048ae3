//! A lumped linear-elastic body with Rayleigh damping and penalty contact.
//!
//! The residual of one step is
//! ```text
//! f = rho M a1 + (r_m rho M + r_k K(E)) v1 + K(E) u1 - B p + c(u1),
//! ```
//! where `M` is a lumped (diagonal) mass, `K(E) = sum_k E_k K_k` is linear
//! in the elastic modulus field, `B` maps interface pressures to nodal forces,
//! and `c_j = k_c max(y_ref_j + u_j - y_c, 0)^2` penalizes contact DOFs
//! that pass the contact plane.
//!
//! [`lattice`] builds such a body from a network of bars on a bulged strip,
//! which is the geometry used in tests and the demo.

use itertools::izip;
use nalgebra as na;
use nalgebra_sparse as nas;

use crate::{
    bc::DirichletBc,
    error::check_len,
    linalg,
    model::Interface,
    newmark::NewmarkDerivatives,
    residual::{LinearizationPoint, SolidResidual},
    Error, Result, Vec2,
};

/// A DOF subject to the contact penalty.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactDof {
    /// Index of the (vertical) displacement DOF.
    pub dof: usize,
    /// Reference coordinate of the DOF.
    pub reference: f64,
}

/// An assembled solid body. See the [module-level docs][self].
#[derive(Clone, Debug)]
pub struct LumpedSolid {
    mass: na::DVector<f64>,
    stiffness_basis: Vec<nas::CsrMatrix<f64>>,
    traction: nas::CsrMatrix<f64>,
    contact: Vec<ContactDof>,
    dirichlet: DirichletBc,
}

impl LumpedSolid {
    /// Assemble a body from its parts.
    ///
    /// `mass` is the lumped mass per unit density,
    /// `stiffness_basis[k]` the stiffness per unit modulus of parameter `k`,
    /// and `traction` the `num_dofs x num_pressure_dofs` pressure load matrix.
    pub fn new(
        mass: na::DVector<f64>,
        stiffness_basis: Vec<nas::CsrMatrix<f64>>,
        traction: nas::CsrMatrix<f64>,
        contact: Vec<ContactDof>,
        dirichlet: DirichletBc,
    ) -> Result<Self> {
        let n = mass.len();
        for k in &stiffness_basis {
            check_len("stiffness basis rows", n, k.nrows())?;
            check_len("stiffness basis columns", n, k.ncols())?;
        }
        check_len("traction matrix rows", n, traction.nrows())?;
        if let Some(c) = contact.iter().find(|c| c.dof >= n) {
            return Err(Error::InvalidConfig(format!(
                "contact DOF {} out of range for {n} DOFs",
                c.dof
            )));
        }
        Ok(Self {
            mass,
            stiffness_basis,
            traction,
            contact,
            dirichlet,
        })
    }

    /// The assembled stiffness `sum_k E_k K_k`.
    pub fn stiffness(&self, emod: &na::DVector<f64>) -> nas::CsrMatrix<f64> {
        let n = self.mass.len();
        izip!(&self.stiffness_basis, emod.iter()).fold(
            nas::CsrMatrix::zeros(n, n),
            |acc, (k, &e)| &acc + &linalg::scaled(k, e),
        )
    }

    /// Penetration of each contact DOF past the contact plane, zero if none.
    fn penetration(&self, u: &na::DVector<f64>, y_collision: f64) -> Vec<f64> {
        self.contact
            .iter()
            .map(|c| f64::max(c.reference + u[c.dof] - y_collision, 0.0))
            .collect()
    }

    /// Jacobian of the inertia and damping terms through the Newmark update,
    /// plus `stiffness_coeff` times the stiffness.
    fn newmark_jacobian(
        &self,
        at: &LinearizationPoint,
        da1: f64,
        dv1: f64,
        stiffness_coeff: f64,
    ) -> nas::CsrMatrix<f64> {
        let props = at.props;
        let mass_diag = &self.mass * (props.density * (da1 + props.rayleigh_m * dv1));
        let stiffness = self.stiffness(&props.emod);
        &linalg::diagonal(&mass_diag)
            + &linalg::scaled(&stiffness, stiffness_coeff + props.rayleigh_k * dv1)
    }

    fn derivatives(at: &LinearizationPoint) -> NewmarkDerivatives {
        at.newmark.derivatives(at.dt)
    }
}

impl SolidResidual for LumpedSolid {
    fn num_dofs(&self) -> usize {
        self.mass.len()
    }

    fn num_pressure_dofs(&self) -> usize {
        self.traction.ncols()
    }

    fn num_parameters(&self) -> usize {
        self.stiffness_basis.len()
    }

    fn dirichlet(&self) -> &DirichletBc {
        &self.dirichlet
    }

    fn residual(&self, at: &LinearizationPoint) -> na::DVector<f64> {
        let props = at.props;
        let state1 = at.state1();
        let stiffness = self.stiffness(&props.emod);

        let inertia = self.mass.component_mul(&state1.a) * props.density;
        let mass_damping = self.mass.component_mul(&state1.v) * (props.density * props.rayleigh_m);
        let elastic = &stiffness * &(&state1.u + &state1.v * props.rayleigh_k);
        let mut f = inertia + mass_damping + elastic;
        if self.num_pressure_dofs() > 0 {
            f -= &self.traction * at.pressure;
        }
        for (c, pen) in izip!(&self.contact, self.penetration(at.u1, props.y_collision)) {
            f[c.dof] += props.k_collision * pen * pen;
        }
        f
    }

    fn df_du1(&self, at: &LinearizationPoint) -> nas::CsrMatrix<f64> {
        let d = Self::derivatives(at);
        let jac = self.newmark_jacobian(at, d.da1_du1, d.dv1_du1, 1.0);
        if self.contact.is_empty() {
            return jac;
        }
        let mut contact_diag = na::DVector::zeros(self.num_dofs());
        for (c, pen) in izip!(&self.contact, self.penetration(at.u1, at.props.y_collision)) {
            contact_diag[c.dof] += 2.0 * at.props.k_collision * pen;
        }
        &jac + &linalg::diagonal(&contact_diag)
    }

    fn df_du0(&self, at: &LinearizationPoint) -> nas::CsrMatrix<f64> {
        let d = Self::derivatives(at);
        self.newmark_jacobian(at, d.da1_du0, d.dv1_du0, 0.0)
    }

    fn df_dv0(&self, at: &LinearizationPoint) -> nas::CsrMatrix<f64> {
        let d = Self::derivatives(at);
        self.newmark_jacobian(at, d.da1_dv0, d.dv1_dv0, 0.0)
    }

    fn df_da0(&self, at: &LinearizationPoint) -> nas::CsrMatrix<f64> {
        let d = Self::derivatives(at);
        self.newmark_jacobian(at, d.da1_da0, d.dv1_da0, 0.0)
    }

    fn df_dpressure(&self, _at: &LinearizationPoint) -> nas::CsrMatrix<f64> {
        linalg::scaled(&self.traction, -1.0)
    }

    fn df_dparameter(&self, at: &LinearizationPoint) -> nas::CsrMatrix<f64> {
        let state1 = at.state1();
        let loaded = &state1.u + &state1.v * at.props.rayleigh_k;
        let mut coo = nas::CooMatrix::new(self.num_dofs(), self.num_parameters());
        for (col, k) in self.stiffness_basis.iter().enumerate() {
            let column = k * &loaded;
            for (row, &val) in column.iter().enumerate() {
                if val != 0.0 {
                    coo.push(row, col, val);
                }
            }
        }
        nas::CsrMatrix::from(&coo)
    }
}

//
// lattice construction
//

/// Geometry of a lattice body. See [`lattice`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LatticeParams {
    /// Number of nodes in the flow direction.
    pub nx: usize,
    /// Number of nodes across the thickness.
    pub ny: usize,
    /// Extent in the flow direction.
    pub width: f64,
    /// Height at the inlet and outlet.
    pub h0: f64,
    /// Additional height of the bulge at mid-width.
    pub h1: f64,
}

impl Default for LatticeParams {
    fn default() -> Self {
        Self {
            nx: 7,
            ny: 3,
            width: 1.0,
            h0: 0.5,
            h1: 0.2,
        }
    }
}

/// Build a bar network on the strip `0 <= x <= width`, `0 <= y <= h0 + h1 sin(pi x / width)`.
///
/// Nodes form an `nx x ny` grid connected by horizontal, vertical and
/// both diagonal bars. Each node carries one elastic modulus parameter
/// and a bar's modulus is the mean of its end nodes'.
/// The bottom row is clamped and the top row, ordered by `x`,
/// is the fluid-structure interface and the set of contact DOFs.
///
/// Panics if `nx` or `ny` is less than 2.
pub fn lattice(params: &LatticeParams) -> (LumpedSolid, Interface) {
    let LatticeParams {
        nx,
        ny,
        width,
        h0,
        h1,
    } = *params;
    assert!(nx >= 2 && ny >= 2, "lattice needs at least 2x2 nodes");

    let num_nodes = nx * ny;
    let num_dofs = 2 * num_nodes;
    let node = |i: usize, j: usize| j * nx + i;
    let x_at = |i: usize| width * i as f64 / (nx - 1) as f64;
    let height_at = |x: f64| h0 + h1 * (std::f64::consts::PI * x / width).sin();
    let positions: Vec<Vec2> = (0..ny)
        .flat_map(|j| {
            (0..nx).map(move |i| {
                let x = x_at(i);
                Vec2::new(x, height_at(x) * j as f64 / (ny - 1) as f64)
            })
        })
        .collect();

    // bars as (node, node) pairs
    let mut bars = Vec::new();
    for j in 0..ny {
        for i in 0..nx {
            if i + 1 < nx {
                bars.push((node(i, j), node(i + 1, j)));
            }
            if j + 1 < ny {
                bars.push((node(i, j), node(i, j + 1)));
            }
            if i + 1 < nx && j + 1 < ny {
                bars.push((node(i, j), node(i + 1, j + 1)));
                bars.push((node(i + 1, j), node(i, j + 1)));
            }
        }
    }

    let mut basis_coo: Vec<nas::CooMatrix<f64>> = (0..num_nodes)
        .map(|_| nas::CooMatrix::new(num_dofs, num_dofs))
        .collect();
    for &(a, b) in &bars {
        let edge = positions[b] - positions[a];
        let length = edge.norm();
        let dir = edge / length;
        let dofs = [2 * a, 2 * a + 1, 2 * b, 2 * b + 1];
        // [n n^T, -n n^T; -n n^T, n n^T] / L, half to each end node's parameter
        let nn = dir * dir.transpose() * (0.5 / length);
        for (r, &row) in dofs.iter().enumerate() {
            for (c, &col) in dofs.iter().enumerate() {
                let sign = if (r < 2) == (c < 2) { 1.0 } else { -1.0 };
                let val = sign * nn[(r % 2, c % 2)];
                basis_coo[a].push(row, col, val);
                basis_coo[b].push(row, col, val);
            }
        }
    }
    let stiffness_basis: Vec<nas::CsrMatrix<f64>> =
        basis_coo.iter().map(nas::CsrMatrix::from).collect();

    // quarter of each cell's area goes to each corner
    let mut mass = na::DVector::zeros(num_dofs);
    for j in 0..ny - 1 {
        for i in 0..nx - 1 {
            let corners = [node(i, j), node(i + 1, j), node(i + 1, j + 1), node(i, j + 1)];
            let area = 0.5
                * ((positions[corners[2]] - positions[corners[0]])
                    .perp(&(positions[corners[3]] - positions[corners[1]])))
                .abs();
            for &n in &corners {
                mass[2 * n] += 0.25 * area;
                mass[2 * n + 1] += 0.25 * area;
            }
        }
    }

    let dirichlet = DirichletBc::new(num_dofs, (0..nx).flat_map(|i| [2 * i, 2 * i + 1]));

    let top: Vec<usize> = (0..nx).map(|i| node(i, ny - 1)).collect();
    let mut traction = nas::CooMatrix::new(num_dofs, nx);
    for (i, &n) in top.iter().enumerate() {
        let left = if i > 0 { x_at(i - 1) } else { x_at(i) };
        let right = if i + 1 < nx { x_at(i + 1) } else { x_at(i) };
        // pressure pushes the top surface down
        traction.push(2 * n + 1, i, -0.5 * (right - left));
    }
    let contact = top
        .iter()
        .map(|&n| ContactDof {
            dof: 2 * n + 1,
            reference: positions[n].y,
        })
        .collect();

    let solid = LumpedSolid {
        mass,
        stiffness_basis,
        traction: nas::CsrMatrix::from(&traction),
        contact,
        dirichlet,
    };
    let interface = Interface {
        x_dofs: top.iter().map(|&n| 2 * n).collect(),
        y_dofs: top.iter().map(|&n| 2 * n + 1).collect(),
        reference: top.iter().map(|&n| positions[n]).collect(),
    };
    (solid, interface)
}

//
// fixtures
//

/// A small lattice body for tests.
#[doc(hidden)]
pub fn tiny_fold() -> (LumpedSolid, Interface) {
    lattice(&LatticeParams {
        nx: 5,
        ny: 3,
        ..Default::default()
    })
}

/// A single mass on a spring, unit mass and stiffness per unit modulus.
#[doc(hidden)]
pub fn single_dof() -> LumpedSolid {
    LumpedSolid {
        mass: na::DVector::from_element(1, 1.0),
        stiffness_basis: vec![nas::CsrMatrix::identity(1)],
        traction: nas::CsrMatrix::zeros(1, 0),
        contact: Vec::new(),
        dirichlet: DirichletBc::none(1),
    }
}

/// A single free 2D point of unit mass at height `y_ref`,
/// loaded downward by pressure and subject to contact.
#[doc(hidden)]
pub fn single_point(y_ref: f64) -> (LumpedSolid, Interface) {
    let mut traction = nas::CooMatrix::new(2, 1);
    traction.push(1, 0, -1.0);
    let solid = LumpedSolid {
        mass: na::DVector::from_element(2, 1.0),
        stiffness_basis: vec![nas::CsrMatrix::identity(2)],
        traction: nas::CsrMatrix::from(&traction),
        contact: vec![ContactDof {
            dof: 1,
            reference: y_ref,
        }],
        dirichlet: DirichletBc::none(2),
    };
    let interface = Interface {
        x_dofs: vec![0],
        y_dofs: vec![1],
        reference: vec![Vec2::new(0.0, y_ref)],
    };
    (solid, interface)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{newmark::NewmarkParams, properties::SolidProperties, state::SolidState};
    use approx::relative_eq;

    fn sample_point(
        solid: &LumpedSolid,
    ) -> (SolidState, na::DVector<f64>, na::DVector<f64>, SolidProperties) {
        let n = solid.num_dofs();
        let wave = |scale: f64, phase: f64| {
            let mut vec = na::DVector::from_fn(n, |i, _| scale * (i as f64 * 0.7 + phase).sin());
            solid.dirichlet().apply_vector(&mut vec);
            vec
        };
        let state0 = SolidState {
            u: wave(1e-2, 0.0),
            v: wave(0.3, 1.0),
            a: wave(5.0, 2.0),
        };
        let u1 = wave(1.2e-2, 0.3);
        let pressure = na::DVector::from_fn(solid.num_pressure_dofs(), |i, _| 1.0 - 0.1 * i as f64);
        let mut props = SolidProperties::uniform(solid.num_parameters(), 50.0, 1.3);
        props.emod = na::DVector::from_fn(solid.num_parameters(), |k, _| 50.0 + 3.0 * k as f64);
        props.rayleigh_m = 0.1;
        props.rayleigh_k = 0.02;
        props.k_collision = 1e3;
        // low enough that some top nodes are in contact
        props.y_collision = 0.68;
        (state0, u1, pressure, props)
    }

    /// Compare a Jacobian column by column with central differences.
    fn check_jacobian(
        analytic: &nas::CsrMatrix<f64>,
        input: &na::DVector<f64>,
        eval: impl Fn(&na::DVector<f64>) -> na::DVector<f64>,
        name: &str,
    ) {
        let dense = nas::convert::serial::convert_csr_dense(analytic);
        let h = 1e-6;
        for j in 0..input.len() {
            let mut plus = input.clone();
            plus[j] += h;
            let mut minus = input.clone();
            minus[j] -= h;
            let fd = (eval(&plus) - eval(&minus)) / (2.0 * h);
            for i in 0..fd.len() {
                assert!(
                    relative_eq!(fd[i], dense[(i, j)], epsilon = 1e-4, max_relative = 1e-5),
                    "{name}[{i}, {j}]: finite difference {} vs exact {}",
                    fd[i],
                    dense[(i, j)],
                );
            }
        }
    }

    #[test]
    fn jacobians_match_finite_differences() {
        let (solid, _) = tiny_fold();
        let (state0, u1, pressure, props) = sample_point(&solid);
        let at = LinearizationPoint {
            state0: &state0,
            u1: &u1,
            dt: 1e-2,
            pressure: &pressure,
            props: &props,
            newmark: NewmarkParams::default(),
        };
        let residual_with = |state0: &SolidState, u1: &na::DVector<f64>, p: &na::DVector<f64>| {
            solid.residual(&LinearizationPoint {
                state0,
                u1,
                pressure: p,
                ..at
            })
        };

        check_jacobian(&solid.df_du1(&at), &u1, |x| residual_with(&state0, x, &pressure), "df/du1");
        check_jacobian(
            &solid.df_du0(&at),
            &state0.u,
            |x| residual_with(&SolidState { u: x.clone(), ..state0.clone() }, &u1, &pressure),
            "df/du0",
        );
        check_jacobian(
            &solid.df_dv0(&at),
            &state0.v,
            |x| residual_with(&SolidState { v: x.clone(), ..state0.clone() }, &u1, &pressure),
            "df/dv0",
        );
        check_jacobian(
            &solid.df_da0(&at),
            &state0.a,
            |x| residual_with(&SolidState { a: x.clone(), ..state0.clone() }, &u1, &pressure),
            "df/da0",
        );
        check_jacobian(&solid.df_dpressure(&at), &pressure, |x| residual_with(&state0, &u1, x), "df/dp");
        check_jacobian(
            &solid.df_dparameter(&at),
            &props.emod,
            |x| {
                let props = SolidProperties {
                    emod: x.clone(),
                    ..props.clone()
                };
                solid.residual(&LinearizationPoint { props: &props, ..at })
            },
            "df/dE",
        );
    }

    #[test]
    fn lattice_is_consistent() {
        let params = LatticeParams::default();
        let (solid, interface) = lattice(&params);
        assert_eq!(solid.num_dofs(), 2 * params.nx * params.ny);
        assert_eq!(solid.num_parameters(), params.nx * params.ny);
        assert_eq!(solid.num_pressure_dofs(), params.nx);
        assert_eq!(interface.reference.len(), params.nx);
        assert_eq!(solid.dirichlet().len(), 2 * params.nx);

        // total mass is the strip's area: h0 w + 2 h1 w / pi, up to the polygon error
        let total: f64 = solid.mass.iter().step_by(2).sum();
        let exact = params.h0 * params.width + 2.0 * params.h1 * params.width / std::f64::consts::PI;
        assert!(relative_eq!(total, exact, max_relative = 0.05), "total mass {total}");

        // rigid translations produce no elastic force
        let emod = na::DVector::from_element(solid.num_parameters(), 1.0);
        let stiffness = solid.stiffness(&emod);
        let shift = na::DVector::from_fn(solid.num_dofs(), |i, _| if i % 2 == 0 { 1.0 } else { 0.0 });
        let force = &stiffness * &shift;
        assert!(force.norm() < 1e-12, "rigid translation force {force:?}");

        // the surface load adds up to the pressure times the width
        let pressure = na::DVector::from_element(params.nx, 1.0);
        let load = &solid.traction * &pressure;
        assert!(relative_eq!(load.sum(), -params.width, epsilon = 1e-12));
    }
}
