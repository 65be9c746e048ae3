//! Quasi-steady flow models producing the pressure load on the solid surface.
//!
//! A model is a pure function of the surface configuration and the fluid properties:
//! nothing is carried over between calls, which is what allows the solid and
//! fluid to be coupled by simple iteration within a time step.
//!
//! Surface quantities are laid out vertex by vertex,
//! `[x_0, y_0, x_1, y_1, ...]`, with vertices ordered in the flow direction.

use nalgebra as na;
use nalgebra_sparse as nas;

use crate::{
    properties::FluidProperties,
    state::{FluidInfo, FluidState},
    Error, Result, Vec2,
};

/// Kinematic state of the fluid-structure interface.
#[derive(Clone, Debug, PartialEq)]
pub struct SurfaceState {
    /// Undeformed vertex positions.
    pub reference: Vec<Vec2>,
    /// Vertex displacements, `2 * reference.len()` entries.
    pub u: na::DVector<f64>,
    /// Vertex velocities, `2 * reference.len()` entries.
    pub v: na::DVector<f64>,
}

impl SurfaceState {
    /// Number of surface vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.reference.len()
    }

    /// Deformed position of vertex `i`.
    #[inline]
    pub fn position(&self, i: usize) -> Vec2 {
        self.reference[i] + Vec2::new(self.u[2 * i], self.u[2 * i + 1])
    }
}

/// A quasi-steady model mapping the surface configuration to a pressure field.
pub trait FluidModel {
    /// Compute the flow rate and the pressure at every surface vertex.
    fn solve(
        &self,
        surface: &SurfaceState,
        props: &FluidProperties,
    ) -> Result<(FluidState, FluidInfo)>;

    /// Sensitivity of the vertex pressures to the surface displacement,
    /// a `num_vertices x 2 num_vertices` matrix.
    fn dpressure_dsurface(
        &self,
        surface: &SurfaceState,
        props: &FluidProperties,
    ) -> Result<nas::CsrMatrix<f64>>;

    /// Sensitivity of the flow rate to the surface displacement.
    fn dflow_rate_dsurface(
        &self,
        surface: &SurfaceState,
        props: &FluidProperties,
    ) -> Result<na::DVector<f64>>;
}

/// No flow at all. Every vertex sees zero pressure.
#[derive(Clone, Copy, Debug, Default)]
pub struct ZeroPressure;

impl FluidModel for ZeroPressure {
    fn solve(
        &self,
        surface: &SurfaceState,
        _props: &FluidProperties,
    ) -> Result<(FluidState, FluidInfo)> {
        let info = match surface.num_vertices() {
            0 => FluidInfo::default(),
            _ => FluidInfo {
                xy_min: surface.position(0),
                xy_sep: surface.position(0),
                ..Default::default()
            },
        };
        Ok((FluidState::zeros(surface.num_vertices()), info))
    }

    fn dpressure_dsurface(
        &self,
        surface: &SurfaceState,
        _props: &FluidProperties,
    ) -> Result<nas::CsrMatrix<f64>> {
        let n = surface.num_vertices();
        Ok(nas::CsrMatrix::zeros(n, 2 * n))
    }

    fn dflow_rate_dsurface(
        &self,
        surface: &SurfaceState,
        _props: &FluidProperties,
    ) -> Result<na::DVector<f64>> {
        Ok(na::DVector::zeros(2 * surface.num_vertices()))
    }
}

/// One-dimensional Bernoulli flow through a symmetric channel,
/// separating at the narrowest point.
///
/// The channel area at vertex `i` is `2 (y_midline - y_i)`.
/// Upstream of separation the pressure follows Bernoulli's equation
/// from the inlet area `a_sub`,
/// and at or after the separation vertex the outlet pressure `p_sup` applies.
#[derive(Clone, Copy, Debug, Default)]
pub struct Bernoulli;

/// Intermediate quantities shared by the solution and its sensitivities.
struct BernoulliFlow {
    area: Vec<f64>,
    idx_min: usize,
    idx_sep: usize,
    /// Squared flow rate.
    q_sqr: f64,
    /// ∂(q²)/∂a_sep
    dq_sqr_da_sep: f64,
}

impl Bernoulli {
    fn flow(surface: &SurfaceState, props: &FluidProperties) -> Result<BernoulliFlow> {
        let area: Vec<f64> = (0..surface.num_vertices())
            .map(|i| 2.0 * (props.y_midline - surface.position(i).y))
            .collect();
        if let Some((vertex, &area)) = area.iter().enumerate().find(|&(_, &a)| !(a > 0.0)) {
            return Err(Error::NonPositiveArea { vertex, area });
        }
        // last index of the minimum area
        let idx_min = area
            .iter()
            .enumerate()
            .fold(0, |min, (i, &a)| if a <= area[min] { i } else { min });
        // separation occurs immediately past the narrowest point
        let idx_sep = idx_min;
        let a_sep = area[idx_sep];

        let coeff = 2.0 * (props.p_sup - props.p_sub) / props.rho;
        let denom = props.a_sub.powi(-2) - a_sep.powi(-2);
        let q_sqr = coeff / denom;
        let dq_sqr_da_sep = -coeff / (denom * denom) * (2.0 / a_sep.powi(3));

        Ok(BernoulliFlow {
            area,
            idx_min,
            idx_sep,
            q_sqr,
            dq_sqr_da_sep,
        })
    }
}

impl FluidModel for Bernoulli {
    fn solve(
        &self,
        surface: &SurfaceState,
        props: &FluidProperties,
    ) -> Result<(FluidState, FluidInfo)> {
        if surface.num_vertices() == 0 {
            return ZeroPressure.solve(surface, props);
        }
        let flow = Self::flow(surface, props)?;
        let p = na::DVector::from_iterator(
            flow.area.len(),
            flow.area.iter().enumerate().map(|(i, &area)| {
                if i < flow.idx_sep {
                    props.p_sub
                        + 0.5 * props.rho * flow.q_sqr * (props.a_sub.powi(-2) - area.powi(-2))
                } else {
                    props.p_sup
                }
            }),
        );
        // reversed or stalled flow has no real rate
        let q = flow.q_sqr.max(0.0).sqrt();
        let info = FluidInfo {
            idx_sep: flow.idx_sep,
            idx_min: flow.idx_min,
            xy_min: surface.position(flow.idx_min),
            xy_sep: surface.position(flow.idx_sep),
            a_min: flow.area[flow.idx_min],
            a_sep: flow.area[flow.idx_sep],
            flow_rate: q,
        };
        Ok((FluidState { q, p }, info))
    }

    fn dpressure_dsurface(
        &self,
        surface: &SurfaceState,
        props: &FluidProperties,
    ) -> Result<nas::CsrMatrix<f64>> {
        let n = surface.num_vertices();
        let mut coo = nas::CooMatrix::new(n, 2 * n);
        if n == 0 {
            return Ok(nas::CsrMatrix::from(&coo));
        }
        let flow = Self::flow(surface, props)?;
        // only y displacements change the area
        let darea_duy = -2.0;
        let j_sep = 2 * flow.idx_sep + 1;
        for (i, &area) in flow.area.iter().enumerate().take(flow.idx_sep) {
            let dp_darea = props.rho * flow.q_sqr / area.powi(3);
            let dp_da_sep = 0.5
                * props.rho
                * flow.dq_sqr_da_sep
                * (props.a_sub.powi(-2) - area.powi(-2));
            coo.push(i, 2 * i + 1, dp_darea * darea_duy);
            coo.push(i, j_sep, dp_da_sep * darea_duy);
        }
        Ok(nas::CsrMatrix::from(&coo))
    }

    fn dflow_rate_dsurface(
        &self,
        surface: &SurfaceState,
        props: &FluidProperties,
    ) -> Result<na::DVector<f64>> {
        let n = surface.num_vertices();
        let mut dq = na::DVector::zeros(2 * n);
        if n == 0 {
            return Ok(dq);
        }
        let flow = Self::flow(surface, props)?;
        if flow.q_sqr > 0.0 {
            let q = flow.q_sqr.sqrt();
            dq[2 * flow.idx_sep + 1] = flow.dq_sqr_da_sep / (2.0 * q) * -2.0;
        }
        Ok(dq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_relative_eq, relative_eq};

    /// A converging-diverging channel with the narrowest point at vertex 3.
    fn channel() -> (SurfaceState, FluidProperties) {
        let reference: Vec<Vec2> = (0..6)
            .map(|i| {
                let x = i as f64 * 0.2;
                Vec2::new(x, 0.5 + 0.2 * (std::f64::consts::PI * x / 1.0).sin())
            })
            .collect();
        let n = reference.len();
        let u = na::DVector::from_fn(2 * n, |j, _| 0.01 * ((j * 7 % 5) as f64 - 2.0));
        let surface = SurfaceState {
            reference,
            u,
            v: na::DVector::zeros(2 * n),
        };
        let props = FluidProperties {
            p_sub: 1.0,
            p_sup: 0.0,
            rho: 1.0,
            a_sub: 1.0,
            y_midline: 0.75,
        };
        (surface, props)
    }

    #[test]
    fn bernoulli_separates_at_minimum() {
        let (surface, props) = channel();
        let (state, info) = Bernoulli.solve(&surface, &props).unwrap();
        assert_eq!(info.idx_min, info.idx_sep);
        for i in 0..surface.num_vertices() {
            let area = 2.0 * (props.y_midline - surface.position(i).y);
            assert!(area >= info.a_min, "vertex {i} narrower than the minimum");
        }
        // pressure drops monotonically toward the narrowest point
        for i in 1..info.idx_sep {
            let area_prev = 2.0 * (props.y_midline - surface.position(i - 1).y);
            let area = 2.0 * (props.y_midline - surface.position(i).y);
            if area < area_prev {
                assert!(state.p[i] < state.p[i - 1], "pressure {:?}", state.p);
            }
        }
        for i in info.idx_sep..surface.num_vertices() {
            assert_eq!(state.p[i], props.p_sup);
        }
        // Bernoulli: p_sub + 1/2 rho q^2 / a_sub^2 = p_sup + 1/2 rho q^2 / a_sep^2
        let lhs = props.p_sub + 0.5 * props.rho * state.q.powi(2) / props.a_sub.powi(2);
        let rhs = props.p_sup + 0.5 * props.rho * state.q.powi(2) / info.a_sep.powi(2);
        assert_relative_eq!(lhs, rhs, max_relative = 1e-12);
        assert_eq!(state.q, info.flow_rate);
    }

    #[test]
    fn bernoulli_sensitivity_matches_finite_differences() {
        let (surface, props) = channel();
        let dp = nas::convert::serial::convert_csr_dense(
            &Bernoulli.dpressure_dsurface(&surface, &props).unwrap(),
        );
        let dq = Bernoulli.dflow_rate_dsurface(&surface, &props).unwrap();
        let (base, _) = Bernoulli.solve(&surface, &props).unwrap();
        let h = 1e-7;
        for j in 0..surface.u.len() {
            let mut perturbed = surface.clone();
            perturbed.u[j] += h;
            let (state, _) = Bernoulli.solve(&perturbed, &props).unwrap();
            let fd = (&state.p - &base.p) / h;
            for i in 0..fd.len() {
                assert!(
                    relative_eq!(fd[i], dp[(i, j)], epsilon = 1e-5, max_relative = 1e-4),
                    "dp[{i}]/du[{j}]: finite difference {} vs exact {}",
                    fd[i],
                    dp[(i, j)],
                );
            }
            let fd_q = (state.q - base.q) / h;
            assert!(
                relative_eq!(fd_q, dq[j], epsilon = 1e-5, max_relative = 1e-4),
                "dq/du[{j}]: finite difference {fd_q} vs exact {}",
                dq[j],
            );
        }
    }

    #[test]
    fn closed_channel_is_an_error() {
        let (mut surface, props) = channel();
        surface.u[2 * 2 + 1] = 1.0;
        assert!(matches!(
            Bernoulli.solve(&surface, &props),
            Err(Error::NonPositiveArea { vertex: 2, .. })
        ));
    }

    #[test]
    fn zero_pressure_has_no_load() {
        let (surface, props) = channel();
        let (state, _) = ZeroPressure.solve(&surface, &props).unwrap();
        assert_eq!(state.p, na::DVector::zeros(6));
        assert_eq!(state.q, 0.0);
        let dp = ZeroPressure.dpressure_dsurface(&surface, &props).unwrap();
        assert_eq!((dp.nrows(), dp.ncols()), (6, 12));
    }
}
