//! Newton's method with full steps for the solid residual of one time step.

use nalgebra as na;
use nalgebra_sparse as nas;

use crate::{bc::DirichletBc, config::NewtonConfig, linalg, Error, Result};

/// Convergence record of a Newton solve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NewtonInfo {
    /// Number of linear solves performed.
    pub iterations: usize,
    /// Final projected residual norm.
    pub abs_err: f64,
    /// Final residual norm relative to the initial one.
    pub rel_err: f64,
}

/// Solve `residual(u) = 0` starting from `u`.
///
/// Residuals and Jacobians are projected with `bc` before use,
/// so constrained entries of `u` keep their initial values.
/// Converges when either the absolute or the relative tolerance is met;
/// a non-finite residual or running out of iterations is an error.
pub fn newton_solve(
    mut u: na::DVector<f64>,
    residual: impl Fn(&na::DVector<f64>) -> na::DVector<f64>,
    jacobian: impl Fn(&na::DVector<f64>) -> nas::CsrMatrix<f64>,
    bc: &DirichletBc,
    config: &NewtonConfig,
) -> Result<(na::DVector<f64>, NewtonInfo)> {
    let mut res = bc.applied(residual(&u));
    let abs_err_0 = res.norm();
    let mut info = NewtonInfo {
        iterations: 0,
        abs_err: abs_err_0,
        rel_err: if abs_err_0 > 0.0 { 1.0 } else { 0.0 },
    };

    loop {
        log::trace!(
            "Newton iteration {}: abs {:e}, rel {:e}",
            info.iterations,
            info.abs_err,
            info.rel_err
        );
        if !info.abs_err.is_finite() {
            return Err(Error::NewtonDiverged {
                iterations: info.iterations,
                abs_err: info.abs_err,
                rel_err: info.rel_err,
            });
        }
        if info.abs_err <= config.abs_tol || info.rel_err <= config.rel_tol {
            return Ok((u, info));
        }
        if info.iterations >= config.max_iterations {
            return Err(Error::NewtonDiverged {
                iterations: info.iterations,
                abs_err: info.abs_err,
                rel_err: info.rel_err,
            });
        }

        let jac = bc.apply_matrix(&jacobian(&u));
        let du = linalg::solve(&jac, &res, "Newton step")?;
        u -= du;
        info.iterations += 1;

        res = bc.applied(residual(&u));
        info.abs_err = res.norm();
        info.rel_err = info.abs_err / abs_err_0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn solves_nonlinear_system() {
        // x^3 + y = 9, x - y = 1 has the root (2, 1); dof 2 is constrained
        let residual = |u: &na::DVector<f64>| {
            na::DVector::from_vec(vec![u[0].powi(3) + u[1] - 9.0, u[0] - u[1] - 1.0, u[2] - 5.0])
        };
        let jacobian = |u: &na::DVector<f64>| {
            nas::CsrMatrix::from(&na::DMatrix::from_row_slice(
                3,
                3,
                &[3.0 * u[0] * u[0], 1.0, 0.0, 1.0, -1.0, 0.0, 0.0, 0.0, 1.0],
            ))
        };
        let bc = DirichletBc::new(3, [2]);
        let (u, info) = newton_solve(
            na::DVector::from_vec(vec![1.5, 0.0, 0.25]),
            residual,
            jacobian,
            &bc,
            &NewtonConfig::default(),
        )
        .unwrap();
        assert_relative_eq!(u[0], 2.0, epsilon = 1e-9);
        assert_relative_eq!(u[1], 1.0, epsilon = 1e-9);
        assert_eq!(u[2], 0.25, "constrained DOF changed");
        assert!(info.iterations > 1 && info.iterations < 10, "{info:?}");
    }

    #[test]
    fn linear_problem_takes_one_step() {
        let residual = |u: &na::DVector<f64>| u * 2.0 - na::DVector::from_element(2, 4.0);
        let jacobian = |_: &na::DVector<f64>| {
            let mut id = nas::CsrMatrix::identity(2);
            for v in id.values_mut() {
                *v = 2.0;
            }
            id
        };
        let (u, info) = newton_solve(
            na::DVector::zeros(2),
            residual,
            jacobian,
            &DirichletBc::none(2),
            &NewtonConfig::default(),
        )
        .unwrap();
        assert_eq!(info.iterations, 1);
        assert_relative_eq!(u, na::DVector::from_element(2, 2.0));
    }

    #[test]
    fn iteration_cap_is_an_error() {
        // no real root, Newton wanders forever
        let residual = |u: &na::DVector<f64>| na::DVector::from_element(1, u[0] * u[0] + 1.0);
        let jacobian = |u: &na::DVector<f64>| {
            nas::CsrMatrix::from(&na::DMatrix::from_element(1, 1, 2.0 * u[0]))
        };
        let config = NewtonConfig {
            max_iterations: 5,
            ..Default::default()
        };
        let res = newton_solve(
            na::DVector::from_element(1, 0.3),
            residual,
            jacobian,
            &DirichletBc::none(1),
            &config,
        );
        assert!(
            matches!(res, Err(Error::NewtonDiverged { iterations: 5, .. })),
            "{res:?}"
        );
    }
}
