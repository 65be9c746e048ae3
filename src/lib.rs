//! Time-stepping simulation of vocal-fold vibration driven by airflow,
//! with discrete adjoint gradients of output functionals
//! with respect to the elastic modulus field of the fold.
//!
//! A simulation couples a [`SolidResidual`] body, stepped in time with the
//! implicit Newmark scheme, to a quasi-steady [`FluidModel`]
//! acting on the body's deformed surface. A forward run through an [`Integrator`]
//! writes every accepted state into a [`StateWriter`],
//! and [`adjoint_gradient`] later walks the stored trajectory backwards
//! to compute the gradient of a [`Functional`].
//!
//! # Example
//!
//! ```
//! use vocalfold::{
//!     adjoint_gradient, fluid::Bernoulli, functional::{DisplacementProjection, Sampling},
//!     solid::{lattice, LatticeParams}, FluidProperties, FsiModel, IntegratorConfig,
//!     Integrator, MemoryStore, SolidProperties, SolidResidual, SolidState, na,
//! };
//!
//! let (solid, interface) = lattice(&LatticeParams::default());
//! let num_dofs = solid.num_dofs();
//! let num_params = solid.num_parameters();
//! let model = FsiModel::new(solid, Bernoulli, interface)?;
//! let props = SolidProperties::uniform(num_params, 100.0, 1.0);
//! let config = IntegratorConfig { dt_max: 1e-3, ..Default::default() };
//! let fluid = FluidProperties { p_sub: 1.0, p_sup: 0.0, rho: 1.0, a_sub: 1.0, y_midline: 0.75 };
//!
//! let mut store = MemoryStore::new();
//! Integrator::new(&model, &props, &config)?.integrate(
//!     &SolidState::zeros(num_dofs),
//!     0.0,
//!     &[0.0, 5e-3],
//!     &fluid.into(),
//!     &mut store,
//! )?;
//!
//! let functional = DisplacementProjection {
//!     weights: na::DVector::from_element(num_dofs, 1.0),
//!     sampling: Sampling::Final,
//! };
//! let grad = adjoint_gradient(&model, &store, &functional, &config)?;
//! assert_eq!(grad.len(), num_params);
//! # Ok::<(), vocalfold::Error>(())
//! ```

#![warn(missing_docs)]

pub mod error;
#[doc(inline)]
pub use error::{Error, Result};

pub mod config;
#[doc(inline)]
pub use config::{CouplingScheme, IntegratorConfig};

pub mod bc;
pub mod linalg;

pub mod newmark;
#[doc(inline)]
pub use newmark::NewmarkParams;

pub mod state;
#[doc(inline)]
pub use state::{AdjointState, FluidState, SolidState, StepInfo};

pub mod properties;
#[doc(inline)]
pub use properties::{FluidProperties, FluidSchedule, SolidProperties};

pub mod residual;
#[doc(inline)]
pub use residual::{LinearizationPoint, SolidResidual};

pub mod fluid;
#[doc(inline)]
pub use fluid::FluidModel;

pub mod solid;
pub mod model;
#[doc(inline)]
pub use model::{FsiModel, Interface};

pub mod newton;

pub mod forward;
#[doc(inline)]
pub use forward::{Increment, Stepper};

pub mod adaptive;

pub mod integrate;
#[doc(inline)]
pub use integrate::{Integrator, RunSummary};

pub mod store;
#[doc(inline)]
pub use store::{MemoryStore, StateReader, StateWriter};

pub mod functional;
#[doc(inline)]
pub use functional::Functional;

pub mod adjoint;
#[doc(inline)]
pub use adjoint::adjoint_gradient;

// nalgebra re-exports of common types for convenience

pub use nalgebra as na;
/// Type alias for a 2D `nalgebra` vector.
pub type Vec2 = na::Vector2<f64>;
