//! The error type shared by every fallible operation in the crate.

/// Errors produced by the forward and adjoint passes.
///
/// Nothing in this crate recovers from these internally;
/// they all surface to the caller of the integration driver or adjoint engine.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The target time sequence or step configuration is unusable.
    #[error("Invalid time configuration: {reason}")]
    InvalidTimes {
        /// Description of what was wrong.
        reason: String,
    },
    /// A configuration value is out of its valid range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// A configuration file could not be parsed.
    #[error("Parsing the configuration failed")]
    ConfigParse(#[from] serde_json::Error),
    /// A vector or property doesn't have the size the model expects.
    #[error("Dimension mismatch in {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Name of the mismatched quantity.
        what: &'static str,
        /// Size required by the model.
        expected: usize,
        /// Size that was given.
        actual: usize,
    },
    /// Newton's method hit its iteration cap without meeting either tolerance.
    #[error("Newton solve did not converge in {iterations} iterations (abs {abs_err:e}, rel {rel_err:e})")]
    NewtonDiverged {
        /// Iterations performed.
        iterations: usize,
        /// Final absolute residual norm.
        abs_err: f64,
        /// Final residual norm relative to the initial one.
        rel_err: f64,
    },
    /// The fixed-point iteration between solid and fluid hit its iteration cap.
    #[error("Solid-fluid coupling did not converge in {iterations} iterations (abs {abs_err:e}, rel {rel_err:e})")]
    CouplingDiverged {
        /// Fixed-point iterations performed.
        iterations: usize,
        /// Final absolute residual norm.
        abs_err: f64,
        /// Final residual norm relative to the initial one.
        rel_err: f64,
    },
    /// A linear system could not be factorized.
    #[error("Singular linear system in {context}")]
    SingularSystem {
        /// Which solve failed.
        context: &'static str,
    },
    /// The adaptive controller refined the time step below anything useful.
    #[error("Time step collapsed to {dt:e} after {refinements} refinements")]
    StepSizeCollapsed {
        /// Last attempted time step.
        dt: f64,
        /// Number of refinements attempted.
        refinements: usize,
    },
    /// The stored trajectory can't support the requested adjoint computation.
    #[error("Trajectory inconsistent with adjoint request: {reason}")]
    TrajectoryMismatch {
        /// Description of the inconsistency.
        reason: String,
    },
    /// A state store read was out of range.
    #[error("State index {index} out of range for a trajectory of {len} states")]
    StateIndex {
        /// Requested index.
        index: usize,
        /// Number of states stored.
        len: usize,
    },
    /// The flow channel closed or inverted at a surface vertex.
    #[error("Non-positive channel area {area:e} at surface vertex {vertex}")]
    NonPositiveArea {
        /// Index of the surface vertex.
        vertex: usize,
        /// The offending area.
        area: f64,
    },
}

/// Shorthand for results with this crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Return a [`DimensionMismatch`][Error::DimensionMismatch] error
/// unless `actual == expected`.
pub(crate) fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::DimensionMismatch {
            what,
            expected,
            actual,
        })
    }
}
