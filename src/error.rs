//! Error taxonomy for construction-time and invariant failures.
//!
//! Divergences and numerical refusals are *data*, not errors (see
//! `driver::TransitionStats::numerical_error` and the `log::warn!` call sites in
//! `adaptors::mass_matrix`): only bad configuration and dimension mismatches at
//! construction surface here.

use thiserror::Error;

/// Errors produced while constructing or (re-)configuring sampler components.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HmcError {
    /// A configuration value was out of its valid range.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of which value was invalid and why.
        reason: String,
    },
    /// A metric or phase point did not match the target's declared dimension.
    ///
    /// Only ever raised at construction/reinitialization time; a mismatch
    /// discovered mid-run is a programmer error and panics instead.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Dimension the target declares.
        expected: usize,
        /// Dimension actually supplied.
        found: usize,
    },
    /// Mass-matrix finalization produced a non positive-definite matrix.
    ///
    /// Not fatal: callers that observe this should keep using the prior
    /// metric. Kept as a variant mainly so `log::warn!` call sites have a
    /// `Display` value to format; the sampling loop itself never returns
    /// this as an `Err`.
    #[error("singular mass matrix at finalize, keeping prior metric")]
    SingularMassMatrix,
}

pub type Result<T> = std::result::Result<T, HmcError>;
