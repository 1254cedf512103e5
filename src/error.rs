//! Kernel error taxonomy.
//!
//! The kernel distinguishes three categories of failure: programmer
//! errors (invariant violations that indicate kernel misuse), numerical
//! failures from a hazard's inverse solve, and invalid engine
//! configuration. Termination with no remaining events is *not* an
//! error — see [`crate::algorithm::TerminationReason`].

use thiserror::Error;

/// Errors the kernel itself can raise.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An invariant the kernel relies on was violated by a caller.
    ///
    /// In debug builds these are also caught earlier by `assert!`; this
    /// variant exists so a library caller gets a typed `Result` instead
    /// of a process abort when the violation is reachable through
    /// ordinary (if incorrect) use of the external event contract.
    #[error("programmer error: {0}")]
    ProgrammerError(String),

    /// `solve_for_real_time_interval` returned a negative `dt`.
    ///
    /// A `+inf` result is not an error — it means the event never
    /// fires and is left in the timed set with `t_fire = +inf`.
    #[error("numerical failure: {0}")]
    NumericalFailure(String),

    /// An [`crate::config::EngineConfig`] value failed validation.
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience result alias for kernel operations.
pub type EngineResult<T> = Result<T, EngineError>;
