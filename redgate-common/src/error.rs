//! Shared error model for cross-crate APIs.

use thiserror::Error;

/// Unified result type used by all public interfaces in `redgate`.
pub type RgResult<T> = Result<T, RgError>;

/// High-level error categories shared across the front-end.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RgError {
    /// Configuration is invalid for the requested operation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// Runtime state does not allow this operation.
    #[error("invalid runtime state: {0}")]
    InvalidState(&'static str),

    /// A single client command was rejected before reaching the backend.
    ///
    /// The message is user-visible and already carries the offending command name prefix.
    #[error("{0}")]
    Request(String),

    /// The backend reported an aggregate failure for an in-flight flush.
    #[error("{0}")]
    Backend(String),
}
