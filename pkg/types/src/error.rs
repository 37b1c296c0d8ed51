use thiserror::Error;

use crate::meta::ObjectKey;

/// Errors returned synchronously by the control-plane API.
///
/// Failures of asynchronous transitions never surface here; they show up in
/// the object's status and as `Warning` events.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(ObjectKey),

    #[error("{0} already exists")]
    AlreadyExists(ObjectKey),

    #[error("quota exceeded in namespace {namespace}: {resource} used {used} of {limit}")]
    QuotaExceeded {
        namespace: String,
        resource: &'static str,
        used: u64,
        limit: u64,
    },

    #[error("conflict on {key}: expected resourceVersion {expected}, found {actual}")]
    Conflict {
        key: ObjectKey,
        expected: u64,
        actual: u64,
    },

    #[error("simulated failure: {reason}: {message}")]
    SimulatedFailure { reason: String, message: String },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("invalid: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;
