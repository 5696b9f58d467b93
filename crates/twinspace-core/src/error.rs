//! Error types for twinspace-core

use thiserror::Error;

use crate::store::StoreError;

/// Result type alias for twinspace operations
pub type Result<T> = std::result::Result<T, Error>;

/// Service-level error taxonomy surfaced to the boundary.
#[derive(Error, Debug)]
pub enum Error {
    /// A key did not resolve — item, user, or operation target
    #[error("Not found: {0}")]
    NotFound(String),

    /// Authenticated but insufficient role
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Duplicate creation against an existing key
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Malformed input record
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation type has no registered handler
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The async dispatch queue is full; the operation was not enqueued
    #[error("Dispatch queue full, operation rejected: {0}")]
    Overloaded(String),

    /// Backing store failure; the surrounding transaction was rolled back
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Error::NotFound(what),
            StoreError::AlreadyExists(key) => Error::AlreadyExists(key),
            StoreError::Storage(msg) => Error::Storage(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_maps_into_service_error() {
        let err: Error = StoreError::NotFound("item t1/abc".into()).into();
        assert!(matches!(err, Error::NotFound(_)));

        let err: Error = StoreError::AlreadyExists("t1/abc".into()).into();
        assert!(matches!(err, Error::AlreadyExists(_)));

        let err: Error = StoreError::Storage("disk on fire".into()).into();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn error_display_carries_the_failing_key() {
        let err = Error::NotFound("item t1/abc".into());
        assert!(err.to_string().contains("t1/abc"));
    }
}
