//! Error types for the precomputation engine.
//!
//! This module defines all errors that can occur while starting a
//! precomputation run, running its jobs, or reading aggregates back.

use pulse_core::{CoreError, RunId};
use thiserror::Error;

/// A result type using `EngineError`.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No collection code was supplied.
    #[error("no collection code supplied")]
    MissingCollectionCode,

    /// No record carries the supplied collection code.
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    /// A record or aggregate store query failed.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] pulse_store::StoreError),

    /// No run with this ID is tracked.
    #[error("run not found: {0}")]
    RunNotFound(RunId),

    /// A dimension, facet, or granularity argument was invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] CoreError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Name of the error in the engine's error taxonomy.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MissingCollectionCode => "MissingCollectionCode",
            Self::UnknownCollection(_) => "UnknownCollection",
            Self::StoreUnavailable(_) => "StoreUnavailable",
            Self::RunNotFound(_) => "RunNotFound",
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::Internal(_) => "Internal",
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_store::StoreError;

    #[test]
    fn error_kinds() {
        assert_eq!(
            EngineError::MissingCollectionCode.kind(),
            "MissingCollectionCode"
        );
        assert_eq!(
            EngineError::UnknownCollection("x".into()).kind(),
            "UnknownCollection"
        );
        assert_eq!(
            EngineError::from(StoreError::Database("down".into())).kind(),
            "StoreUnavailable"
        );
    }

    #[test]
    fn only_store_and_internal_errors_are_retriable() {
        assert!(EngineError::from(StoreError::Database("down".into())).is_retriable());
        assert!(EngineError::Internal("oops".into()).is_retriable());
        assert!(!EngineError::MissingCollectionCode.is_retriable());
        assert!(!EngineError::UnknownCollection("x".into()).is_retriable());
        assert!(!EngineError::RunNotFound(RunId::generate()).is_retriable());
    }
}
