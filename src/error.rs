// Pagetrace - Client-side visitor telemetry
// Copyright (c) 2025 Pagetrace Contributors
//
// Licensed under AGPL-3.0. See LICENSE file for details.

//! Error types for Pagetrace
//!
//! Almost every failure in this subsystem degrades rather than propagates:
//! storage falls back to memory, missing observation mechanisms resolve to
//! absent metrics, and transmission failures are swallowed at the detached
//! task boundary. These enums exist for the capability seams themselves,
//! where an implementation still needs to say *what* went wrong before the
//! caller suppresses it.

use thiserror::Error;

/// Result type alias for Pagetrace operations
pub type Result<T> = std::result::Result<T, CollectError>;

/// Top-level error type for collection operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollectError {
    /// Storage tier failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Transmission failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors raised by storage backends
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    /// The backing store refused the operation or is inaccessible
    #[error("Storage tier unavailable")]
    Unavailable,

    /// Backend-specific failure
    #[error("Backend failure: {0}")]
    Backend(String),
}

/// Errors raised by the network transmission seam
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The fire-and-forget tier refused to accept the payload
    #[error("Beacon rejected payload of {size} bytes")]
    BeaconRejected { size: usize },

    /// The keep-alive request tier failed
    #[error("Request failed: {0}")]
    Request(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CollectError::Transport(TransportError::BeaconRejected { size: 2048 });
        let msg = format!("{}", err);
        assert!(msg.contains("2048"));
        assert!(msg.contains("Beacon"));
    }

    #[test]
    fn test_error_conversion() {
        let storage_err = StorageError::Backend("quota exceeded".to_string());
        let err: CollectError = storage_err.into();
        assert!(matches!(err, CollectError::Storage(_)));
    }
}
