//! Unified error handling for Weft.
//!
//! Most failure paths in the synchronization engine degrade to "skip this
//! sync tick" with a log line rather than surfacing an error; a misbehaving
//! store side must never crash the host. `WeftError` covers the places where
//! a caller can meaningfully observe failure: setup, serialization, and
//! transport availability.

use serde::{Deserialize, Serialize};

/// Unified error type for Weft operations.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum WeftError {
    /// A namespace, module, or store was not found
    #[error("Not found: {message}")]
    NotFound {
        /// What was missing
        message: String,
    },

    /// State had an unusable shape
    #[error("Invalid state: {message}")]
    InvalidState {
        /// What was wrong with the state
        message: String,
    },

    /// No broadcast transport is available
    #[error("Transport unavailable: {message}")]
    TransportUnavailable {
        /// Why no transport could be used
        message: String,
    },

    /// Serialization or deserialization failed
    #[error("Serialization error: {message}")]
    Serialization {
        /// The underlying encode/decode failure
        message: String,
    },

    /// The session or bridge was already disposed
    #[error("Disposed: {message}")]
    Disposed {
        /// Which resource was already torn down
        message: String,
    },

    /// Internal invariant violation
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the violated invariant
        message: String,
    },
}

impl WeftError {
    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create an invalid-state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a transport-unavailable error
    pub fn transport_unavailable(message: impl Into<String>) -> Self {
        Self::TransportUnavailable {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a disposed error
    pub fn disposed(message: impl Into<String>) -> Self {
        Self::Disposed {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for WeftError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

/// Result alias for Weft operations.
pub type WeftResult<T> = Result<T, WeftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_category_and_message() {
        let err = WeftError::not_found("legacy module \"user\"");
        assert_eq!(err.to_string(), "Not found: legacy module \"user\"");
    }

    #[test]
    fn json_errors_convert_to_serialization() {
        let bad = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: WeftError = bad.into();
        assert!(matches!(err, WeftError::Serialization { .. }));
    }
}
