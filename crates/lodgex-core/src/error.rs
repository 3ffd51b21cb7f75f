//! Error taxonomy shared across lodgex services.
//!
//! Each variant maps to one of the outcomes callers are expected to
//! distinguish: bad input, missing entity, upstream failure, lock
//! conflict, or missing configuration.

use serde::Serialize;
use thiserror::Error;

/// Standardized error type for lodgex operations.
///
/// Batch engines capture these into their summaries; single-item
/// operations propagate them to the caller.
#[derive(Debug, Clone, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoreError {
    /// Caller supplied bad or missing input.
    #[error("Validation failed: {message}")]
    Validation {
        /// What was wrong with the input.
        message: String,
    },

    /// A referenced entity does not exist.
    #[error("{resource} not found: {id}")]
    NotFound {
        /// Entity kind (reservation, property, ...).
        resource: String,
        /// The identifier that failed to resolve.
        id: String,
    },

    /// The external channel-manager source failed.
    #[error("Upstream error: {message}")]
    Upstream {
        /// Description of the upstream failure.
        message: String,
    },

    /// Another run holds the mutual-exclusion lock.
    #[error("Lock '{name}' is held by another run")]
    Conflict {
        /// Lock name.
        name: String,
    },

    /// A property or room is missing required configuration.
    #[error("Configuration error: {message}")]
    Configuration {
        /// What configuration is missing.
        message: String,
    },
}

impl CoreError {
    /// Build a validation error from any displayable message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Build a not-found error for a resource/id pair.
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Build an upstream error from any displayable message.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    /// Build a configuration error from any displayable message.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Convenience result alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::not_found("Reservation", "p1:r42:101");
        assert_eq!(err.to_string(), "Reservation not found: p1:r42:101");

        let err = CoreError::Conflict {
            name: "orchestrator".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Lock 'orchestrator' is held by another run"
        );
    }

    #[test]
    fn test_error_serializes_with_tag() {
        let err = CoreError::validation("note text is empty");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "validation");
        assert_eq!(json["message"], "note text is empty");
    }
}
