//! Error types for the sync engines.

use chrono::{DateTime, Utc};
use thiserror::Error;

use lodgex_channel::ChannelError;
use lodgex_core::CoreError;
use lodgex_db::DbError;

/// Errors surfaced by the sync and settlement engines.
///
/// Batch engines capture per-item failures into their summaries; only
/// these variants propagate out of an operation as a whole.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Caller supplied bad or missing input.
    #[error("Validation failed: {message}")]
    Validation {
        /// What was wrong with the input.
        message: String,
    },

    /// The request itself is malformed (e.g. unsupported action name).
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// What was malformed.
        message: String,
    },

    /// A referenced entity does not exist.
    #[error("{resource} not found: {id}")]
    NotFound {
        /// Entity kind.
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
    #[error("Lock '{name}' is held by another run since {held_since}")]
    Conflict {
        /// Lock name.
        name: String,
        /// When the live lease started.
        held_since: DateTime<Utc>,
    },

    /// A property or room is missing required configuration.
    #[error("Configuration error: {message}")]
    Configuration {
        /// What configuration is missing.
        message: String,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl SyncError {
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
}

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation { message } => Self::Validation { message },
            CoreError::NotFound { resource, id } => Self::NotFound { resource, id },
            CoreError::Upstream { message } => Self::Upstream { message },
            CoreError::Conflict { name } => Self::Conflict {
                name,
                held_since: Utc::now(),
            },
            CoreError::Configuration { message } => Self::Configuration { message },
        }
    }
}

impl From<ChannelError> for SyncError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::MissingCredential { property_id } => Self::Configuration {
                message: format!("property {property_id} has no channel credential"),
            },
            other => Self::Upstream {
                message: other.to_string(),
            },
        }
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;
