//! Error types for the channel-manager client.

use thiserror::Error;

/// Errors from the channel-manager source.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("Channel API error (status {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or status text.
        message: String,
    },

    /// The property has no API credential configured.
    #[error("Property {property_id} has no channel credential")]
    MissingCredential {
        /// Local property id.
        property_id: String,
    },

    /// The response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Result type for channel operations.
pub type ChannelResult<T> = std::result::Result<T, ChannelError>;
