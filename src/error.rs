use thiserror::Error;

/// Errors that can occur while translating between the comms service and apps
#[derive(Error, Debug)]
pub enum AdaptorError {
    /// An inbound message did not have the expected shape
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// An app command carried a payload other than `on` or `off`
    #[error("Invalid app command: {0}")]
    InvalidCommand(String),

    /// A service descriptor named a characteristic this adaptor does not offer
    #[error("Unknown characteristic: {0}")]
    UnknownCharacteristic(String),

    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The receiving side of an outbound channel has gone away
    #[error("Channel closed: {destination}")]
    ChannelClosed {
        /// Which collaborator the message was addressed to
        destination: String,
    },

    /// The host supplied an unusable configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for adaptor operations
pub type Result<T> = std::result::Result<T, AdaptorError>;

impl AdaptorError {
    /// Check if this error was caused by bad input from a peer
    #[must_use]
    pub const fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Self::MalformedMessage(_)
                | Self::InvalidCommand(_)
                | Self::UnknownCharacteristic(_)
                | Self::Json(_)
        )
    }

    /// Check if this error indicates a delivery problem
    #[must_use]
    pub const fn is_transport_error(&self) -> bool {
        matches!(self, Self::ChannelClosed { .. })
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedMessage(message.into())
    }
}
