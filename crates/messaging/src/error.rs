//! Bus adapter errors.

use thiserror::Error;

/// Errors surfaced by the message bus adapter.
#[derive(Debug, Error)]
pub enum BusError {
    /// Delivery kept failing after the retry policy was exhausted.
    ///
    /// The message was not delivered; the caller's durable state is
    /// unchanged and the condition should be alerted on.
    #[error("Delivery to '{destination}' failed after {attempts} attempts")]
    DeliveryFailed { destination: String, attempts: u32 },

    /// No consumer is registered for a point-to-point destination.
    #[error("No consumer registered for destination '{0}'")]
    UnknownDestination(String),

    /// A message payload could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
