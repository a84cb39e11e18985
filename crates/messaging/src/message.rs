//! The wire envelope carried by the bus.

use chrono::{DateTime, Utc};
use common::CorrelationId;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::error::Result;

/// A transport envelope wrapping one command or event.
///
/// The `kind` names the contract type inside `payload`; consumers match on
/// it before decoding. Each physical delivery gets its own `message_id`,
/// but redeliveries of the same logical message keep theirs — dedup, where
/// needed, happens on `(correlation_id, kind)` at the consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for this message.
    pub message_id: Uuid,

    /// The saga instance every consumer routes this message by.
    pub correlation_id: CorrelationId,

    /// Contract type name (e.g., "OrderCreated", "ProcessPayment").
    pub kind: String,

    /// JSON-encoded contract struct.
    pub payload: serde_json::Value,

    /// When the sender handed the message to the bus.
    pub sent_at: DateTime<Utc>,
}

impl Message {
    /// Wraps a contract value in an envelope.
    pub fn new<T: Serialize>(
        correlation_id: CorrelationId,
        kind: impl Into<String>,
        body: &T,
    ) -> Result<Self> {
        Ok(Self {
            message_id: Uuid::new_v4(),
            correlation_id,
            kind: kind.into(),
            payload: serde_json::to_value(body)?,
            sent_at: Utc::now(),
        })
    }

    /// Decodes the payload back into a contract type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Probe {
        value: u32,
    }

    #[test]
    fn envelope_roundtrip() {
        let id = CorrelationId::new();
        let msg = Message::new(id, "Probe", &Probe { value: 7 }).unwrap();

        assert_eq!(msg.correlation_id, id);
        assert_eq!(msg.kind, "Probe");
        assert_eq!(msg.decode::<Probe>().unwrap(), Probe { value: 7 });
    }

    #[test]
    fn decode_wrong_shape_fails() {
        let msg = Message::new(CorrelationId::new(), "Probe", &Probe { value: 1 }).unwrap();
        assert!(msg.decode::<Vec<String>>().is_err());
    }
}
