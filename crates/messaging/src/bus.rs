//! The bus adapter contract consumed by the orchestration core.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::message::Message;

/// Message transport used by the saga core and its participants.
///
/// All delivery is at-least-once: a message may arrive more than once and
/// consumers must treat redeliveries as no-ops where it matters. Transient
/// delivery failures are retried per the adapter's [`crate::RetryPolicy`];
/// exhaustion surfaces as [`crate::BusError::DeliveryFailed`].
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Broadcasts an event to every subscriber. No reply is expected.
    async fn publish(&self, message: Message) -> Result<()>;

    /// Delivers a command point-to-point to the named destination.
    async fn send(&self, destination: &str, message: Message) -> Result<()>;

    /// Delivers `message` back to subscribers after `delay`.
    ///
    /// Used exclusively for request timeouts: the scheduled message fires
    /// whether or not the request has resolved by then, so consumers must
    /// recognize stale timeouts and drop them.
    async fn schedule_deferred(&self, delay: Duration, message: Message) -> Result<()>;
}
