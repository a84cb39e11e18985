//! Request-reply coordination with timeout.
//!
//! `send_request` dispatches a command to a participant and schedules a
//! deferred timeout event; the saga then simply stays in its current state
//! until a reply, fault, or the timeout message arrives. Whichever of the
//! three shows up first wins the arbitration; everything after that (the
//! losing timeout, a duplicate reply) resolves to nothing and is dropped.
//! The bus is at-least-once, so this single-resolution guard is what keeps
//! the engine from double-applying a transition for one logical request.
//!
//! Arbitration and consumption are two steps: `arbitrate` only inspects
//! the pending record, and `complete` removes it once the winning
//! transition has been durably saved. A save that fails in between leaves
//! the record intact, so the redelivery of the same reply or timeout can
//! win again instead of stranding the saga.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::CorrelationId;
use contracts::{RequestKind, RequestTimedOut};
use messaging::{Message, MessageBus};
use tokio::sync::RwLock;

use crate::error::Result;

/// How a pending request resolved.
#[derive(Debug, Clone)]
pub enum RequestOutcome {
    /// The participant replied successfully.
    Success,
    /// The participant explicitly reported failure.
    Fault(String),
    /// No reply within the configured deadline.
    TimedOut,
}

/// Record of an outstanding request, kept until first resolution.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub kind: RequestKind,
    pub sent_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

/// Sends participant commands and arbitrates their resolutions.
#[derive(Clone)]
pub struct RequestReplyCoordinator<B> {
    bus: Arc<B>,
    pending: Arc<RwLock<HashMap<(CorrelationId, RequestKind), PendingRequest>>>,
}

impl<B: MessageBus> RequestReplyCoordinator<B> {
    /// Creates a coordinator on top of a bus adapter.
    pub fn new(bus: Arc<B>) -> Self {
        Self {
            bus,
            pending: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Dispatches `command` to the participant queue for `kind` and
    /// schedules a deferred timeout event. Non-blocking: returns as soon
    /// as the bus accepted both messages.
    pub async fn send_request(
        &self,
        correlation_id: CorrelationId,
        kind: RequestKind,
        command: Message,
        timeout: Duration,
    ) -> Result<()> {
        let timeout_event = RequestTimedOut {
            order_id: correlation_id,
            request: kind,
        };
        let timeout_message = Message::new(correlation_id, "RequestTimedOut", &timeout_event)?;

        let sent_at = Utc::now();
        let record = PendingRequest {
            kind,
            sent_at,
            deadline: sent_at
                + chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::zero()),
        };

        // Record before sending so a reply can never beat the bookkeeping.
        self.pending
            .write()
            .await
            .insert((correlation_id, kind), record);

        if let Err(err) = self.bus.send(kind.queue(), command).await {
            self.pending.write().await.remove(&(correlation_id, kind));
            return Err(err.into());
        }

        // A request without its timeout could hang forever, so a failed
        // schedule voids the request too. The command may still reach the
        // participant; its reply then loses the arbitration and is dropped.
        if let Err(err) = self.bus.schedule_deferred(timeout, timeout_message).await {
            self.pending.write().await.remove(&(correlation_id, kind));
            return Err(err.into());
        }

        tracing::debug!(%correlation_id, request = %kind, ?timeout, "request dispatched");
        Ok(())
    }

    /// Arbitrates an arrival for the pending request `(correlation_id,
    /// kind)` without consuming the record.
    ///
    /// While the request is pending the arrival wins and the outcome is
    /// returned for the engine to observe as its triggering event. Once
    /// [`complete`](Self::complete) has consumed the record, any later
    /// arrival (duplicate reply, stale timeout, reply after timeout)
    /// returns `None` and must be swallowed by the caller.
    pub async fn arbitrate(
        &self,
        correlation_id: CorrelationId,
        kind: RequestKind,
        outcome: RequestOutcome,
    ) -> Option<RequestOutcome> {
        if self.pending.read().await.contains_key(&(correlation_id, kind)) {
            Some(outcome)
        } else {
            tracing::debug!(
                %correlation_id,
                request = %kind,
                "arrival for already-resolved request, dropped"
            );
            None
        }
    }

    /// Consumes the pending record once the winning arrival's transition
    /// has been durably saved. Not before: an arrival whose save failed
    /// must be able to win again when the bus redelivers it.
    pub async fn complete(&self, correlation_id: CorrelationId, kind: RequestKind) {
        self.pending.write().await.remove(&(correlation_id, kind));
    }

    /// Returns the number of unresolved requests.
    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }
}
