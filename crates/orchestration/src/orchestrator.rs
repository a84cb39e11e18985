//! The saga orchestrator: bus messages in, state transitions and
//! participant commands out.
//!
//! Every inbound message passes through the same pipeline. Replies,
//! faults and timeouts are first arbitrated by the request/reply
//! coordinator so that only the first resolution of a request reaches
//! the engine; the pending record is consumed only after the resulting
//! transition was durably saved, so a save that fails leaves the record
//! in place for the redelivery to win. The engine's transition table
//! then provides a second layer of idempotence for anything that slips
//! past (redeliveries of `OrderCreated`, events for terminal sagas).

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;

use contracts::{
    InventoryReserved, OrderCreated, OrderShipped, ParticipantFault, PaymentAuthorized,
    RequestKind, RequestTimedOut,
};
use messaging::{Message, MessageBus};

use crate::compensation::CompensationDispatcher;
use crate::config::OrchestrationConfig;
use crate::engine::SagaEngine;
use crate::error::Result;
use crate::instance::SagaInstance;
use crate::order::{OrderSaga, OrderSagaEffect, OrderSagaEvent, ParticipantCommand};
use crate::request_reply::{RequestOutcome, RequestReplyCoordinator};
use crate::store::SagaStore;

/// Drives order sagas from bus traffic.
pub struct SagaOrchestrator<B, S> {
    engine: SagaEngine<OrderSaga, S>,
    coordinator: RequestReplyCoordinator<B>,
    compensator: CompensationDispatcher<B>,
}

impl<B, S> SagaOrchestrator<B, S>
where
    B: MessageBus,
    S: SagaStore<SagaInstance>,
{
    /// Wires an orchestrator over a bus adapter and an instance store.
    pub fn new(bus: Arc<B>, store: S, config: OrchestrationConfig) -> Self {
        Self {
            engine: SagaEngine::new(OrderSaga::new(config.timeouts), store),
            coordinator: RequestReplyCoordinator::new(bus.clone()),
            compensator: CompensationDispatcher::new(bus),
        }
    }

    /// Returns the instance store, for inspection.
    pub fn store(&self) -> &S {
        self.engine.store()
    }

    /// Returns the number of requests awaiting a reply.
    pub async fn pending_requests(&self) -> usize {
        self.coordinator.pending_count().await
    }

    /// Consumes bus messages until the channel closes. Per-message
    /// failures are logged and skipped; one poison message must not
    /// stall every saga behind it.
    pub async fn run(self: Arc<Self>, mut receiver: UnboundedReceiver<Message>) {
        while let Some(message) = receiver.recv().await {
            if let Err(err) = self.handle_message(&message).await {
                tracing::error!(
                    correlation_id = %message.correlation_id,
                    kind = %message.kind,
                    error = %err,
                    "failed to process message"
                );
                metrics::counter!("orchestrator_message_errors_total").increment(1);
            }
        }
        tracing::info!("orchestrator channel closed, stopping");
    }

    /// Processes one inbound message. Messages with kinds the
    /// orchestrator does not consume are ignored.
    #[tracing::instrument(skip(self, message), fields(kind = %message.kind, correlation_id = %message.correlation_id))]
    pub async fn handle_message(&self, message: &Message) -> Result<()> {
        metrics::counter!("orchestrator_messages_total", "kind" => message.kind.clone())
            .increment(1);

        let Some((correlation_id, event)) = self.translate(message).await? else {
            return Ok(());
        };

        let effects = self.engine.handle_event(correlation_id, &event).await?;

        // The transition is durable, so the request the event resolved can
        // be consumed now. Doing it earlier would let a failed save strand
        // the saga: the redelivered reply would look stale and be dropped.
        if let Some(kind) = event.resolved_request() {
            self.coordinator.complete(correlation_id, kind).await;
        }

        for effect in effects {
            self.execute(correlation_id, effect).await?;
        }
        Ok(())
    }

    /// Maps a bus message to the saga event it carries, gating replies,
    /// faults and timeouts through the coordinator. Returns `None` when
    /// the message is not for us or lost the resolution race.
    async fn translate(
        &self,
        message: &Message,
    ) -> Result<Option<(common::CorrelationId, OrderSagaEvent)>> {
        let event = match message.kind.as_str() {
            "OrderCreated" => {
                let created: OrderCreated = message.decode()?;
                Some((created.order_id, OrderSagaEvent::OrderCreated(created)))
            }
            "PaymentAuthorized" => {
                let reply: PaymentAuthorized = message.decode()?;
                self.arbitrate(reply.order_id, RequestKind::ProcessPayment, RequestOutcome::Success)
                    .await
                    .map(|_| (reply.order_id, OrderSagaEvent::PaymentAuthorized(reply)))
            }
            "InventoryReserved" => {
                let reply: InventoryReserved = message.decode()?;
                self.arbitrate(
                    reply.order_id,
                    RequestKind::ReserveInventory,
                    RequestOutcome::Success,
                )
                .await
                .map(|_| (reply.order_id, OrderSagaEvent::InventoryReserved(reply)))
            }
            "OrderShipped" => {
                let reply: OrderShipped = message.decode()?;
                self.arbitrate(reply.order_id, RequestKind::ShipOrder, RequestOutcome::Success)
                    .await
                    .map(|_| (reply.order_id, OrderSagaEvent::OrderShipped(reply)))
            }
            "ParticipantFault" => {
                let fault: ParticipantFault = message.decode()?;
                self.arbitrate(
                    fault.order_id,
                    fault.request,
                    RequestOutcome::Fault(fault.reason.clone()),
                )
                .await
                .map(|outcome| {
                    let reason = match outcome {
                        RequestOutcome::Fault(reason) => reason,
                        _ => fault.reason.clone(),
                    };
                    let event = match fault.request {
                        RequestKind::ProcessPayment => OrderSagaEvent::PaymentFault { reason },
                        RequestKind::ReserveInventory => OrderSagaEvent::InventoryFault { reason },
                        RequestKind::ShipOrder => OrderSagaEvent::ShippingFault { reason },
                    };
                    (fault.order_id, event)
                })
            }
            "RequestTimedOut" => {
                let timeout: RequestTimedOut = message.decode()?;
                self.arbitrate(timeout.order_id, timeout.request, RequestOutcome::TimedOut)
                    .await
                    .map(|_| {
                        let event = match timeout.request {
                            RequestKind::ProcessPayment => OrderSagaEvent::PaymentTimeout,
                            RequestKind::ReserveInventory => OrderSagaEvent::InventoryTimeout,
                            RequestKind::ShipOrder => OrderSagaEvent::ShippingTimeout,
                        };
                        (timeout.order_id, event)
                    })
            }
            _ => {
                tracing::trace!("message kind not consumed by the orchestrator");
                None
            }
        };
        Ok(event)
    }

    async fn arbitrate(
        &self,
        correlation_id: common::CorrelationId,
        kind: RequestKind,
        outcome: RequestOutcome,
    ) -> Option<RequestOutcome> {
        let resolution = self
            .coordinator
            .arbitrate(correlation_id, kind, outcome)
            .await;
        if resolution.is_none() {
            metrics::counter!("saga_stale_resolutions_total").increment(1);
        }
        resolution
    }

    /// Executes one side effect of an applied transition. The state is
    /// already durable at this point, so re-execution after a crash only
    /// produces duplicates the participants tolerate.
    async fn execute(
        &self,
        correlation_id: common::CorrelationId,
        effect: OrderSagaEffect,
    ) -> Result<()> {
        match effect {
            OrderSagaEffect::SendRequest {
                kind,
                command,
                timeout,
            } => {
                let message = match command {
                    ParticipantCommand::ProcessPayment(cmd) => {
                        Message::new(correlation_id, "ProcessPayment", &cmd)?
                    }
                    ParticipantCommand::ReserveInventory(cmd) => {
                        Message::new(correlation_id, "ReserveInventory", &cmd)?
                    }
                    ParticipantCommand::ShipOrder(cmd) => {
                        Message::new(correlation_id, "ShipOrder", &cmd)?
                    }
                };
                self.coordinator
                    .send_request(correlation_id, kind, message, timeout)
                    .await?;
                metrics::counter!("saga_requests_sent_total", "request" => kind.as_str())
                    .increment(1);
            }
            OrderSagaEffect::Compensate(actions) => {
                self.compensator.dispatch(correlation_id, actions).await;
            }
        }
        Ok(())
    }
}
