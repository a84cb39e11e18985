//! Inventory participant.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use common::CorrelationId;
use contracts::{
    InventoryReserved, OrderItem, ParticipantFault, ReleaseInventory, RequestKind,
    ReserveInventory,
};
use messaging::{Message, MessageBus, Result};
use tokio::sync::mpsc::UnboundedReceiver;

const FAULT_REASON: &str = "Stock not available for requested items";

#[derive(Debug, Default)]
struct InventoryState {
    /// Active reservations keyed by reservation id.
    reservations: HashMap<String, Vec<OrderItem>>,
    /// Orders already reserved, for redelivery idempotence.
    processed: HashMap<CorrelationId, String>,
    released: Vec<String>,
    next_id: u32,
    fail_on_reserve: bool,
    silent: bool,
}

/// In-memory inventory service consuming the `inventory` queue.
#[derive(Clone)]
pub struct InventoryParticipant<B> {
    bus: Arc<B>,
    state: Arc<RwLock<InventoryState>>,
}

impl<B: MessageBus> InventoryParticipant<B> {
    /// Creates an inventory participant on top of a bus adapter.
    pub fn new(bus: Arc<B>) -> Self {
        Self {
            bus,
            state: Arc::new(RwLock::new(InventoryState::default())),
        }
    }

    /// Configures the participant to report stock shortages.
    pub fn set_fail_on_reserve(&self, fail: bool) {
        self.state.write().unwrap().fail_on_reserve = fail;
    }

    /// Configures the participant to swallow requests without replying.
    pub fn set_silent(&self, silent: bool) {
        self.state.write().unwrap().silent = silent;
    }

    /// Returns the number of active reservations.
    pub fn reservation_count(&self) -> usize {
        self.state.read().unwrap().reservations.len()
    }

    /// Returns true if the given reservation was released.
    pub fn was_released(&self, reservation_id: &str) -> bool {
        self.state
            .read()
            .unwrap()
            .released
            .iter()
            .any(|id| id == reservation_id)
    }

    /// Returns the number of releases processed.
    pub fn release_count(&self) -> usize {
        self.state.read().unwrap().released.len()
    }

    /// Consumes queue messages until the channel closes.
    pub async fn run(self, mut receiver: UnboundedReceiver<Message>) {
        while let Some(message) = receiver.recv().await {
            if let Err(err) = self.handle_message(&message).await {
                tracing::error!(kind = %message.kind, error = %err, "inventory handler failed");
            }
        }
    }

    /// Processes one command. Kinds this participant does not own are
    /// ignored.
    pub async fn handle_message(&self, message: &Message) -> Result<()> {
        match message.kind.as_str() {
            "ReserveInventory" => self.reserve(message.decode()?).await,
            "ReleaseInventory" => self.release(message.decode()?).await,
            _ => Ok(()),
        }
    }

    async fn reserve(&self, command: ReserveInventory) -> Result<()> {
        let reply = {
            let mut state = self.state.write().unwrap();
            if state.silent {
                tracing::debug!(order_id = %command.order_id, "inventory participant silent, dropping request");
                return Ok(());
            }
            if state.fail_on_reserve {
                None
            } else {
                let reservation_id = match state.processed.get(&command.order_id) {
                    Some(existing) => existing.clone(),
                    None => {
                        state.next_id += 1;
                        let id = format!("RES-{:04}", state.next_id);
                        state.reservations.insert(id.clone(), command.items.clone());
                        state.processed.insert(command.order_id, id.clone());
                        id
                    }
                };
                Some(reservation_id)
            }
        };

        match reply {
            Some(reservation_id) => {
                tracing::info!(order_id = %command.order_id, %reservation_id, items = command.items.len(), "inventory reserved");
                metrics::counter!("reservations_made_total").increment(1);
                let event = InventoryReserved {
                    order_id: command.order_id,
                    reservation_id,
                    reserved_at: Utc::now(),
                };
                self.bus
                    .publish(Message::new(command.order_id, "InventoryReserved", &event)?)
                    .await
            }
            None => {
                tracing::warn!(order_id = %command.order_id, "reservation refused");
                metrics::counter!("reservations_refused_total").increment(1);
                let fault = ParticipantFault::new(
                    command.order_id,
                    RequestKind::ReserveInventory,
                    FAULT_REASON,
                );
                self.bus
                    .publish(Message::new(command.order_id, "ParticipantFault", &fault)?)
                    .await
            }
        }
    }

    async fn release(&self, command: ReleaseInventory) -> Result<()> {
        let mut state = self.state.write().unwrap();
        // Unknown or already-released reservations are ignored so
        // redeliveries stay harmless. Releases emit no reply event.
        if state.reservations.remove(&command.reservation_id).is_none() {
            tracing::debug!(order_id = %command.order_id, reservation_id = %command.reservation_id, "release for unknown reservation, ignored");
            return Ok(());
        }
        state.released.push(command.reservation_id.clone());
        drop(state);

        tracing::info!(order_id = %command.order_id, reservation_id = %command.reservation_id, "reservation released");
        metrics::counter!("reservations_released_total").increment(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Money;
    use messaging::InMemoryMessageBus;

    fn reserve_command(order_id: CorrelationId) -> ReserveInventory {
        ReserveInventory {
            order_id,
            items: vec![OrderItem::new("SKU-001", 2, Money::from_cents(500))],
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn successful_reservation_publishes_reply() {
        let bus = Arc::new(InMemoryMessageBus::new());
        let mut topic = bus.subscribe().await;
        let participant = InventoryParticipant::new(bus);
        let order_id = CorrelationId::new();

        participant
            .handle_message(&Message::new(order_id, "ReserveInventory", &reserve_command(order_id)).unwrap())
            .await
            .unwrap();

        let reply = topic.recv().await.unwrap();
        assert_eq!(reply.kind, "InventoryReserved");
        let event: InventoryReserved = reply.decode().unwrap();
        assert_eq!(event.reservation_id, "RES-0001");
        assert_eq!(participant.reservation_count(), 1);
    }

    #[tokio::test]
    async fn redelivered_reservation_reserves_once() {
        let bus = Arc::new(InMemoryMessageBus::new());
        let mut topic = bus.subscribe().await;
        let participant = InventoryParticipant::new(bus);
        let order_id = CorrelationId::new();
        let message =
            Message::new(order_id, "ReserveInventory", &reserve_command(order_id)).unwrap();

        participant.handle_message(&message).await.unwrap();
        participant.handle_message(&message).await.unwrap();

        let first: InventoryReserved = topic.recv().await.unwrap().decode().unwrap();
        let second: InventoryReserved = topic.recv().await.unwrap().decode().unwrap();
        assert_eq!(first.reservation_id, second.reservation_id);
        assert_eq!(participant.reservation_count(), 1);
    }

    #[tokio::test]
    async fn shortage_publishes_fault() {
        let bus = Arc::new(InMemoryMessageBus::new());
        let mut topic = bus.subscribe().await;
        let participant = InventoryParticipant::new(bus);
        participant.set_fail_on_reserve(true);
        let order_id = CorrelationId::new();

        participant
            .handle_message(&Message::new(order_id, "ReserveInventory", &reserve_command(order_id)).unwrap())
            .await
            .unwrap();

        let fault: ParticipantFault = topic.recv().await.unwrap().decode().unwrap();
        assert_eq!(fault.request, RequestKind::ReserveInventory);
        assert_eq!(fault.reason, "Stock not available for requested items");
        assert_eq!(participant.reservation_count(), 0);
    }

    #[tokio::test]
    async fn release_removes_reservation_without_reply() {
        let bus = Arc::new(InMemoryMessageBus::new());
        let mut topic = bus.subscribe().await;
        let participant = InventoryParticipant::new(bus);
        let order_id = CorrelationId::new();

        participant
            .handle_message(&Message::new(order_id, "ReserveInventory", &reserve_command(order_id)).unwrap())
            .await
            .unwrap();
        topic.recv().await.unwrap();

        let release = ReleaseInventory {
            order_id,
            reservation_id: "RES-0001".to_string(),
            timestamp: Utc::now(),
        };
        let message = Message::new(order_id, "ReleaseInventory", &release).unwrap();
        participant.handle_message(&message).await.unwrap();

        assert_eq!(participant.reservation_count(), 0);
        assert!(participant.was_released("RES-0001"));
        assert!(topic.try_recv().is_err());

        // Redelivered release is a no-op.
        participant.handle_message(&message).await.unwrap();
        assert_eq!(participant.release_count(), 1);
    }
}
