//! Shipping participant.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use common::CorrelationId;
use contracts::{OrderShipped, ParticipantFault, RequestKind, ShipOrderRequest};
use messaging::{Message, MessageBus, Result};
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

const FAULT_REASON: &str = "Shipment not available for requested city";

#[derive(Debug, Default)]
struct ShippingState {
    /// Booked shipments keyed by order, for redelivery idempotence.
    shipments: HashMap<CorrelationId, String>,
    fail_on_ship: bool,
    silent: bool,
}

/// In-memory shipping service consuming the `shipping` queue.
#[derive(Clone)]
pub struct ShippingParticipant<B> {
    bus: Arc<B>,
    state: Arc<RwLock<ShippingState>>,
}

impl<B: MessageBus> ShippingParticipant<B> {
    /// Creates a shipping participant on top of a bus adapter.
    pub fn new(bus: Arc<B>) -> Self {
        Self {
            bus,
            state: Arc::new(RwLock::new(ShippingState::default())),
        }
    }

    /// Configures the participant to refuse shipments.
    pub fn set_fail_on_ship(&self, fail: bool) {
        self.state.write().unwrap().fail_on_ship = fail;
    }

    /// Configures the participant to swallow requests without replying.
    pub fn set_silent(&self, silent: bool) {
        self.state.write().unwrap().silent = silent;
    }

    /// Returns the number of booked shipments.
    pub fn shipment_count(&self) -> usize {
        self.state.read().unwrap().shipments.len()
    }

    /// Consumes queue messages until the channel closes.
    pub async fn run(self, mut receiver: UnboundedReceiver<Message>) {
        while let Some(message) = receiver.recv().await {
            if let Err(err) = self.handle_message(&message).await {
                tracing::error!(kind = %message.kind, error = %err, "shipping handler failed");
            }
        }
    }

    /// Processes one command. Kinds this participant does not own are
    /// ignored.
    pub async fn handle_message(&self, message: &Message) -> Result<()> {
        match message.kind.as_str() {
            "ShipOrder" => self.ship(message.decode()?).await,
            _ => Ok(()),
        }
    }

    async fn ship(&self, command: ShipOrderRequest) -> Result<()> {
        let reply = {
            let mut state = self.state.write().unwrap();
            if state.silent {
                tracing::debug!(order_id = %command.order_id, "shipping participant silent, dropping request");
                return Ok(());
            }
            if state.fail_on_ship {
                None
            } else {
                let tracking_number = match state.shipments.get(&command.order_id) {
                    Some(existing) => existing.clone(),
                    None => {
                        let tracking = new_tracking_number();
                        state.shipments.insert(command.order_id, tracking.clone());
                        tracking
                    }
                };
                Some(tracking_number)
            }
        };

        match reply {
            Some(tracking_number) => {
                tracing::info!(order_id = %command.order_id, %tracking_number, city = %command.shipping_address.city, "shipment booked");
                metrics::counter!("shipments_booked_total").increment(1);
                let event = OrderShipped {
                    order_id: command.order_id,
                    tracking_number,
                    shipped_at: Utc::now(),
                };
                self.bus
                    .publish(Message::new(command.order_id, "OrderShipped", &event)?)
                    .await
            }
            None => {
                tracing::warn!(order_id = %command.order_id, "shipment refused");
                metrics::counter!("shipments_refused_total").increment(1);
                let fault =
                    ParticipantFault::new(command.order_id, RequestKind::ShipOrder, FAULT_REASON);
                self.bus
                    .publish(Message::new(command.order_id, "ParticipantFault", &fault)?)
                    .await
            }
        }
    }
}

/// `TRACK-` followed by 8 uppercase hex characters.
fn new_tracking_number() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("TRACK-{}", raw[..8].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Address;
    use messaging::InMemoryMessageBus;

    fn ship_command(order_id: CorrelationId) -> ShipOrderRequest {
        ShipOrderRequest {
            order_id,
            shipping_address: Address::new("1 Main St", "Springfield", "12345", "US"),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn successful_shipment_publishes_tracking_number() {
        let bus = Arc::new(InMemoryMessageBus::new());
        let mut topic = bus.subscribe().await;
        let participant = ShippingParticipant::new(bus);
        let order_id = CorrelationId::new();

        participant
            .handle_message(&Message::new(order_id, "ShipOrder", &ship_command(order_id)).unwrap())
            .await
            .unwrap();

        let event: OrderShipped = topic.recv().await.unwrap().decode().unwrap();
        assert!(event.tracking_number.starts_with("TRACK-"));
        assert_eq!(event.tracking_number.len(), "TRACK-".len() + 8);
        assert_eq!(participant.shipment_count(), 1);
    }

    #[tokio::test]
    async fn redelivered_request_reuses_tracking_number() {
        let bus = Arc::new(InMemoryMessageBus::new());
        let mut topic = bus.subscribe().await;
        let participant = ShippingParticipant::new(bus);
        let order_id = CorrelationId::new();
        let message = Message::new(order_id, "ShipOrder", &ship_command(order_id)).unwrap();

        participant.handle_message(&message).await.unwrap();
        participant.handle_message(&message).await.unwrap();

        let first: OrderShipped = topic.recv().await.unwrap().decode().unwrap();
        let second: OrderShipped = topic.recv().await.unwrap().decode().unwrap();
        assert_eq!(first.tracking_number, second.tracking_number);
        assert_eq!(participant.shipment_count(), 1);
    }

    #[tokio::test]
    async fn refused_shipment_publishes_fault() {
        let bus = Arc::new(InMemoryMessageBus::new());
        let mut topic = bus.subscribe().await;
        let participant = ShippingParticipant::new(bus);
        participant.set_fail_on_ship(true);
        let order_id = CorrelationId::new();

        participant
            .handle_message(&Message::new(order_id, "ShipOrder", &ship_command(order_id)).unwrap())
            .await
            .unwrap();

        let fault: ParticipantFault = topic.recv().await.unwrap().decode().unwrap();
        assert_eq!(fault.request, RequestKind::ShipOrder);
        assert_eq!(fault.reason, "Shipment not available for requested city");
        assert_eq!(participant.shipment_count(), 0);
    }
}
