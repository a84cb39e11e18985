//! The order-fulfillment saga definition.
//!
//! Supplies the transition table and per-transition actions consumed by
//! the generic engine; it holds no machinery of its own. The table:
//!
//! | State              | Event                              | Next      |
//! |--------------------|------------------------------------|-----------|
//! | Initial            | OrderCreated                       | PaymentProcessing |
//! | PaymentProcessing  | PaymentAuthorized                  | InventoryReserving |
//! | PaymentProcessing  | PaymentFault / PaymentTimeout      | Failed (no compensation) |
//! | InventoryReserving | InventoryReserved                  | Shipping  |
//! | InventoryReserving | InventoryFault / InventoryTimeout  | Failed (refund) |
//! | Shipping           | OrderShipped                       | Completed |
//! | Shipping           | ShippingFault / ShippingTimeout    | Failed (release, refund) |
//!
//! Everything else is ignored, and terminal states ignore everything.

use std::time::Duration;

use chrono::Utc;
use contracts::{
    InventoryReserved, OrderCreated, OrderShipped, PaymentAuthorized, ProcessPayment,
    RequestKind, ReserveInventory, ShipOrderRequest,
};

use crate::compensation::{CompensationAction, compensation_plan};
use crate::config::SagaTimeouts;
use crate::engine::SagaDefinition;
use crate::instance::SagaInstance;
use crate::state::OrderSagaState;

/// Events the order saga transitions on.
///
/// Participant faults and timeouts are modeled identically per step: from
/// the saga's perspective both mean "this step did not succeed"; retry
/// policy differences live in the bus transport, not here.
#[derive(Debug, Clone)]
pub enum OrderSagaEvent {
    OrderCreated(OrderCreated),
    PaymentAuthorized(PaymentAuthorized),
    PaymentFault { reason: String },
    PaymentTimeout,
    InventoryReserved(InventoryReserved),
    InventoryFault { reason: String },
    InventoryTimeout,
    OrderShipped(OrderShipped),
    ShippingFault { reason: String },
    ShippingTimeout,
}

impl OrderSagaEvent {
    /// Returns the event kind name.
    pub fn kind(&self) -> &'static str {
        match self {
            OrderSagaEvent::OrderCreated(_) => "OrderCreated",
            OrderSagaEvent::PaymentAuthorized(_) => "PaymentAuthorized",
            OrderSagaEvent::PaymentFault { .. } => "PaymentFault",
            OrderSagaEvent::PaymentTimeout => "PaymentTimeout",
            OrderSagaEvent::InventoryReserved(_) => "InventoryReserved",
            OrderSagaEvent::InventoryFault { .. } => "InventoryFault",
            OrderSagaEvent::InventoryTimeout => "InventoryTimeout",
            OrderSagaEvent::OrderShipped(_) => "OrderShipped",
            OrderSagaEvent::ShippingFault { .. } => "ShippingFault",
            OrderSagaEvent::ShippingTimeout => "ShippingTimeout",
        }
    }

    /// Returns the request this event resolves, if it is a reply, fault
    /// or timeout rather than the saga trigger.
    pub fn resolved_request(&self) -> Option<RequestKind> {
        match self {
            OrderSagaEvent::OrderCreated(_) => None,
            OrderSagaEvent::PaymentAuthorized(_)
            | OrderSagaEvent::PaymentFault { .. }
            | OrderSagaEvent::PaymentTimeout => Some(RequestKind::ProcessPayment),
            OrderSagaEvent::InventoryReserved(_)
            | OrderSagaEvent::InventoryFault { .. }
            | OrderSagaEvent::InventoryTimeout => Some(RequestKind::ReserveInventory),
            OrderSagaEvent::OrderShipped(_)
            | OrderSagaEvent::ShippingFault { .. }
            | OrderSagaEvent::ShippingTimeout => Some(RequestKind::ShipOrder),
        }
    }
}

/// A typed participant command a transition wants sent.
#[derive(Debug, Clone)]
pub enum ParticipantCommand {
    ProcessPayment(ProcessPayment),
    ReserveInventory(ReserveInventory),
    ShipOrder(ShipOrderRequest),
}

/// Side effects emitted by transitions, executed after the state is
/// durably saved. Each carries the correlation id and is safe to issue
/// more than once.
#[derive(Debug, Clone)]
pub enum OrderSagaEffect {
    /// Dispatch a request to a participant with a reply deadline.
    SendRequest {
        kind: RequestKind,
        command: ParticipantCommand,
        timeout: Duration,
    },
    /// Publish compensating actions, in order, fire-and-forget.
    Compensate(Vec<CompensationAction>),
}

/// The order saga definition: transition table plus configured timeouts.
#[derive(Debug, Clone)]
pub struct OrderSaga {
    timeouts: SagaTimeouts,
}

impl OrderSaga {
    /// Creates the definition with per-deployment request timeouts.
    pub fn new(timeouts: SagaTimeouts) -> Self {
        Self { timeouts }
    }

    fn request_payment(&self, instance: &SagaInstance) -> OrderSagaEffect {
        let snapshot = instance.snapshot();
        OrderSagaEffect::SendRequest {
            kind: RequestKind::ProcessPayment,
            command: ParticipantCommand::ProcessPayment(ProcessPayment {
                order_id: instance.order_id(),
                customer_id: snapshot.customer_id,
                order_total: snapshot.order_total,
                payment_method: snapshot.payment_method,
                timestamp: Utc::now(),
            }),
            timeout: self.timeouts.payment,
        }
    }

    fn request_reservation(&self, instance: &SagaInstance) -> OrderSagaEffect {
        OrderSagaEffect::SendRequest {
            kind: RequestKind::ReserveInventory,
            command: ParticipantCommand::ReserveInventory(ReserveInventory {
                order_id: instance.order_id(),
                items: instance.snapshot().items.clone(),
                timestamp: Utc::now(),
            }),
            timeout: self.timeouts.inventory,
        }
    }

    fn request_shipment(&self, instance: &SagaInstance) -> OrderSagaEffect {
        OrderSagaEffect::SendRequest {
            kind: RequestKind::ShipOrder,
            command: ParticipantCommand::ShipOrder(ShipOrderRequest {
                order_id: instance.order_id(),
                shipping_address: instance.snapshot().shipping_address.clone(),
                timestamp: Utc::now(),
            }),
            timeout: self.timeouts.shipping,
        }
    }

    /// Fails the saga: records the reason, plans compensation from the
    /// populated progress fields, and moves to `Failed`.
    fn fail(&self, instance: &mut SagaInstance, reason: &str) -> Vec<OrderSagaEffect> {
        instance.record_failure(reason);
        let plan = compensation_plan(instance);
        instance.set_state(OrderSagaState::Failed);
        if plan.is_empty() {
            Vec::new()
        } else {
            vec![OrderSagaEffect::Compensate(plan)]
        }
    }
}

impl SagaDefinition for OrderSaga {
    type Data = SagaInstance;
    type Event = OrderSagaEvent;
    type Effect = OrderSagaEffect;

    fn start(&self, event: &OrderSagaEvent) -> Option<SagaInstance> {
        match event {
            OrderSagaEvent::OrderCreated(created) => Some(SagaInstance::start(created)),
            _ => None,
        }
    }

    fn apply(
        &self,
        instance: &mut SagaInstance,
        event: &OrderSagaEvent,
    ) -> Option<Vec<OrderSagaEffect>> {
        use OrderSagaEvent as E;
        use OrderSagaState as S;

        match (instance.state(), event) {
            (S::Initial, E::OrderCreated(_)) => {
                // Snapshot was captured at instance creation.
                let effect = self.request_payment(instance);
                instance.set_state(S::PaymentProcessing);
                Some(vec![effect])
            }

            (S::PaymentProcessing, E::PaymentAuthorized(reply)) => {
                instance.record_payment(&reply.transaction_id);
                let effect = self.request_reservation(instance);
                instance.set_state(S::InventoryReserving);
                Some(vec![effect])
            }
            (S::PaymentProcessing, E::PaymentFault { .. }) => {
                Some(self.fail(instance, "Payment processing failed"))
            }
            (S::PaymentProcessing, E::PaymentTimeout) => {
                Some(self.fail(instance, "Payment timeout"))
            }

            (S::InventoryReserving, E::InventoryReserved(reply)) => {
                instance.record_reservation(&reply.reservation_id);
                let effect = self.request_shipment(instance);
                instance.set_state(S::Shipping);
                Some(vec![effect])
            }
            (S::InventoryReserving, E::InventoryFault { .. }) => {
                Some(self.fail(instance, "Inventory not available"))
            }
            (S::InventoryReserving, E::InventoryTimeout) => {
                Some(self.fail(instance, "Inventory timeout"))
            }

            (S::Shipping, E::OrderShipped(reply)) => {
                instance.record_shipment(&reply.tracking_number, reply.shipped_at);
                instance.set_state(S::Completed);
                Some(Vec::new())
            }
            (S::Shipping, E::ShippingFault { .. }) => {
                Some(self.fail(instance, "Shipping failed"))
            }
            (S::Shipping, E::ShippingTimeout) => Some(self.fail(instance, "Shipping timeout")),

            // No transition declared: ignore. Covers terminal states and
            // all late/duplicate/out-of-order arrivals.
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{CorrelationId, CustomerId, Money};
    use contracts::{Address, OrderItem, PaymentMethod};

    fn saga() -> OrderSaga {
        OrderSaga::new(SagaTimeouts::default())
    }

    fn order_created() -> OrderCreated {
        OrderCreated::new(
            CorrelationId::new(),
            CustomerId::new(),
            "customer@mail.com",
            Money::from_cents(9999),
            PaymentMethod::CreditCard,
            vec![OrderItem::new("SKU-001", 1, Money::from_cents(9999))],
            Address::new("1 Main St", "Springfield", "12345", "US"),
        )
        .unwrap()
    }

    fn authorized(instance: &SagaInstance) -> OrderSagaEvent {
        OrderSagaEvent::PaymentAuthorized(PaymentAuthorized {
            order_id: instance.order_id(),
            transaction_id: "TXN-0001".to_string(),
            amount: instance.snapshot().order_total,
            authorized_at: Utc::now(),
        })
    }

    fn reserved(instance: &SagaInstance) -> OrderSagaEvent {
        OrderSagaEvent::InventoryReserved(InventoryReserved {
            order_id: instance.order_id(),
            reservation_id: "RES-0001".to_string(),
            reserved_at: Utc::now(),
        })
    }

    fn shipped(instance: &SagaInstance) -> OrderSagaEvent {
        OrderSagaEvent::OrderShipped(OrderShipped {
            order_id: instance.order_id(),
            tracking_number: "TRACK-A1B2C3D4".to_string(),
            shipped_at: Utc::now(),
        })
    }

    #[test]
    fn happy_path_walks_all_states() {
        let saga = saga();
        let event = order_created();
        let mut instance = SagaInstance::start(&event);

        let fx = saga
            .apply(&mut instance, &OrderSagaEvent::OrderCreated(event))
            .unwrap();
        assert_eq!(instance.state(), OrderSagaState::PaymentProcessing);
        assert!(matches!(
            fx[0],
            OrderSagaEffect::SendRequest {
                kind: RequestKind::ProcessPayment,
                ..
            }
        ));

        let event = authorized(&instance);
        let fx = saga.apply(&mut instance, &event).unwrap();
        assert_eq!(instance.state(), OrderSagaState::InventoryReserving);
        assert_eq!(instance.payment_transaction_id(), Some("TXN-0001"));
        assert!(matches!(
            fx[0],
            OrderSagaEffect::SendRequest {
                kind: RequestKind::ReserveInventory,
                ..
            }
        ));

        let event = reserved(&instance);
        let fx = saga.apply(&mut instance, &event).unwrap();
        assert_eq!(instance.state(), OrderSagaState::Shipping);
        assert_eq!(instance.reservation_id(), Some("RES-0001"));
        assert!(matches!(
            fx[0],
            OrderSagaEffect::SendRequest {
                kind: RequestKind::ShipOrder,
                ..
            }
        ));

        let event = shipped(&instance);
        let fx = saga.apply(&mut instance, &event).unwrap();
        assert_eq!(instance.state(), OrderSagaState::Completed);
        assert_eq!(instance.tracking_number(), Some("TRACK-A1B2C3D4"));
        assert!(instance.completed_at().is_some());
        assert!(fx.is_empty());
    }

    #[test]
    fn payment_failure_has_no_compensation() {
        let saga = saga();
        let event = order_created();
        let mut instance = SagaInstance::start(&event);
        saga.apply(&mut instance, &OrderSagaEvent::OrderCreated(event));

        let fx = saga
            .apply(
                &mut instance,
                &OrderSagaEvent::PaymentFault {
                    reason: "Account not available".to_string(),
                },
            )
            .unwrap();

        assert_eq!(instance.state(), OrderSagaState::Failed);
        assert_eq!(instance.failure_reason(), Some("Payment processing failed"));
        assert!(instance.failed_at().is_some());
        assert!(fx.is_empty());
    }

    #[test]
    fn inventory_fault_refunds_payment_only() {
        let saga = saga();
        let event = order_created();
        let mut instance = SagaInstance::start(&event);
        saga.apply(&mut instance, &OrderSagaEvent::OrderCreated(event));
        let event = authorized(&instance);
        saga.apply(&mut instance, &event);

        let fx = saga
            .apply(
                &mut instance,
                &OrderSagaEvent::InventoryFault {
                    reason: "Stock not available".to_string(),
                },
            )
            .unwrap();

        assert_eq!(instance.state(), OrderSagaState::Failed);
        assert_eq!(instance.failure_reason(), Some("Inventory not available"));
        let OrderSagaEffect::Compensate(plan) = &fx[0] else {
            panic!("expected compensation effect");
        };
        assert_eq!(plan.len(), 1);
        assert!(matches!(plan[0], CompensationAction::RefundPayment(_)));
    }

    #[test]
    fn shipping_timeout_releases_then_refunds() {
        let saga = saga();
        let event = order_created();
        let mut instance = SagaInstance::start(&event);
        saga.apply(&mut instance, &OrderSagaEvent::OrderCreated(event));
        let event = authorized(&instance);
        saga.apply(&mut instance, &event);
        let event = reserved(&instance);
        saga.apply(&mut instance, &event);

        let fx = saga
            .apply(&mut instance, &OrderSagaEvent::ShippingTimeout)
            .unwrap();

        assert_eq!(instance.state(), OrderSagaState::Failed);
        assert_eq!(instance.failure_reason(), Some("Shipping timeout"));
        let OrderSagaEffect::Compensate(plan) = &fx[0] else {
            panic!("expected compensation effect");
        };
        assert_eq!(plan.len(), 2);
        assert!(matches!(plan[0], CompensationAction::ReleaseInventory(_)));
        assert!(matches!(plan[1], CompensationAction::RefundPayment(_)));
    }

    #[test]
    fn undeclared_transitions_are_ignored() {
        let saga = saga();
        let event = order_created();
        let mut instance = SagaInstance::start(&event);

        // A reply before the request makes no sense: ignored.
        assert!(saga.apply(&mut instance, &OrderSagaEvent::PaymentTimeout).is_none());
        assert_eq!(instance.state(), OrderSagaState::Initial);

        saga.apply(&mut instance, &OrderSagaEvent::OrderCreated(event.clone()));

        // Terminal states ignore everything.
        saga.apply(
            &mut instance,
            &OrderSagaEvent::PaymentFault {
                reason: "declined".to_string(),
            },
        );
        assert_eq!(instance.state(), OrderSagaState::Failed);
        assert!(saga
            .apply(&mut instance, &OrderSagaEvent::OrderCreated(event))
            .is_none());
        let event = authorized(&instance);
        assert!(saga.apply(&mut instance, &event).is_none());
        assert_eq!(instance.state(), OrderSagaState::Failed);
    }

    #[test]
    fn only_order_created_starts_a_saga() {
        let saga = saga();
        assert!(saga.start(&OrderSagaEvent::PaymentTimeout).is_none());
        assert!(saga.start(&OrderSagaEvent::OrderCreated(order_created())).is_some());
    }
}
