//! Compensation planning and dispatch.
//!
//! When a step fails after partial progress, previously committed steps
//! are undone in reverse order of commitment: release the inventory
//! reservation first, then refund the payment. Which compensations apply
//! is read off the instance's progress fields — a field that is set means
//! the step committed and has something to undo.

use std::sync::Arc;

use chrono::Utc;
use common::CorrelationId;
use contracts::{RefundPayment, ReleaseInventory};
use messaging::{Message, MessageBus};

use crate::instance::SagaInstance;

/// One compensating action, carrying everything needed to issue it.
#[derive(Debug, Clone)]
pub enum CompensationAction {
    ReleaseInventory(ReleaseInventory),
    RefundPayment(RefundPayment),
}

impl CompensationAction {
    /// Returns the contract kind name for the wire envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            CompensationAction::ReleaseInventory(_) => "ReleaseInventory",
            CompensationAction::RefundPayment(_) => "RefundPayment",
        }
    }
}

/// Derives the ordered compensation list for a failed instance.
///
/// Release always precedes refund. An instance failing in
/// `PaymentProcessing` has no progress fields set and gets an empty plan —
/// nothing committed, nothing to undo.
pub fn compensation_plan(instance: &SagaInstance) -> Vec<CompensationAction> {
    let order_id = instance.order_id();
    let mut plan = Vec::new();

    if let Some(reservation_id) = instance.reservation_id() {
        plan.push(CompensationAction::ReleaseInventory(ReleaseInventory {
            order_id,
            reservation_id: reservation_id.to_string(),
            timestamp: Utc::now(),
        }));
    }

    if let Some(transaction_id) = instance.payment_transaction_id() {
        plan.push(CompensationAction::RefundPayment(RefundPayment {
            order_id,
            transaction_id: transaction_id.to_string(),
            refund_amount: instance.snapshot().order_total,
            timestamp: Utc::now(),
        }));
    }

    plan
}

/// Publishes compensating actions fire-and-forget.
///
/// The saga must reach its terminal state regardless of compensation
/// outcome, so a publish failure is logged and swallowed — never retried
/// here (retry is the bus transport's job) and never allowed to block
/// finalization. Unrecoverable compensation failures are operational
/// reconciliation territory.
#[derive(Clone)]
pub struct CompensationDispatcher<B> {
    bus: Arc<B>,
}

impl<B: MessageBus> CompensationDispatcher<B> {
    /// Creates a dispatcher on top of a bus adapter.
    pub fn new(bus: Arc<B>) -> Self {
        Self { bus }
    }

    /// Dispatches each action in order.
    pub async fn dispatch(&self, correlation_id: CorrelationId, actions: Vec<CompensationAction>) {
        for action in actions {
            let kind = action.kind();
            let message = match &action {
                CompensationAction::ReleaseInventory(cmd) => {
                    Message::new(correlation_id, kind, cmd)
                }
                CompensationAction::RefundPayment(cmd) => Message::new(correlation_id, kind, cmd),
            };

            let result = match message {
                Ok(message) => self.bus.publish(message).await,
                Err(err) => Err(err),
            };

            match result {
                Ok(()) => {
                    metrics::counter!("compensations_dispatched_total").increment(1);
                    tracing::info!(%correlation_id, compensation = kind, "compensation dispatched");
                }
                Err(error) => {
                    metrics::counter!("compensations_failed_total").increment(1);
                    tracing::warn!(
                        %correlation_id,
                        compensation = kind,
                        %error,
                        "compensation dispatch failed, saga finalizes anyway"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{CustomerId, Money};
    use contracts::{Address, OrderCreated, OrderItem, PaymentMethod};
    use crate::state::OrderSagaState;

    fn instance() -> SagaInstance {
        let event = OrderCreated::new(
            CorrelationId::new(),
            CustomerId::new(),
            "customer@mail.com",
            Money::from_cents(9999),
            PaymentMethod::CreditCard,
            vec![OrderItem::new("SKU-001", 1, Money::from_cents(9999))],
            Address::new("1 Main St", "Springfield", "12345", "US"),
        )
        .unwrap();
        SagaInstance::start(&event)
    }

    #[test]
    fn no_progress_means_empty_plan() {
        let instance = instance();
        assert!(compensation_plan(&instance).is_empty());
    }

    #[test]
    fn payment_only_yields_refund_only() {
        let mut instance = instance();
        instance.record_payment("TXN-0001");

        let plan = compensation_plan(&instance);
        assert_eq!(plan.len(), 1);
        assert!(matches!(plan[0], CompensationAction::RefundPayment(_)));
    }

    #[test]
    fn full_progress_yields_release_then_refund() {
        let mut instance = instance();
        instance.record_payment("TXN-0001");
        instance.record_reservation("RES-0001");
        instance.set_state(OrderSagaState::Shipping);

        let plan = compensation_plan(&instance);
        assert_eq!(plan.len(), 2);
        assert!(matches!(plan[0], CompensationAction::ReleaseInventory(_)));
        assert!(matches!(plan[1], CompensationAction::RefundPayment(_)));

        if let CompensationAction::RefundPayment(refund) = &plan[1] {
            assert_eq!(refund.transaction_id, "TXN-0001");
            assert_eq!(refund.refund_amount, Money::from_cents(9999));
        }
    }

    #[tokio::test]
    async fn dispatch_failure_is_swallowed() {
        let bus = Arc::new(messaging::InMemoryMessageBus::with_retry_policy(
            messaging::RetryPolicy::none(),
        ));
        let dispatcher = CompensationDispatcher::new(bus.clone());
        let mut instance = instance();
        instance.record_payment("TXN-0001");

        bus.fail_next_deliveries(1);
        // Must not panic or error out.
        dispatcher
            .dispatch(instance.order_id(), compensation_plan(&instance))
            .await;
    }

    #[tokio::test]
    async fn dispatch_publishes_in_plan_order() {
        let bus = Arc::new(messaging::InMemoryMessageBus::new());
        let mut topic = bus.subscribe().await;
        let dispatcher = CompensationDispatcher::new(bus.clone());

        let mut instance = instance();
        instance.record_payment("TXN-0001");
        instance.record_reservation("RES-0001");

        dispatcher
            .dispatch(instance.order_id(), compensation_plan(&instance))
            .await;

        assert_eq!(topic.recv().await.unwrap().kind, "ReleaseInventory");
        assert_eq!(topic.recv().await.unwrap().kind, "RefundPayment");
    }
}
