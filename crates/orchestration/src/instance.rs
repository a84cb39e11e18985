//! The saga instance: one per order, keyed by correlation id.

use chrono::{DateTime, Utc};
use common::{CorrelationId, CustomerId, Money};
use contracts::{Address, OrderCreated, OrderItem, PaymentMethod};
use serde::{Deserialize, Serialize};

use crate::state::OrderSagaState;
use crate::store::{SagaData, Version};

/// The order data captured once when the saga starts, read-only after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub customer_id: CustomerId,
    pub customer_email: String,
    pub order_total: Money,
    pub payment_method: PaymentMethod,
    pub items: Vec<OrderItem>,
    pub shipping_address: Address,
    pub created_at: DateTime<Utc>,
}

impl From<&OrderCreated> for OrderSnapshot {
    fn from(event: &OrderCreated) -> Self {
        Self {
            customer_id: event.customer_id,
            customer_email: event.customer_email.clone(),
            order_total: event.order_total,
            payment_method: event.payment_method,
            items: event.items.clone(),
            shipping_address: event.shipping_address.clone(),
            created_at: event.created_at,
        }
    }
}

/// A durable order saga instance.
///
/// `state` uniquely determines which progress fields are populated: in
/// `Shipping`, both `payment_transaction_id` and `reservation_id` are set;
/// the compensation plan on failure is derived from exactly these fields.
/// Mutation happens only through the state machine engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaInstance {
    correlation_id: CorrelationId,
    version: Version,
    state: OrderSagaState,
    snapshot: OrderSnapshot,
    payment_transaction_id: Option<String>,
    reservation_id: Option<String>,
    tracking_number: Option<String>,
    shipped_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    failure_reason: Option<String>,
    failed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl SagaInstance {
    /// Creates a fresh instance from the initiating event, in `Initial`.
    pub fn start(event: &OrderCreated) -> Self {
        Self {
            correlation_id: event.order_id,
            version: Version::initial(),
            state: OrderSagaState::Initial,
            snapshot: OrderSnapshot::from(event),
            payment_transaction_id: None,
            reservation_id: None,
            tracking_number: None,
            shipped_at: None,
            completed_at: None,
            failure_reason: None,
            failed_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Returns the order id (also the correlation id).
    pub fn order_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Returns the current saga state.
    pub fn state(&self) -> OrderSagaState {
        self.state
    }

    /// Returns the order snapshot captured at saga start.
    pub fn snapshot(&self) -> &OrderSnapshot {
        &self.snapshot
    }

    /// Returns the payment transaction id, once payment has authorized.
    pub fn payment_transaction_id(&self) -> Option<&str> {
        self.payment_transaction_id.as_deref()
    }

    /// Returns the inventory reservation id, once stock is reserved.
    pub fn reservation_id(&self) -> Option<&str> {
        self.reservation_id.as_deref()
    }

    /// Returns the carrier tracking number, once shipped.
    pub fn tracking_number(&self) -> Option<&str> {
        self.tracking_number.as_deref()
    }

    /// Returns when the order shipped, if it did.
    pub fn shipped_at(&self) -> Option<DateTime<Utc>> {
        self.shipped_at
    }

    /// Returns when the saga completed, if it did.
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Returns the failure reason, if the saga failed.
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Returns when the saga failed, if it did.
    pub fn failed_at(&self) -> Option<DateTime<Utc>> {
        self.failed_at
    }

    /// Returns the last save time.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // Mutators below are crate-internal: only the saga definition,
    // running under the engine, may change an instance.

    pub(crate) fn set_state(&mut self, state: OrderSagaState) {
        self.state = state;
    }

    pub(crate) fn record_payment(&mut self, transaction_id: impl Into<String>) {
        self.payment_transaction_id = Some(transaction_id.into());
    }

    pub(crate) fn record_reservation(&mut self, reservation_id: impl Into<String>) {
        self.reservation_id = Some(reservation_id.into());
    }

    pub(crate) fn record_shipment(
        &mut self,
        tracking_number: impl Into<String>,
        shipped_at: DateTime<Utc>,
    ) {
        self.tracking_number = Some(tracking_number.into());
        self.shipped_at = Some(shipped_at);
        self.completed_at = Some(Utc::now());
    }

    /// Records the failure reason and time. Set exactly once: a second
    /// call is a no-op, the first failure stands.
    pub(crate) fn record_failure(&mut self, reason: &str) {
        if self.failure_reason.is_none() {
            self.failure_reason = Some(reason.to_string());
            self.failed_at = Some(Utc::now());
        }
    }
}

impl SagaData for SagaInstance {
    fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn state_label(&self) -> &'static str {
        self.state.as_str()
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
