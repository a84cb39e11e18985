//! Events published by participants and by the timer service.

use chrono::{DateTime, Utc};
use common::{CorrelationId, CustomerId, Money};
use serde::{Deserialize, Serialize};

use crate::error::{ContractError, Result};
use crate::types::{Address, OrderItem, PaymentMethod, RequestKind};

/// Fact: a customer submitted an order. Starts the saga.
///
/// Carries the full order snapshot; the saga captures it once at creation
/// and treats it as read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: CorrelationId,
    pub customer_id: CustomerId,
    pub customer_email: String,
    pub order_total: Money,
    pub payment_method: PaymentMethod,
    pub items: Vec<OrderItem>,
    pub shipping_address: Address,
    pub created_at: DateTime<Utc>,
}

impl OrderCreated {
    /// Creates the order-created event, validating the snapshot:
    /// non-empty email, at least one item with positive quantities, and a
    /// declared total equal to the sum of line totals.
    pub fn new(
        order_id: CorrelationId,
        customer_id: CustomerId,
        customer_email: impl Into<String>,
        order_total: Money,
        payment_method: PaymentMethod,
        items: Vec<OrderItem>,
        shipping_address: Address,
    ) -> Result<Self> {
        let customer_email = customer_email.into();
        if customer_email.is_empty() {
            return Err(ContractError::EmptyField("customer_email"));
        }
        if items.is_empty() {
            return Err(ContractError::NoItems);
        }
        if let Some(item) = items.iter().find(|i| i.quantity == 0) {
            return Err(ContractError::ZeroQuantity(item.product_id.clone()));
        }
        let computed = items
            .iter()
            .try_fold(Money::zero(), |total, item| {
                item.line_total().and_then(|line| total.checked_add(line))
            })
            .ok_or(ContractError::AmountOverflow)?;
        if computed != order_total {
            return Err(ContractError::TotalMismatch {
                declared: order_total.to_string(),
                computed: computed.to_string(),
            });
        }
        Ok(Self {
            order_id,
            customer_id,
            customer_email,
            order_total,
            payment_method,
            items,
            shipping_address,
            created_at: Utc::now(),
        })
    }
}

/// Reply: the payment participant authorized the charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAuthorized {
    pub order_id: CorrelationId,
    pub transaction_id: String,
    pub amount: Money,
    pub authorized_at: DateTime<Utc>,
}

/// Reply: the inventory participant reserved the requested stock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryReserved {
    pub order_id: CorrelationId,
    pub reservation_id: String,
    pub reserved_at: DateTime<Utc>,
}

/// Reply: the shipping participant booked a carrier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderShipped {
    pub order_id: CorrelationId,
    pub tracking_number: String,
    pub shipped_at: DateTime<Utc>,
}

/// Fact: a previously authorized payment was refunded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRefunded {
    pub order_id: CorrelationId,
    pub refund_transaction_id: String,
    pub refunded_amount: Money,
    pub refunded_at: DateTime<Utc>,
}

/// A participant explicitly reported that a request failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantFault {
    pub order_id: CorrelationId,
    pub request: RequestKind,
    pub reason: String,
    pub faulted_at: DateTime<Utc>,
}

impl ParticipantFault {
    /// Creates a fault notification for a request.
    pub fn new(order_id: CorrelationId, request: RequestKind, reason: impl Into<String>) -> Self {
        Self {
            order_id,
            request,
            reason: reason.into(),
            faulted_at: Utc::now(),
        }
    }
}

/// Deferred message delivered back to the orchestrator when a request's
/// deadline passes. Scheduled at send time; may arrive after the request
/// already resolved, in which case it is stale and dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestTimedOut {
    pub order_id: CorrelationId,
    pub request: RequestKind,
}
