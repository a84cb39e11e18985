//! Commands sent point-to-point from the orchestrator to participants.

use chrono::{DateTime, Utc};
use common::{CorrelationId, CustomerId, Money};
use serde::{Deserialize, Serialize};

use crate::error::{ContractError, Result};
use crate::types::{Address, OrderItem, PaymentMethod};

/// Asks the payment participant to authorize payment for an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessPayment {
    pub order_id: CorrelationId,
    pub customer_id: CustomerId,
    pub order_total: Money,
    pub payment_method: PaymentMethod,
    pub timestamp: DateTime<Utc>,
}

impl ProcessPayment {
    /// Creates a payment request. Fails if the total is not positive.
    pub fn new(
        order_id: CorrelationId,
        customer_id: CustomerId,
        order_total: Money,
        payment_method: PaymentMethod,
    ) -> Result<Self> {
        if !order_total.is_positive() {
            return Err(ContractError::NonPositiveAmount("order_total"));
        }
        Ok(Self {
            order_id,
            customer_id,
            order_total,
            payment_method,
            timestamp: Utc::now(),
        })
    }
}

/// Asks the inventory participant to reserve stock for the order lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveInventory {
    pub order_id: CorrelationId,
    pub items: Vec<OrderItem>,
    pub timestamp: DateTime<Utc>,
}

impl ReserveInventory {
    /// Creates a reservation request. Fails if there are no items.
    pub fn new(order_id: CorrelationId, items: Vec<OrderItem>) -> Result<Self> {
        if items.is_empty() {
            return Err(ContractError::NoItems);
        }
        Ok(Self {
            order_id,
            items,
            timestamp: Utc::now(),
        })
    }
}

/// Asks the shipping participant to book a carrier for the order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipOrderRequest {
    pub order_id: CorrelationId,
    pub shipping_address: Address,
    pub timestamp: DateTime<Utc>,
}

impl ShipOrderRequest {
    /// Creates a shipping request.
    pub fn new(order_id: CorrelationId, shipping_address: Address) -> Self {
        Self {
            order_id,
            shipping_address,
            timestamp: Utc::now(),
        }
    }
}

/// Compensation: undo a previously authorized payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundPayment {
    pub order_id: CorrelationId,
    pub transaction_id: String,
    pub refund_amount: Money,
    pub timestamp: DateTime<Utc>,
}

impl RefundPayment {
    /// Creates a refund command. Fails on an empty transaction id.
    pub fn new(
        order_id: CorrelationId,
        transaction_id: impl Into<String>,
        refund_amount: Money,
    ) -> Result<Self> {
        let transaction_id = transaction_id.into();
        if transaction_id.is_empty() {
            return Err(ContractError::EmptyField("transaction_id"));
        }
        Ok(Self {
            order_id,
            transaction_id,
            refund_amount,
            timestamp: Utc::now(),
        })
    }
}

/// Compensation: release a previously made inventory reservation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseInventory {
    pub order_id: CorrelationId,
    pub reservation_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ReleaseInventory {
    /// Creates a release command. Fails on an empty reservation id.
    pub fn new(order_id: CorrelationId, reservation_id: impl Into<String>) -> Result<Self> {
        let reservation_id = reservation_id.into();
        if reservation_id.is_empty() {
            return Err(ContractError::EmptyField("reservation_id"));
        }
        Ok(Self {
            order_id,
            reservation_id,
            timestamp: Utc::now(),
        })
    }
}
