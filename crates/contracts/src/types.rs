//! Value objects shared by commands and events.

use common::Money;
use serde::{Deserialize, Serialize};

/// A single order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Product identifier (SKU).
    pub product_id: String,
    /// Number of units ordered.
    pub quantity: u32,
    /// Price per unit.
    pub unit_price: Money,
}

impl OrderItem {
    /// Creates a new order line.
    pub fn new(product_id: impl Into<String>, quantity: u32, unit_price: Money) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            unit_price,
        }
    }

    /// Returns the line total (unit price times quantity), or `None`
    /// if it overflows the representable amount.
    pub fn line_total(&self) -> Option<Money> {
        self.unit_price.checked_mul(self.quantity)
    }
}

/// A shipping destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street_address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

impl Address {
    /// Creates a new address.
    pub fn new(
        street_address: impl Into<String>,
        city: impl Into<String>,
        postal_code: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        Self {
            street_address: street_address.into(),
            city: city.into(),
            postal_code: postal_code.into(),
            country: country.into(),
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, {} {}, {}",
            self.street_address, self.postal_code, self.city, self.country
        )
    }
}

/// How the customer pays for the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    BankTransfer,
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentMethod::CreditCard => "CreditCard",
            PaymentMethod::DebitCard => "DebitCard",
            PaymentMethod::BankTransfer => "BankTransfer",
        };
        write!(f, "{s}")
    }
}

/// Names an outstanding request a saga instance is waiting on.
///
/// Used to key pending-request records and to route timeout messages back
/// to the step that scheduled them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    ProcessPayment,
    ReserveInventory,
    ShipOrder,
}

impl RequestKind {
    /// Returns the request kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::ProcessPayment => "ProcessPayment",
            RequestKind::ReserveInventory => "ReserveInventory",
            RequestKind::ShipOrder => "ShipOrder",
        }
    }

    /// Returns the point-to-point destination serving this request.
    pub fn queue(&self) -> &'static str {
        match self {
            RequestKind::ProcessPayment => "payment",
            RequestKind::ReserveInventory => "inventory",
            RequestKind::ShipOrder => "shipping",
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
