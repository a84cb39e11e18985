//! Order saga state machine states.

use serde::{Deserialize, Serialize};

/// The state of an order saga in its lifecycle.
///
/// State transitions:
/// ```text
/// Initial ──► PaymentProcessing ──► InventoryReserving ──► Shipping ──► Completed
///                     │                      │                 │
///                     └──────────────────────┴─────────────────┴──► Failed
/// ```
///
/// `Completed` and `Failed` are terminal: instances in either state accept
/// no further transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderSagaState {
    /// Instance just created, waiting for the order-created trigger.
    #[default]
    Initial,

    /// Payment request sent, awaiting authorization.
    PaymentProcessing,

    /// Inventory reservation request sent, awaiting confirmation.
    InventoryReserving,

    /// Carrier booking request sent, awaiting shipment confirmation.
    Shipping,

    /// Order fulfilled (terminal state).
    Completed,

    /// A step failed; compensations dispatched (terminal state).
    Failed,
}

impl OrderSagaState {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderSagaState::Completed | OrderSagaState::Failed)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSagaState::Initial => "Initial",
            OrderSagaState::PaymentProcessing => "PaymentProcessing",
            OrderSagaState::InventoryReserving => "InventoryReserving",
            OrderSagaState::Shipping => "Shipping",
            OrderSagaState::Completed => "Completed",
            OrderSagaState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for OrderSagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
