//! Message contracts for the order-fulfillment saga.
//!
//! Every command and event that crosses the boundary between the
//! orchestrator and its participants is an explicit typed struct,
//! validated at construction. Commands are point-to-point requests;
//! events are broadcast facts.

pub mod commands;
pub mod error;
pub mod events;
pub mod types;

pub use commands::{ProcessPayment, RefundPayment, ReleaseInventory, ReserveInventory, ShipOrderRequest};
pub use error::ContractError;
pub use events::{
    InventoryReserved, OrderCreated, OrderShipped, ParticipantFault, PaymentAuthorized,
    PaymentRefunded, RequestTimedOut,
};
pub use types::{Address, OrderItem, PaymentMethod, RequestKind};
