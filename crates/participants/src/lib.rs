//! Saga participants: payment, inventory and shipping.
//!
//! Each participant consumes commands from its own queue and publishes
//! reply events (or [`contracts::ParticipantFault`]) on the shared
//! topic. All are in-memory simulations with switchable failure modes,
//! mirroring the behavior of the real services they stand in for:
//! idempotent on redelivery, explicit fault replies on business
//! failures, and silence when told to simulate an outage.

pub mod inventory;
pub mod payment;
pub mod shipping;

pub use inventory::InventoryParticipant;
pub use payment::PaymentParticipant;
pub use shipping::ShippingParticipant;
