//! Message transport for the saga orchestration system.
//!
//! The orchestrator and its participants never call each other directly;
//! everything crosses a [`MessageBus`]: commands point-to-point, events by
//! publish/subscribe, and request timeouts via deferred delivery. Delivery
//! is at-least-once — consumers must tolerate duplicates.

pub mod bus;
pub mod error;
pub mod memory;
pub mod message;
pub mod retry;

pub use bus::MessageBus;
pub use error::{BusError, Result};
pub use memory::InMemoryMessageBus;
pub use message::Message;
pub use retry::RetryPolicy;
