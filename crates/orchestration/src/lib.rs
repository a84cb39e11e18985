//! Saga orchestration engine for the order-fulfillment transaction.
//!
//! A central, correlation-keyed state machine drives each step of the
//! order → payment → inventory → shipping transaction: it issues
//! asynchronous requests to participants, waits with a timeout, reacts to
//! success/fault/timeout outcomes, and on failure after partial progress
//! runs compensating actions in reverse order of commitment.
//!
//! The "wait" for a reply is never a blocked task: the saga simply remains
//! in a non-terminal state until a future bus message arrives. The only
//! shared mutable resource is the instance store, guarded by a
//! compare-and-swap version counter.

pub mod compensation;
pub mod config;
pub mod engine;
pub mod error;
pub mod instance;
pub mod order;
pub mod orchestrator;
pub mod postgres;
pub mod request_reply;
pub mod state;
pub mod store;

pub use compensation::{CompensationAction, CompensationDispatcher, compensation_plan};
pub use config::{OrchestrationConfig, SagaTimeouts};
pub use engine::{SagaDefinition, SagaEngine};
pub use error::OrchestrationError;
pub use instance::{OrderSnapshot, SagaInstance};
pub use order::{OrderSaga, OrderSagaEffect, OrderSagaEvent, ParticipantCommand};
pub use orchestrator::SagaOrchestrator;
pub use postgres::PostgresSagaStore;
pub use request_reply::{PendingRequest, RequestOutcome, RequestReplyCoordinator};
pub use state::OrderSagaState;
pub use store::{InMemorySagaStore, SagaData, SagaStore, StoreError, Version};
