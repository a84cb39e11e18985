//! Orchestration errors.

use common::CorrelationId;
use messaging::BusError;
use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced by the orchestration core.
///
/// Participant faults and timeouts are NOT errors here — they are saga
/// events handled by the state machine. These variants cover infra
/// failures only.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// Instance store failure (other than CAS conflicts, which the engine
    /// retries internally).
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Bus delivery failed after the adapter's retry policy was exhausted.
    /// The instance remains at its last durably-saved state.
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// Reload-and-reapply kept conflicting; operational alerting territory.
    #[error("Gave up on saga {correlation_id} after {attempts} conflicting saves")]
    Conflict {
        correlation_id: CorrelationId,
        attempts: u32,
    },
}

/// Result type for orchestration operations.
pub type Result<T> = std::result::Result<T, OrchestrationError>;
