//! Orchestration configuration, read from the environment.

use std::time::Duration;

use contracts::RequestKind;
use messaging::RetryPolicy;

const DEFAULT_PAYMENT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_INVENTORY_TIMEOUT_SECS: u64 = 15;
const DEFAULT_SHIPPING_TIMEOUT_SECS: u64 = 60;

fn env_secs(key: &str, default: u64) -> Duration {
    let secs = std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default);
    Duration::from_secs(secs)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

/// Per-request reply deadlines. A participant that has not answered
/// within its deadline is treated as timed out and the saga fails over
/// to compensation.
#[derive(Debug, Clone, Copy)]
pub struct SagaTimeouts {
    pub payment: Duration,
    pub inventory: Duration,
    pub shipping: Duration,
}

impl Default for SagaTimeouts {
    fn default() -> Self {
        Self {
            payment: Duration::from_secs(DEFAULT_PAYMENT_TIMEOUT_SECS),
            inventory: Duration::from_secs(DEFAULT_INVENTORY_TIMEOUT_SECS),
            shipping: Duration::from_secs(DEFAULT_SHIPPING_TIMEOUT_SECS),
        }
    }
}

impl SagaTimeouts {
    /// Reads `PAYMENT_TIMEOUT_SECS`, `INVENTORY_TIMEOUT_SECS` and
    /// `SHIPPING_TIMEOUT_SECS`, falling back to the defaults.
    pub fn from_env() -> Self {
        Self {
            payment: env_secs("PAYMENT_TIMEOUT_SECS", DEFAULT_PAYMENT_TIMEOUT_SECS),
            inventory: env_secs("INVENTORY_TIMEOUT_SECS", DEFAULT_INVENTORY_TIMEOUT_SECS),
            shipping: env_secs("SHIPPING_TIMEOUT_SECS", DEFAULT_SHIPPING_TIMEOUT_SECS),
        }
    }

    /// The deadline for a given participant request.
    pub fn for_request(&self, kind: RequestKind) -> Duration {
        match kind {
            RequestKind::ProcessPayment => self.payment,
            RequestKind::ReserveInventory => self.inventory,
            RequestKind::ShipOrder => self.shipping,
        }
    }
}

/// Everything the orchestrator needs at startup.
#[derive(Debug, Clone)]
pub struct OrchestrationConfig {
    pub timeouts: SagaTimeouts,
    pub retry: RetryPolicy,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            timeouts: SagaTimeouts::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl OrchestrationConfig {
    /// Reads the full configuration from the environment. Bus delivery
    /// retries come from `BUS_RETRY_ATTEMPTS` and
    /// `BUS_RETRY_INTERVAL_SECS`.
    pub fn from_env() -> Self {
        Self {
            timeouts: SagaTimeouts::from_env(),
            retry: RetryPolicy::new(
                env_u32("BUS_RETRY_ATTEMPTS", 3),
                env_secs("BUS_RETRY_INTERVAL_SECS", 5),
            ),
        }
    }
}
