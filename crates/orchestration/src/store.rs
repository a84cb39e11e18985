//! Durable, correlation-keyed saga instance store.
//!
//! The store is the only shared mutable resource in the system. Its
//! concurrency control is a compare-and-swap on a per-instance version
//! counter: two concurrently arriving messages for the same saga (say, a
//! late timeout racing a success reply) cannot produce a corrupted merged
//! state — one save wins, the other observes [`StoreError::ConcurrentModification`]
//! and must reload and reapply.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::CorrelationId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

/// Per-instance version counter for optimistic concurrency control.
///
/// Starts at 0 for an instance that has never been stored; `create`
/// stores at version 1 and every successful `save` advances by 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version of a never-stored instance (0).
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the version assigned on first store (1).
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that can occur when interacting with the saga store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An instance with this correlation id already exists.
    #[error("Saga instance already exists: {0}")]
    AlreadyExists(CorrelationId),

    /// No instance is stored under this correlation id.
    #[error("Saga instance not found: {0}")]
    NotFound(CorrelationId),

    /// The stored version advanced since the caller loaded the instance.
    /// The caller must reload and reapply.
    #[error(
        "Concurrent modification of saga {correlation_id}: expected version {expected}, found {actual}"
    )]
    ConcurrentModification {
        correlation_id: CorrelationId,
        expected: Version,
        actual: Version,
    },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Instance state could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// What the store (and the engine) need to know about an instance,
/// independent of the concrete saga type.
pub trait SagaData: Clone + Send + Sync + 'static {
    /// The correlation id — the sole lookup key.
    fn correlation_id(&self) -> CorrelationId;

    /// The version the instance was loaded at.
    fn version(&self) -> Version;

    /// Sets the version; called by the store after create/save.
    fn set_version(&mut self, version: Version);

    /// True once the instance reached a terminal state.
    fn is_terminal(&self) -> bool;

    /// Human-readable state name for audit queries.
    fn state_label(&self) -> &'static str;

    /// Advances `updated_at`; called by the engine before every save.
    fn touch(&mut self);
}

/// Keyed repository for saga instances with compare-and-swap saves.
///
/// Instances are never physically deleted — terminal instances remain
/// queryable for audit.
#[async_trait]
pub trait SagaStore<T: SagaData>: Send + Sync {
    /// Stores a brand-new instance at version 1.
    ///
    /// Fails with [`StoreError::AlreadyExists`] if the correlation id is
    /// in use.
    async fn create(&self, instance: T) -> Result<T>;

    /// Loads the instance for a correlation id.
    ///
    /// Fails with [`StoreError::NotFound`] if no instance exists.
    async fn load(&self, correlation_id: CorrelationId) -> Result<T>;

    /// Saves an instance if the stored version still matches the version
    /// it was loaded at, advancing the counter by one.
    ///
    /// Fails with [`StoreError::ConcurrentModification`] otherwise.
    async fn save(&self, instance: T) -> Result<T>;
}

/// In-memory saga store for tests and local runs.
///
/// Same contract as the PostgreSQL implementation; swapping one for the
/// other must not change engine behavior.
#[derive(Clone)]
pub struct InMemorySagaStore<T> {
    instances: Arc<RwLock<HashMap<CorrelationId, T>>>,
}

impl<T> InMemorySagaStore<T> {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            instances: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the number of stored instances.
    pub async fn instance_count(&self) -> usize {
        self.instances.read().await.len()
    }
}

impl<T> Default for InMemorySagaStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: SagaData> SagaStore<T> for InMemorySagaStore<T> {
    async fn create(&self, mut instance: T) -> Result<T> {
        let correlation_id = instance.correlation_id();
        let mut instances = self.instances.write().await;

        if instances.contains_key(&correlation_id) {
            return Err(StoreError::AlreadyExists(correlation_id));
        }

        instance.set_version(Version::first());
        instances.insert(correlation_id, instance.clone());
        Ok(instance)
    }

    async fn load(&self, correlation_id: CorrelationId) -> Result<T> {
        self.instances
            .read()
            .await
            .get(&correlation_id)
            .cloned()
            .ok_or(StoreError::NotFound(correlation_id))
    }

    async fn save(&self, mut instance: T) -> Result<T> {
        let correlation_id = instance.correlation_id();
        let mut instances = self.instances.write().await;

        let stored = instances
            .get(&correlation_id)
            .ok_or(StoreError::NotFound(correlation_id))?;

        if stored.version() != instance.version() {
            return Err(StoreError::ConcurrentModification {
                correlation_id,
                expected: instance.version(),
                actual: stored.version(),
            });
        }

        instance.set_version(instance.version().next());
        instances.insert(correlation_id, instance.clone());
        Ok(instance)
    }
}
