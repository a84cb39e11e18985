//! Generic saga state machine engine.
//!
//! The engine interprets a [`SagaDefinition`]: given an instance, its
//! current state, and an incoming event, it looks up the matching
//! transition, runs its (pure) action against the instance data, saves the
//! instance, and only then hands back the transition's side effects for
//! execution. A crash between save and effect execution is recoverable by
//! re-emitting — every effect carries the correlation id and is safe to
//! issue more than once.

use common::CorrelationId;

use crate::error::{OrchestrationError, Result};
use crate::store::{SagaData, SagaStore, StoreError};

/// A concrete saga type, expressed as data the engine interprets.
///
/// `apply` must be a pure function of (state, event, instance data): no
/// I/O, no clock reads that affect the decision, deterministic. The engine
/// relies on this to retry a transition after a compare-and-swap conflict
/// by simply reloading and reapplying.
pub trait SagaDefinition: Send + Sync {
    /// The durable instance type this saga operates on.
    type Data: SagaData;

    /// The tagged-variant event type driving transitions.
    type Event: Send + Sync;

    /// Side effects a transition emits, executed after the save.
    type Effect: Send;

    /// Creates a fresh instance if `event` may initiate this saga.
    ///
    /// Returns `None` for events that can only ever address an existing
    /// instance (replies, faults, timeouts).
    fn start(&self, event: &Self::Event) -> Option<Self::Data>;

    /// Looks up the transition for (current state, event) and runs its
    /// action against the instance data.
    ///
    /// Returns `None` when the declared transition set for the current
    /// state has no entry for this event — the event is ignored, because
    /// late, duplicate, and out-of-order delivery from the bus is normal.
    fn apply(&self, instance: &mut Self::Data, event: &Self::Event) -> Option<Vec<Self::Effect>>;
}

/// Bound on reload-and-reapply after CAS conflicts.
const MAX_CONFLICT_RETRIES: u32 = 5;

/// Generic saga interpreter over a definition and an instance store.
pub struct SagaEngine<D, S> {
    definition: D,
    store: S,
}

impl<D, S> SagaEngine<D, S>
where
    D: SagaDefinition,
    S: SagaStore<D::Data>,
{
    /// Creates an engine for one saga definition.
    pub fn new(definition: D, store: S) -> Self {
        Self { definition, store }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Applies one incoming event to the saga keyed by `correlation_id`.
    ///
    /// Returns the ordered side-effect list of the applied transition, or
    /// an empty list when the event was ignored (terminal instance,
    /// undeclared transition, or stale event for an unknown instance).
    #[tracing::instrument(skip(self, event), fields(%correlation_id))]
    pub async fn handle_event(
        &self,
        correlation_id: CorrelationId,
        event: &D::Event,
    ) -> Result<Vec<D::Effect>> {
        for attempt in 0..=MAX_CONFLICT_RETRIES {
            let mut instance = match self.load_or_start(correlation_id, event).await? {
                Some(instance) => instance,
                None => return Ok(Vec::new()),
            };

            if instance.is_terminal() {
                tracing::debug!(
                    state = instance.state_label(),
                    "event for terminal instance acknowledged and discarded"
                );
                metrics::counter!("saga_events_ignored_total").increment(1);
                return Ok(Vec::new());
            }

            let Some(effects) = self.definition.apply(&mut instance, event) else {
                tracing::debug!(
                    state = instance.state_label(),
                    "no transition declared for event in this state, dropped"
                );
                metrics::counter!("saga_events_ignored_total").increment(1);
                return Ok(Vec::new());
            };

            instance.touch();
            match self.store.save(instance).await {
                Ok(saved) => {
                    tracing::info!(state = saved.state_label(), "transition applied");
                    return Ok(effects);
                }
                Err(StoreError::ConcurrentModification { .. }) => {
                    // Another message for this saga won the race; the
                    // effects computed against the stale state are
                    // discarded and the transition re-derived.
                    tracing::debug!(attempt, "concurrent save, reloading");
                    metrics::counter!("saga_save_conflicts_total").increment(1);
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(OrchestrationError::Conflict {
            correlation_id,
            attempts: MAX_CONFLICT_RETRIES,
        })
    }

    /// Loads the instance, creating it when the event may start a saga.
    ///
    /// `Ok(None)` means the event addresses no instance and cannot start
    /// one — it is stale and gets dropped.
    async fn load_or_start(
        &self,
        correlation_id: CorrelationId,
        event: &D::Event,
    ) -> Result<Option<D::Data>> {
        match self.store.load(correlation_id).await {
            Ok(instance) => Ok(Some(instance)),
            Err(StoreError::NotFound(_)) => match self.definition.start(event) {
                Some(fresh) => match self.store.create(fresh).await {
                    Ok(created) => {
                        metrics::counter!("saga_started_total").increment(1);
                        Ok(Some(created))
                    }
                    // Duplicate initiating event racing itself: the other
                    // delivery created the instance first.
                    Err(StoreError::AlreadyExists(_)) => {
                        Ok(Some(self.store.load(correlation_id).await?))
                    }
                    Err(err) => Err(err.into()),
                },
                None => {
                    tracing::debug!("event for unknown saga instance, dropped as stale");
                    metrics::counter!("saga_events_ignored_total").increment(1);
                    Ok(None)
                }
            },
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};

    use crate::store::{InMemorySagaStore, Version};

    /// Minimal saga used to exercise the engine without dragging in the
    /// order domain: counts ticks and finishes at three.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Counter {
        correlation_id: CorrelationId,
        version: Version,
        ticks: u32,
        updated_at: DateTime<Utc>,
    }

    impl SagaData for Counter {
        fn correlation_id(&self) -> CorrelationId {
            self.correlation_id
        }

        fn version(&self) -> Version {
            self.version
        }

        fn set_version(&mut self, version: Version) {
            self.version = version;
        }

        fn is_terminal(&self) -> bool {
            self.ticks >= 3
        }

        fn state_label(&self) -> &'static str {
            if self.is_terminal() { "Done" } else { "Counting" }
        }

        fn touch(&mut self) {
            self.updated_at = Utc::now();
        }
    }

    enum CounterEvent {
        Start(CorrelationId),
        Tick,
    }

    struct CounterSaga;

    impl SagaDefinition for CounterSaga {
        type Data = Counter;
        type Event = CounterEvent;
        type Effect = u32;

        fn start(&self, event: &CounterEvent) -> Option<Counter> {
            match event {
                CounterEvent::Start(correlation_id) => Some(Counter {
                    correlation_id: *correlation_id,
                    version: Version::initial(),
                    ticks: 0,
                    updated_at: Utc::now(),
                }),
                CounterEvent::Tick => None,
            }
        }

        fn apply(&self, instance: &mut Counter, event: &CounterEvent) -> Option<Vec<u32>> {
            match event {
                CounterEvent::Start(_) => None,
                CounterEvent::Tick => {
                    instance.ticks += 1;
                    Some(vec![instance.ticks])
                }
            }
        }
    }

    fn engine() -> SagaEngine<CounterSaga, InMemorySagaStore<Counter>> {
        SagaEngine::new(CounterSaga, InMemorySagaStore::new())
    }

    #[tokio::test]
    async fn initiating_event_creates_the_instance() {
        let engine = engine();
        let id = CorrelationId::new();

        let effects = engine.handle_event(id, &CounterEvent::Start(id)).await.unwrap();
        assert!(effects.is_empty());

        let instance = engine.store().load(id).await.unwrap();
        assert_eq!(instance.ticks, 0);
        assert_eq!(instance.version(), Version::first());
    }

    #[tokio::test]
    async fn event_for_unknown_instance_is_dropped() {
        let engine = engine();
        let effects = engine
            .handle_event(CorrelationId::new(), &CounterEvent::Tick)
            .await
            .unwrap();
        assert!(effects.is_empty());
    }

    #[tokio::test]
    async fn effects_are_returned_after_the_save() {
        let engine = engine();
        let id = CorrelationId::new();
        engine.handle_event(id, &CounterEvent::Start(id)).await.unwrap();

        let effects = engine.handle_event(id, &CounterEvent::Tick).await.unwrap();
        assert_eq!(effects, vec![1]);

        let instance = engine.store().load(id).await.unwrap();
        assert_eq!(instance.ticks, 1);
        assert_eq!(instance.version(), Version::new(2));
    }

    #[tokio::test]
    async fn terminal_instances_ignore_further_events() {
        let engine = engine();
        let id = CorrelationId::new();
        engine.handle_event(id, &CounterEvent::Start(id)).await.unwrap();
        for _ in 0..3 {
            engine.handle_event(id, &CounterEvent::Tick).await.unwrap();
        }

        let effects = engine.handle_event(id, &CounterEvent::Tick).await.unwrap();
        assert!(effects.is_empty());
        assert_eq!(engine.store().load(id).await.unwrap().ticks, 3);
    }

    #[tokio::test]
    async fn duplicate_initiating_event_is_ignored() {
        let engine = engine();
        let id = CorrelationId::new();
        engine.handle_event(id, &CounterEvent::Start(id)).await.unwrap();
        engine.handle_event(id, &CounterEvent::Start(id)).await.unwrap();

        let instance = engine.store().load(id).await.unwrap();
        assert_eq!(instance.ticks, 0);
        assert_eq!(instance.version(), Version::first());
    }

    #[tokio::test]
    async fn concurrent_events_are_serialized_by_the_cas() {
        use std::sync::Arc;

        let engine = Arc::new(engine());
        let id = CorrelationId::new();
        engine.handle_event(id, &CounterEvent::Start(id)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine.handle_event(id, &CounterEvent::Tick).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Every tick landed exactly once despite racing saves.
        let instance = engine.store().load(id).await.unwrap();
        assert_eq!(instance.ticks, 3);
        assert_eq!(instance.version(), Version::new(4));
    }

    #[tokio::test]
    async fn replaying_the_same_events_is_deterministic() {
        let first = engine();
        let second = engine();
        let id = CorrelationId::new();

        for engine in [&first, &second] {
            engine.handle_event(id, &CounterEvent::Start(id)).await.unwrap();
            engine.handle_event(id, &CounterEvent::Tick).await.unwrap();
            engine.handle_event(id, &CounterEvent::Tick).await.unwrap();
        }

        let a = first.store().load(id).await.unwrap();
        let b = second.store().load(id).await.unwrap();
        assert_eq!(a.ticks, b.ticks);
        assert_eq!(a.version(), b.version());
        assert_eq!(a.state_label(), b.state_label());
    }
}
