//! In-memory bus implementation for tests and local runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};

use crate::bus::MessageBus;
use crate::error::{BusError, Result};
use crate::message::Message;
use crate::retry::RetryPolicy;

#[derive(Default)]
struct Registry {
    /// Broadcast subscribers (publish).
    topic: Vec<mpsc::UnboundedSender<Message>>,
    /// Point-to-point consumers (send), one queue per destination.
    queues: HashMap<String, mpsc::UnboundedSender<Message>>,
}

/// In-memory message bus.
///
/// Topic subscribers each get a copy of every published message; each
/// destination has a single queue consumer. Deferred delivery is driven by
/// `tokio::time`, so tests can pause the clock and advance it manually.
/// `fail_next_deliveries` injects transient failures to exercise the
/// retry policy.
#[derive(Clone)]
pub struct InMemoryMessageBus {
    registry: Arc<RwLock<Registry>>,
    retry: RetryPolicy,
    inject_failures: Arc<AtomicU32>,
}

impl InMemoryMessageBus {
    /// Creates a bus with the default retry policy (3 attempts, 5s apart).
    pub fn new() -> Self {
        Self::with_retry_policy(RetryPolicy::default())
    }

    /// Creates a bus with an explicit retry policy.
    pub fn with_retry_policy(retry: RetryPolicy) -> Self {
        Self {
            registry: Arc::new(RwLock::new(Registry::default())),
            retry,
            inject_failures: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Registers a broadcast subscriber and returns its receiving end.
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.registry.write().await.topic.push(tx);
        rx
    }

    /// Registers the consumer for a point-to-point destination.
    pub async fn subscribe_queue(&self, destination: &str) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.registry
            .write()
            .await
            .queues
            .insert(destination.to_string(), tx);
        rx
    }

    /// Makes the next `n` delivery attempts fail with a transient error.
    pub fn fail_next_deliveries(&self, n: u32) {
        self.inject_failures.store(n, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> bool {
        self.inject_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// One delivery attempt; `Err` means transient failure, retryable.
    async fn try_deliver(&self, destination: Option<&str>, message: &Message) -> Result<()> {
        if self.take_injected_failure() {
            return Err(BusError::DeliveryFailed {
                destination: destination.unwrap_or("topic").to_string(),
                attempts: 1,
            });
        }

        let registry = self.registry.read().await;
        match destination {
            Some(dest) => {
                let queue = registry
                    .queues
                    .get(dest)
                    .ok_or_else(|| BusError::UnknownDestination(dest.to_string()))?;
                queue.send(message.clone()).map_err(|_| BusError::DeliveryFailed {
                    destination: dest.to_string(),
                    attempts: 1,
                })
            }
            None => {
                for subscriber in &registry.topic {
                    // A dropped subscriber is not a delivery failure.
                    let _ = subscriber.send(message.clone());
                }
                Ok(())
            }
        }
    }

    /// Runs delivery attempts under the fixed-interval retry policy.
    async fn deliver_with_retry(&self, destination: Option<&str>, message: &Message) -> Result<()> {
        let mut last_err = None;
        for attempt in 1..=self.retry.attempts {
            match self.try_deliver(destination, message).await {
                Ok(()) => return Ok(()),
                Err(err @ BusError::UnknownDestination(_)) => return Err(err),
                Err(err) => {
                    tracing::warn!(
                        kind = %message.kind,
                        correlation_id = %message.correlation_id,
                        attempt,
                        error = %err,
                        "transient delivery failure"
                    );
                    last_err = Some(err);
                    if attempt < self.retry.attempts {
                        tokio::time::sleep(self.retry.interval).await;
                    }
                }
            }
        }

        match last_err {
            Some(_) => Err(BusError::DeliveryFailed {
                destination: destination.unwrap_or("topic").to_string(),
                attempts: self.retry.attempts,
            }),
            None => Ok(()),
        }
    }
}

impl Default for InMemoryMessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn publish(&self, message: Message) -> Result<()> {
        self.deliver_with_retry(None, &message).await
    }

    async fn send(&self, destination: &str, message: Message) -> Result<()> {
        self.deliver_with_retry(Some(destination), &message).await
    }

    async fn schedule_deferred(&self, delay: Duration, message: Message) -> Result<()> {
        let bus = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(error) = bus.deliver_with_retry(None, &message).await {
                tracing::error!(
                    kind = %message.kind,
                    correlation_id = %message.correlation_id,
                    %error,
                    "deferred delivery failed"
                );
            }
        });
        Ok(())
    }
}
