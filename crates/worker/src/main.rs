//! Saga worker entry point.
//!
//! Wires the orchestrator and the three participants over the in-memory
//! bus, then submits a demo order so a fresh checkout shows a complete
//! saga run in the logs.

use std::sync::Arc;

use common::{CorrelationId, CustomerId, Money};
use contracts::{Address, OrderCreated, OrderItem, PaymentMethod};
use messaging::{InMemoryMessageBus, Message, MessageBus};
use orchestration::{InMemorySagaStore, OrchestrationConfig, SagaOrchestrator};
use participants::{InventoryParticipant, PaymentParticipant, ShippingParticipant};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn demo_order() -> OrderCreated {
    OrderCreated::new(
        CorrelationId::new(),
        CustomerId::new(),
        "demo@example.com",
        Money::from_cents(9999),
        PaymentMethod::CreditCard,
        vec![
            OrderItem::new("SKU-001", 2, Money::from_cents(2500)),
            OrderItem::new("SKU-002", 1, Money::from_cents(4999)),
        ],
        Address::new("1 Main St", "Springfield", "12345", "US"),
    )
    .expect("demo order is valid")
}

#[tokio::main]
async fn main() {
    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Load configuration
    let config = OrchestrationConfig::from_env();
    tracing::info!(?config, "starting saga worker");

    // 3. Create the bus and subscribe everyone before any traffic flows
    let bus = Arc::new(InMemoryMessageBus::with_retry_policy(config.retry));
    let payment_queue = bus.subscribe_queue("payment").await;
    let inventory_queue = bus.subscribe_queue("inventory").await;
    let shipping_queue = bus.subscribe_queue("shipping").await;
    let topic = bus.subscribe().await;

    // 4. Spawn the participants
    tokio::spawn(PaymentParticipant::new(bus.clone()).run(payment_queue));
    tokio::spawn(InventoryParticipant::new(bus.clone()).run(inventory_queue));
    tokio::spawn(ShippingParticipant::new(bus.clone()).run(shipping_queue));

    // 5. Spawn the orchestrator
    let orchestrator = Arc::new(SagaOrchestrator::new(
        bus.clone(),
        InMemorySagaStore::new(),
        config,
    ));
    tokio::spawn(orchestrator.clone().run(topic));

    // 6. Submit a demo order
    let order = demo_order();
    tracing::info!(order_id = %order.order_id, total = %order.order_total, "submitting demo order");
    bus.publish(Message::new(order.order_id, "OrderCreated", &order).expect("serializable order"))
        .await
        .expect("bus accepts the demo order");

    shutdown_signal().await;
    tracing::info!("worker shut down gracefully");
}
