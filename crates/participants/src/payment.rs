//! Payment participant.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use common::{CorrelationId, Money};
use contracts::{ParticipantFault, PaymentAuthorized, PaymentRefunded, ProcessPayment,
    RefundPayment, RequestKind};
use messaging::{Message, MessageBus, Result};
use tokio::sync::mpsc::UnboundedReceiver;

const FAULT_REASON: &str = "Account not available for requested amount";

#[derive(Debug, Default)]
struct PaymentState {
    /// Committed charges keyed by transaction id.
    transactions: HashMap<String, Money>,
    /// Orders already charged, for redelivery idempotence.
    processed: HashMap<CorrelationId, String>,
    refunded: Vec<String>,
    next_id: u32,
    fail_on_process: bool,
    silent: bool,
}

/// In-memory payment service consuming the `payment` queue.
#[derive(Clone)]
pub struct PaymentParticipant<B> {
    bus: Arc<B>,
    state: Arc<RwLock<PaymentState>>,
}

impl<B: MessageBus> PaymentParticipant<B> {
    /// Creates a payment participant on top of a bus adapter.
    pub fn new(bus: Arc<B>) -> Self {
        Self {
            bus,
            state: Arc::new(RwLock::new(PaymentState::default())),
        }
    }

    /// Configures the participant to decline charges.
    pub fn set_fail_on_process(&self, fail: bool) {
        self.state.write().unwrap().fail_on_process = fail;
    }

    /// Configures the participant to swallow requests without replying,
    /// simulating an outage.
    pub fn set_silent(&self, silent: bool) {
        self.state.write().unwrap().silent = silent;
    }

    /// Returns the number of active (charged, not refunded) transactions.
    pub fn transaction_count(&self) -> usize {
        self.state.read().unwrap().transactions.len()
    }

    /// Returns true if the given transaction was refunded.
    pub fn was_refunded(&self, transaction_id: &str) -> bool {
        self.state
            .read()
            .unwrap()
            .refunded
            .iter()
            .any(|id| id == transaction_id)
    }

    /// Returns the number of refunds issued.
    pub fn refund_count(&self) -> usize {
        self.state.read().unwrap().refunded.len()
    }

    /// Consumes queue messages until the channel closes.
    pub async fn run(self, mut receiver: UnboundedReceiver<Message>) {
        while let Some(message) = receiver.recv().await {
            if let Err(err) = self.handle_message(&message).await {
                tracing::error!(kind = %message.kind, error = %err, "payment handler failed");
            }
        }
    }

    /// Processes one command. Kinds this participant does not own are
    /// ignored.
    pub async fn handle_message(&self, message: &Message) -> Result<()> {
        match message.kind.as_str() {
            "ProcessPayment" => self.process(message.decode()?).await,
            "RefundPayment" => self.refund(message.decode()?).await,
            _ => Ok(()),
        }
    }

    async fn process(&self, command: ProcessPayment) -> Result<()> {
        // Decide under the lock, publish after releasing it.
        let reply = {
            let mut state = self.state.write().unwrap();
            if state.silent {
                tracing::debug!(order_id = %command.order_id, "payment participant silent, dropping request");
                return Ok(());
            }
            if state.fail_on_process {
                None
            } else {
                let transaction_id = match state.processed.get(&command.order_id) {
                    // Redelivery: repeat the original reply, charge once.
                    Some(existing) => existing.clone(),
                    None => {
                        state.next_id += 1;
                        let id = format!("TXN-{:04}", state.next_id);
                        state.transactions.insert(id.clone(), command.order_total);
                        state.processed.insert(command.order_id, id.clone());
                        id
                    }
                };
                Some(transaction_id)
            }
        };

        match reply {
            Some(transaction_id) => {
                tracing::info!(order_id = %command.order_id, %transaction_id, amount = %command.order_total, "payment authorized");
                metrics::counter!("payments_authorized_total").increment(1);
                let event = PaymentAuthorized {
                    order_id: command.order_id,
                    transaction_id,
                    amount: command.order_total,
                    authorized_at: Utc::now(),
                };
                self.bus
                    .publish(Message::new(command.order_id, "PaymentAuthorized", &event)?)
                    .await
            }
            None => {
                tracing::warn!(order_id = %command.order_id, "payment declined");
                metrics::counter!("payments_declined_total").increment(1);
                let fault =
                    ParticipantFault::new(command.order_id, RequestKind::ProcessPayment, FAULT_REASON);
                self.bus
                    .publish(Message::new(command.order_id, "ParticipantFault", &fault)?)
                    .await
            }
        }
    }

    async fn refund(&self, command: RefundPayment) -> Result<()> {
        {
            let mut state = self.state.write().unwrap();
            // Refunding an unknown or already-refunded transaction is a
            // no-op so redeliveries stay harmless.
            if state.transactions.remove(&command.transaction_id).is_none() {
                tracing::debug!(order_id = %command.order_id, transaction_id = %command.transaction_id, "refund for unknown transaction, ignored");
                return Ok(());
            }
            state.refunded.push(command.transaction_id.clone());
        }

        tracing::info!(order_id = %command.order_id, transaction_id = %command.transaction_id, amount = %command.refund_amount, "payment refunded");
        metrics::counter!("payments_refunded_total").increment(1);
        let event = PaymentRefunded {
            order_id: command.order_id,
            refund_transaction_id: command.transaction_id,
            refunded_amount: command.refund_amount,
            refunded_at: Utc::now(),
        };
        self.bus
            .publish(Message::new(command.order_id, "PaymentRefunded", &event)?)
            .await
    }
}
