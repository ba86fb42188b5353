use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Events emitted by the reconciliation pipeline.
///
/// Downstream consumers (confirmation email, fulfillment notification) hang
/// off the processing loop; the pipeline itself never waits on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: i32,
        transaction_id: String,
    },
    ReconciliationSkipped {
        transaction_id: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is gone.
    /// Reconciliation must not fail because a downstream consumer stopped.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropping event: {}", e);
        }
    }
}

/// Consumes pipeline events until every sender is dropped
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::OrderCreated {
                order_id,
                transaction_id,
            } => {
                if let Err(e) = handle_order_created(order_id, &transaction_id).await {
                    error!(
                        order_id,
                        %transaction_id,
                        error = %e,
                        "Failed to handle order created event"
                    );
                }
            }
            Event::ReconciliationSkipped {
                transaction_id,
                reason,
            } => {
                info!(%transaction_id, %reason, "Reconciliation skipped");
            }
        }
    }

    warn!("Event processing loop has ended");
}

async fn handle_order_created(order_id: i32, transaction_id: &str) -> Result<(), String> {
    // Hook point for confirmation email and fulfillment notification
    info!(order_id, %transaction_id, "Processing order created event");
    Ok(())
}
