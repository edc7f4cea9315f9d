use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;

/// Domain events emitted by the service layer. The consumer task currently
/// logs them; wiring a webhook or queue fan-out slots in behind the same
/// channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Checkout events
    CheckoutStarted {
        session_id: Uuid,
        cart_id: Uuid,
    },
    CheckoutCompleted {
        session_id: Uuid,
        order_id: Uuid,
    },
    CheckoutFailed {
        session_id: Uuid,
        reason: String,
    },

    // Order events
    OrderCreated(Uuid),
    OrderCancelled(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },

    // Payment events
    PaymentIntentCreated(Uuid),
    PaymentSucceeded(Uuid),
    PaymentDeclined(Uuid),

    // Customer record events
    AddressDefaultChanged {
        customer_id: Uuid,
        address_id: Uuid,
    },
    PaymentMethodCreated(Uuid),
    PaymentMethodRemoved(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously. Event delivery is best-effort; a full
    /// or closed channel is logged, never propagated to the caller.
    pub async fn send(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!(error = %e, "failed to enqueue event");
        }
    }
}

/// Consumer loop for the application event channel.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::CheckoutCompleted {
                session_id,
                order_id,
            } => {
                info!(%session_id, %order_id, "checkout completed");
            }
            Event::CheckoutFailed { session_id, reason } => {
                warn!(%session_id, %reason, "checkout failed");
            }
            Event::PaymentDeclined(intent_id) => {
                warn!(%intent_id, "payment declined");
            }
            other => {
                info!(event = ?other, "event processed");
            }
        }
    }
    info!("event channel closed; processor exiting");
}
