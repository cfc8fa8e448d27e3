//! Fan-in queue and its single consumer.
//!
//! Every session submits through a cloned [`RouterHandle`]; one [`Router`]
//! task drains the queue in arrival order. The queue is unbounded: a
//! submitting session never waits on delivery.

use std::sync::Arc;

use courier_core::ChatMessage;
use metrics::counter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::{MESSAGES_DELIVERED_TOTAL, MESSAGES_DROPPED_TOTAL};
use crate::registry::ConnectionRegistry;

/// Producer side of the router queue.
#[derive(Clone, Debug)]
pub struct RouterHandle {
    tx: mpsc::UnboundedSender<ChatMessage>,
}

impl RouterHandle {
    /// Enqueue a message for delivery. Returns `false` if the router has stopped.
    pub fn submit(&self, message: ChatMessage) -> bool {
        self.tx.send(message).is_ok()
    }
}

/// What happened to one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Written to the recipient's channel.
    Delivered,
    /// Recipient not connected.
    NoRecipient,
    /// The write failed; the recipient was disconnected.
    Failed,
}

/// Single consumer of the router queue.
pub struct Router {
    registry: Arc<ConnectionRegistry>,
    rx: mpsc::UnboundedReceiver<ChatMessage>,
}

impl Router {
    /// Create a router over `registry` and the handle that feeds it.
    pub fn new(registry: Arc<ConnectionRegistry>) -> (Self, RouterHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { registry, rx }, RouterHandle { tx })
    }

    /// Drain the queue until `shutdown` fires or every handle is dropped.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("router started");
        loop {
            let message = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                message = self.rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            let _ = self.deliver(message).await;
        }
        info!("router stopped");
    }

    /// Deliver one message to its recipient's live session, if any.
    pub async fn deliver(&self, message: ChatMessage) -> Delivery {
        let Some(recipient) = self.registry.lookup(&message.to) else {
            debug!(from = %message.from, to = %message.to, "recipient offline, dropping");
            counter!(MESSAGES_DROPPED_TOTAL, "reason" => "offline").increment(1);
            return Delivery::NoRecipient;
        };

        match recipient.send_message(&message).await {
            Ok(()) => {
                counter!(MESSAGES_DELIVERED_TOTAL).increment(1);
                Delivery::Delivered
            }
            Err(error) => {
                warn!(
                    to = %message.to,
                    session_id = %recipient.id(),
                    %error,
                    "delivery failed, disconnecting recipient"
                );
                counter!(MESSAGES_DROPPED_TOTAL, "reason" => "write_failed").increment(1);
                let _ = self.registry.unregister(recipient.user(), &recipient);
                recipient.close().await;
                Delivery::Failed
            }
        }
    }
}
