//! Outbound sink of a connected client
//!
//! The session owns the receiving half of the channel and the writer task
//! draining it; the registry and in-flight broadcasts only hold clones of
//! this sender handle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, Notify};

use crate::error::DeliveryError;
use crate::message::Message;

/// Cloneable handle for writing to one client
#[derive(Debug, Clone)]
pub struct ClientSink {
    sender: mpsc::Sender<Message>,
    lost: Arc<Notify>,
}

impl ClientSink {
    /// Create a sink with a bounded outbound buffer
    ///
    /// Returns the receiver the session's writer task drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let (sender, receiver) = mpsc::channel(capacity);
        let sink = Self {
            sender,
            lost: Arc::new(Notify::new()),
        };
        (sink, receiver)
    }

    /// Queue a message for this client, waiting at most `timeout` for buffer space
    pub async fn deliver(&self, msg: Message, timeout: Duration) -> Result<(), DeliveryError> {
        self.sender
            .send_timeout(msg, timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => DeliveryError::TimedOut,
                SendTimeoutError::Closed(_) => DeliveryError::Closed,
            })
    }

    /// Whether the writer side has gone away
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Flag the connection as dead so the owning session leaves its read loop
    pub fn mark_lost(&self) {
        self.lost.notify_one();
    }

    /// Resolves once some broadcaster has called [`mark_lost`](Self::mark_lost)
    pub async fn lost(&self) {
        self.lost.notified().await;
    }
}
