//! Broadcast fan-out
//!
//! Delivers one message to every registered client except an optional
//! excluded identity. Each recipient is independent: a dead or slow client
//! is recorded, marked lost and skipped, never failing the whole broadcast.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{ChatError, DeliveryError};
use crate::message::Message;
use crate::registry::{RegistryEntry, RegistryHandle};
use crate::types::ClientId;

/// Outcome of one broadcast call
#[derive(Debug, Default)]
pub struct BroadcastReport {
    /// Recipients the message was queued for, in delivery order
    pub delivered: Vec<ClientId>,
    /// Recipients whose write failed
    pub failures: Vec<(ClientId, DeliveryError)>,
}

impl BroadcastReport {
    pub fn delivered_count(&self) -> usize {
        self.delivered.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Registry-backed broadcaster shared by all sessions
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: RegistryHandle,
    write_timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: RegistryHandle, write_timeout: Duration) -> Self {
        Self {
            registry,
            write_timeout,
        }
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    /// Send `message` to every active client except `exclude`
    ///
    /// Only fails if the registry itself is gone; per-recipient failures
    /// are reported in the returned [`BroadcastReport`].
    pub async fn broadcast(
        &self,
        message: &Message,
        exclude: Option<ClientId>,
    ) -> Result<BroadcastReport, ChatError> {
        let snapshot = self.registry.snapshot().await?;
        Ok(fan_out(&snapshot, message, exclude, self.write_timeout).await)
    }
}

/// Deliver `message` to each entry of `snapshot` in order, skipping `exclude`
pub async fn fan_out(
    snapshot: &[RegistryEntry],
    message: &Message,
    exclude: Option<ClientId>,
    write_timeout: Duration,
) -> BroadcastReport {
    let mut report = BroadcastReport::default();

    for entry in snapshot {
        if Some(entry.id) == exclude {
            continue;
        }

        match entry.sink.deliver(message.clone(), write_timeout).await {
            Ok(()) => report.delivered.push(entry.id),
            Err(e) => {
                warn!(
                    "Failed to deliver to {} ('{}'): {}",
                    entry.id, entry.nickname, e
                );
                entry.sink.mark_lost();
                report.failures.push((entry.id, e));
            }
        }
    }

    debug!(
        "Broadcast delivered to {}, failed for {}",
        report.delivered.len(),
        report.failures.len()
    );
    report
}
