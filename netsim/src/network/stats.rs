//! Delivery counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Snapshot of registry delivery statistics.
///
/// `sent` counts every send attempt, rejected ones included, so
/// `sent == delivered + dropped + in_flight` holds at every snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStatistics {
    /// Send attempts.
    pub sent: u64,
    /// Messages pushed into a destination queue.
    pub delivered: u64,
    /// Messages rejected at send time or lost in transit.
    pub dropped: u64,
    /// Accepted messages still in the dispatcher.
    pub in_flight: u64,
    /// Messages waiting in device inbound queues.
    pub queued_messages: u64,
    /// Links in the table.
    pub active_connections: usize,
    /// Links currently enabled.
    pub enabled_connections: usize,
    /// Devices owning an inbound queue.
    pub registered_devices: usize,
}

impl RegistryStatistics {
    /// Whether every accepted message has been delivered or dropped.
    pub fn is_settled(&self) -> bool {
        self.in_flight == 0
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    sent: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    pub(crate) fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// `(sent, delivered, dropped, in_flight)`.
    pub(crate) fn load(&self) -> (u64, u64, u64, u64) {
        // Read in delivery order so a concurrent completion never makes
        // delivered + dropped exceed sent.
        let delivered = self.delivered.load(Ordering::Acquire);
        let dropped = self.dropped.load(Ordering::Acquire);
        let sent = self.sent.load(Ordering::Acquire);
        let in_flight = sent.saturating_sub(delivered + dropped);
        (sent, delivered, dropped, in_flight)
    }
}
