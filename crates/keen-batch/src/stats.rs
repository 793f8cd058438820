use std::sync::atomic::{AtomicU64, Ordering};

/// Delivery counters, updated by the dispatcher and readable from anywhere.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    batches_sent: AtomicU64,
    batches_failed: AtomicU64,
    events_sent: AtomicU64,
    events_dropped: AtomicU64,
    events_requeued: AtomicU64,
}

/// Point-in-time copy of [`DeliveryStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub batches_sent: u64,
    pub batches_failed: u64,
    pub events_sent: u64,
    pub events_dropped: u64,
    pub events_requeued: u64,
}

impl DeliveryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&self, events: usize) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.events_sent.fetch_add(events as u64, Ordering::Relaxed);
    }

    /// One failed flush: `dropped` events were given up on and `requeued`
    /// were put back for another attempt.
    pub fn record_failed(&self, dropped: usize, requeued: usize) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
        self.events_dropped.fetch_add(dropped as u64, Ordering::Relaxed);
        self.events_requeued.fetch_add(requeued as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            events_sent: self.events_sent.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            events_requeued: self.events_requeued.load(Ordering::Relaxed),
        }
    }
}
