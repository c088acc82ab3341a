use std::sync::atomic::{AtomicU64, Ordering};

pub static DRAINS_STARTED_TOTAL: AtomicU64 = AtomicU64::new(0);
pub static DRAINS_SKIPPED_TOTAL: AtomicU64 = AtomicU64::new(0);
pub static ITEMS_SYNCED_TOTAL: AtomicU64 = AtomicU64::new(0);
pub static ITEMS_FAILED_TOTAL: AtomicU64 = AtomicU64::new(0);

pub fn record_drain_started() {
    DRAINS_STARTED_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub fn record_drain_skipped() {
    DRAINS_SKIPPED_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub fn record_item(synced: bool) {
    if synced {
        ITEMS_SYNCED_TOTAL.fetch_add(1, Ordering::Relaxed);
    } else {
        ITEMS_FAILED_TOTAL.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub drains_started: u64,
    pub drains_skipped: u64,
    pub items_synced: u64,
    pub items_failed: u64,
}

pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        drains_started: DRAINS_STARTED_TOTAL.load(Ordering::Relaxed),
        drains_skipped: DRAINS_SKIPPED_TOTAL.load(Ordering::Relaxed),
        items_synced: ITEMS_SYNCED_TOTAL.load(Ordering::Relaxed),
        items_failed: ITEMS_FAILED_TOTAL.load(Ordering::Relaxed),
    }
}
