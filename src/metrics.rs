//! Process-wide counters for the monitor pipeline.
//!
//! Every monitor instance feeds the same counters; per-instance numbers live in
//! [`crate::link::ReassemblyStats`].
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

static BYTES_INGESTED: AtomicU64 = AtomicU64::new(0);
static FRAMES_ACCEPTED: AtomicU64 = AtomicU64::new(0);
static FRAMES_DROPPED: AtomicU64 = AtomicU64::new(0);
static DESYNC_WARNINGS: AtomicU64 = AtomicU64::new(0);
static NODES_REGISTERED: AtomicU64 = AtomicU64::new(0);
static CAPACITY_REJECTIONS: AtomicU64 = AtomicU64::new(0);
static SWEEPS: AtomicU64 = AtomicU64::new(0);

pub fn add_bytes_ingested(n: usize) {
    BYTES_INGESTED.fetch_add(n as u64, Ordering::Relaxed);
}
pub fn add_frames_accepted(n: usize) {
    FRAMES_ACCEPTED.fetch_add(n as u64, Ordering::Relaxed);
}
pub fn add_frames_dropped(n: u64) {
    FRAMES_DROPPED.fetch_add(n, Ordering::Relaxed);
}
pub fn inc_desync_warnings() {
    DESYNC_WARNINGS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_nodes_registered() {
    NODES_REGISTERED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_capacity_rejections() {
    CAPACITY_REJECTIONS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_sweeps() {
    SWEEPS.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct Snapshot {
    pub bytes_ingested: u64,
    pub frames_accepted: u64,
    pub frames_dropped: u64,
    pub desync_warnings: u64,
    pub nodes_registered: u64,
    pub capacity_rejections: u64,
    pub sweeps: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        bytes_ingested: BYTES_INGESTED.load(Ordering::Relaxed),
        frames_accepted: FRAMES_ACCEPTED.load(Ordering::Relaxed),
        frames_dropped: FRAMES_DROPPED.load(Ordering::Relaxed),
        desync_warnings: DESYNC_WARNINGS.load(Ordering::Relaxed),
        nodes_registered: NODES_REGISTERED.load(Ordering::Relaxed),
        capacity_rejections: CAPACITY_REJECTIONS.load(Ordering::Relaxed),
        sweeps: SWEEPS.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Counters are shared with every other test in the binary, so only check growth.
    #[test]
    fn counters_only_grow() {
        let before = snapshot();
        add_bytes_ingested(11);
        add_frames_accepted(1);
        add_frames_dropped(2);
        inc_sweeps();
        let after = snapshot();
        assert!(after.bytes_ingested >= before.bytes_ingested + 11);
        assert!(after.frames_accepted >= before.frames_accepted + 1);
        assert!(after.frames_dropped >= before.frames_dropped + 2);
        assert!(after.sweeps >= before.sweeps + 1);
    }
}
