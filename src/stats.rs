//! Runtime Counters
//!
//! Process-wide counters for storage-area activity. These exist for
//! observability and for leak accounting in tests: every successful page
//! mapping increments `pages_mapped`, every unmap increments
//! `pages_unmapped`, and the difference is the number of live OS mappings
//! attributable to this crate.

use std::sync::atomic::{AtomicU64, Ordering};

static AREAS_CREATED: AtomicU64 = AtomicU64::new(0);
static AREAS_DESTROYED: AtomicU64 = AtomicU64::new(0);
static PAGES_MAPPED: AtomicU64 = AtomicU64::new(0);
static PAGES_UNMAPPED: AtomicU64 = AtomicU64::new(0);
static COW_SPLITS: AtomicU64 = AtomicU64::new(0);
static FAULTS_INTERCEPTED: AtomicU64 = AtomicU64::new(0);

/// Record a descriptor creation (`create` or `clone`).
#[inline]
pub(crate) fn record_area_created() {
    AREAS_CREATED.fetch_add(1, Ordering::Relaxed);
}

/// Record a descriptor destruction.
#[inline]
pub(crate) fn record_area_destroyed() {
    AREAS_DESTROYED.fetch_add(1, Ordering::Relaxed);
}

/// Record a successful page mapping.
#[inline]
pub(crate) fn record_page_mapped() {
    PAGES_MAPPED.fetch_add(1, Ordering::Relaxed);
}

/// Record a page unmapping.
#[inline]
pub(crate) fn record_page_unmapped() {
    PAGES_UNMAPPED.fetch_add(1, Ordering::Relaxed);
}

/// Record a copy-on-write split.
#[inline]
pub(crate) fn record_cow_split() {
    COW_SPLITS.fetch_add(1, Ordering::Relaxed);
}

/// Record a fault intercepted by the trap handler.
///
/// Called from signal context; a relaxed atomic increment is
/// async-signal-safe.
#[inline]
pub(crate) fn record_fault_intercepted() {
    FAULTS_INTERCEPTED.fetch_add(1, Ordering::Relaxed);
}

/// Number of page mappings currently alive.
pub fn live_pages() -> u64 {
    let mapped = PAGES_MAPPED.load(Ordering::Relaxed);
    let unmapped = PAGES_UNMAPPED.load(Ordering::Relaxed);
    mapped.saturating_sub(unmapped)
}

/// Number of storage areas currently registered.
pub fn live_areas() -> u64 {
    let created = AREAS_CREATED.load(Ordering::Relaxed);
    let destroyed = AREAS_DESTROYED.load(Ordering::Relaxed);
    created.saturating_sub(destroyed)
}

/// Point-in-time view of all counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    /// Total descriptors created via `create` or `clone`.
    pub areas_created: u64,
    /// Total descriptors destroyed.
    pub areas_destroyed: u64,
    /// Total pages mapped.
    pub pages_mapped: u64,
    /// Total pages unmapped.
    pub pages_unmapped: u64,
    /// Total copy-on-write splits performed.
    pub cow_splits: u64,
    /// Total faults intercepted by the trap handler.
    pub faults_intercepted: u64,
}

impl Snapshot {
    /// Live mappings at the time of the snapshot.
    pub fn live_pages(&self) -> u64 {
        self.pages_mapped.saturating_sub(self.pages_unmapped)
    }
}

/// Take a snapshot of all counters.
pub fn snapshot() -> Snapshot {
    Snapshot {
        areas_created: AREAS_CREATED.load(Ordering::Relaxed),
        areas_destroyed: AREAS_DESTROYED.load(Ordering::Relaxed),
        pages_mapped: PAGES_MAPPED.load(Ordering::Relaxed),
        pages_unmapped: PAGES_UNMAPPED.load(Ordering::Relaxed),
        cow_splits: COW_SPLITS.load(Ordering::Relaxed),
        faults_intercepted: FAULTS_INTERCEPTED.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_monotonic() {
        let before = snapshot();
        record_page_mapped();
        record_page_mapped();
        record_page_unmapped();
        let after = snapshot();
        // Other tests may record concurrently, so only lower bounds hold.
        assert!(after.pages_mapped - before.pages_mapped >= 2);
        assert!(after.pages_unmapped - before.pages_unmapped >= 1);
    }

    #[test]
    fn test_snapshot_live_pages_saturates() {
        let snap = Snapshot {
            areas_created: 0,
            areas_destroyed: 0,
            pages_mapped: 1,
            pages_unmapped: 3,
            cow_splits: 0,
            faults_intercepted: 0,
        };
        assert_eq!(snap.live_pages(), 0);
    }
}
