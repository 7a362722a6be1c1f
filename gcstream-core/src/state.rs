use std::sync::atomic::{AtomicU64, Ordering};

/// Total GC time observed since process start.
///
/// Shared by every listener of a collector. Increments are linearizable: each
/// [`add_and_get`](Self::add_and_get) observes the sum of all increments that
/// precede it in a single total order, and no increment is lost.
#[derive(Debug, Default)]
pub struct CumulativeGcState {
    total_gc_duration_ms: AtomicU64,
}

impl CumulativeGcState {
    /// Creates a counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `delta_ms` and returns the new total.
    pub fn add_and_get(&self, delta_ms: u64) -> u64 {
        self.total_gc_duration_ms
            .fetch_add(delta_ms, Ordering::SeqCst)
            .wrapping_add(delta_ms)
    }

    /// The current total.
    pub fn total_gc_duration_ms(&self) -> u64 {
        self.total_gc_duration_ms.load(Ordering::SeqCst)
    }
}
