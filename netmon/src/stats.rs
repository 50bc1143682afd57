//! Per-worker shutdown counters (spec.md §7 "statistics counters at
//! shutdown report packets received and packets dropped by kernel").

#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerStats {
    pub received: u64,
    pub kernel_dropped: u64,
    pub malformed: u64,
    pub capacity_refused: u64,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_summary(&self, worker_id: &str) {
        log::info!(
            "worker {worker_id} shutdown: received={} kernel_dropped={} malformed={} capacity_refused={}",
            self.received,
            self.kernel_dropped,
            self.malformed,
            self.capacity_refused,
        );
    }
}
