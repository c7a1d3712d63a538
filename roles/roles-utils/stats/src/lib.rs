pub mod snapshot;

// Re-export snapshot types
pub use snapshot::{PoolStats, PoolSummary, Snapshot, WorkerStats};
