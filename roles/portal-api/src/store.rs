use parking_lot::RwLock;
use stats::Snapshot;
use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

/// One published state of the collector: the current snapshot, the history
/// ring it was published with, and the snapshot pre-serialized for `stats`.
///
/// Generations are immutable once published.
#[derive(Debug)]
pub struct StatsGeneration {
    pub snapshot: Arc<Snapshot>,
    pub history: Vec<Arc<Snapshot>>,
    pub stats_string: String,
}

impl StatsGeneration {
    fn new(snapshot: Arc<Snapshot>, history: Vec<Arc<Snapshot>>) -> Result<Self, serde_json::Error> {
        let stats_string = serde_json::to_string(&*snapshot)?;
        Ok(Self {
            snapshot,
            history,
            stats_string,
        })
    }
}

/// In-memory holder of the latest published generation.
///
/// The collector replaces the whole generation at once, so a reader either
/// sees the previous generation or the new one, never a mix. The lock is only
/// held long enough to clone or swap the `Arc`.
pub struct SnapshotStore {
    current: RwLock<Arc<StatsGeneration>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        let empty = StatsGeneration {
            snapshot: Arc::new(Snapshot::default()),
            history: Vec::new(),
            stats_string: r#"{"time":0,"pools":{}}"#.to_string(),
        };
        Self {
            current: RwLock::new(Arc::new(empty)),
        }
    }

    /// Publish a new snapshot together with the history ring that goes with it.
    /// Snapshots are shared with earlier generations, not copied.
    pub fn publish(
        &self,
        snapshot: Arc<Snapshot>,
        history: Vec<Arc<Snapshot>>,
    ) -> Result<Arc<StatsGeneration>, serde_json::Error> {
        let generation = Arc::new(StatsGeneration::new(snapshot, history)?);
        *self.current.write() = generation.clone();
        Ok(generation)
    }

    /// Latest generation. Holding the returned `Arc` keeps it alive across
    /// later publishes.
    pub fn load(&self) -> Arc<StatsGeneration> {
        self.current.read().clone()
    }

    /// Whether the current snapshot is older than `threshold_secs`. Nothing
    /// published yet counts as stale.
    pub fn is_stale(&self, threshold_secs: u64) -> bool {
        let time = self.load().snapshot.time;
        if time == 0 {
            return true;
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        now.saturating_sub(time) > threshold_secs
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
