use stats::Snapshot;
use std::{collections::VecDeque, sync::Arc, time::Duration};
use tokio::time;
use tracing::{debug, error, info};

use crate::{error::PollError, live::LiveBroadcastRegistry, store::SnapshotStore};

#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub stats_url: String,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub pool_idle_timeout_secs: u64,
    pub max_history: usize,
}

/// Pulls snapshots from the upstream stats collector, keeps the bounded
/// history ring, publishes both to the store and pushes every new snapshot
/// to live subscribers.
pub struct UpstreamPoller {
    client: reqwest::Client,
    settings: PollerSettings,
    store: Arc<SnapshotStore>,
    live: Arc<LiveBroadcastRegistry>,
    history: VecDeque<Arc<Snapshot>>,
}

/// Outcome of the previous poll, so each change between success and failure
/// is logged once.
#[derive(Debug, Default)]
struct PollStatus {
    last_success: Option<bool>,
}

impl PollStatus {
    /// Record an outcome. True when it differs from the previous one,
    /// which includes the very first poll.
    fn changed(&mut self, success: bool) -> bool {
        self.last_success.replace(success) != Some(success)
    }
}

impl UpstreamPoller {
    pub fn new(
        settings: PollerSettings,
        store: Arc<SnapshotStore>,
        live: Arc<LiveBroadcastRegistry>,
    ) -> Result<Self, PollError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(settings.pool_idle_timeout_secs))
            .pool_max_idle_per_host(1)
            .build()?;

        Ok(Self {
            client,
            history: VecDeque::with_capacity(settings.max_history),
            settings,
            store,
            live,
        })
    }

    pub async fn run(mut self) {
        let mut interval = time::interval(Duration::from_secs(self.settings.poll_interval_secs));
        let mut status = PollStatus::default();

        loop {
            interval.tick().await;

            match self.poll_once().await {
                Ok(delivered) => {
                    if status.changed(true) {
                        info!("Successfully fetched snapshot from {}", self.settings.stats_url);
                    }
                    debug!("Published snapshot, pushed to {} live subscribers", delivered);
                }
                Err(e) => {
                    if status.changed(false) {
                        error!("{}", e);
                    }
                }
            }
        }
    }

    /// Fetch one snapshot and ingest it.
    pub async fn poll_once(&mut self) -> Result<usize, PollError> {
        let snapshot = self
            .client
            .get(&self.settings.stats_url)
            .send()
            .await?
            .error_for_status()?
            .json::<Snapshot>()
            .await?;
        self.ingest(snapshot)
    }

    /// Append `snapshot` to the history ring, publish, and broadcast it.
    /// Returns the number of live subscribers reached.
    pub fn ingest(&mut self, snapshot: Snapshot) -> Result<usize, PollError> {
        let snapshot = Arc::new(snapshot);
        self.history.push_back(snapshot.clone());
        while self.history.len() > self.settings.max_history {
            self.history.pop_front();
        }

        let generation = self
            .store
            .publish(snapshot, self.history.iter().cloned().collect())?;
        Ok(self.live.broadcast(&generation.stats_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    fn settings(stats_url: String, max_history: usize) -> PollerSettings {
        PollerSettings {
            stats_url,
            poll_interval_secs: 1,
            request_timeout_secs: 5,
            pool_idle_timeout_secs: 5,
            max_history,
        }
    }

    fn snapshot_at(time: u64) -> Snapshot {
        Snapshot {
            time,
            ..Default::default()
        }
    }

    #[test]
    fn test_ingest_bounds_history() {
        let store = Arc::new(SnapshotStore::new());
        let live = LiveBroadcastRegistry::new();
        let mut poller =
            UpstreamPoller::new(settings("http://127.0.0.1:1/".to_string(), 2), store.clone(), live)
                .unwrap();

        for time in 1..=3 {
            poller.ingest(snapshot_at(time)).unwrap();
        }

        let generation = store.load();
        assert_eq!(generation.snapshot.time, 3);
        let times: Vec<u64> = generation.history.iter().map(|s| s.time).collect();
        assert_eq!(times, vec![2, 3]);
    }

    #[test]
    fn test_generations_share_history_snapshots() {
        let store = Arc::new(SnapshotStore::new());
        let mut poller = UpstreamPoller::new(
            settings("http://127.0.0.1:1/".to_string(), 10),
            store.clone(),
            LiveBroadcastRegistry::new(),
        )
        .unwrap();

        poller.ingest(snapshot_at(1)).unwrap();
        let first = store.load();
        poller.ingest(snapshot_at(2)).unwrap();
        let second = store.load();

        assert!(Arc::ptr_eq(&first.snapshot, &second.history[0]));
        assert!(Arc::ptr_eq(&second.snapshot, &second.history[1]));
    }

    #[test]
    fn test_poll_status_reports_transitions() {
        let mut status = PollStatus::default();
        // Upstream down from the start
        assert!(status.changed(false));
        assert!(!status.changed(false));
        assert!(status.changed(true));
        assert!(!status.changed(true));
        assert!(status.changed(false));
    }

    #[test]
    fn test_ingest_broadcasts_to_subscribers() {
        let store = Arc::new(SnapshotStore::new());
        let live = LiveBroadcastRegistry::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        live.subscribe(tx);

        let mut poller =
            UpstreamPoller::new(settings("http://127.0.0.1:1/".to_string(), 10), store, live).unwrap();
        assert_eq!(poller.ingest(snapshot_at(5)).unwrap(), 1);

        assert_eq!(&rx.try_recv().unwrap()[..], b"\n");
        assert_eq!(&rx.try_recv().unwrap()[..], b"data: {\"time\":5,\"pools\":{}}\n\n");
    }

    #[tokio::test]
    async fn test_poll_once_fetches_snapshot() {
        // Start a mock HTTP server
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server_task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]);
            assert!(request.starts_with("GET /api/stats"));

            let body = r#"{"time":77,"pools":{"zclassic":{"workers":{"t1abc":{"hashrate":1.5}}}}}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });

        let store = Arc::new(SnapshotStore::new());
        let mut poller = UpstreamPoller::new(
            settings(format!("http://{}/api/stats", addr), 10),
            store.clone(),
            LiveBroadcastRegistry::new(),
        )
        .unwrap();

        poller.poll_once().await.unwrap();
        server_task.await.unwrap();

        let generation = store.load();
        assert_eq!(generation.snapshot.time, 77);
        assert_eq!(generation.history.len(), 1);
        assert_eq!(
            generation.snapshot.pools["zclassic"].workers["t1abc"].hashrate,
            Some(1.5)
        );
    }

    #[tokio::test]
    async fn test_poll_once_reports_unreachable_upstream() {
        let mut poller = UpstreamPoller::new(
            settings("http://127.0.0.1:1/api/stats".to_string(), 10),
            Arc::new(SnapshotStore::new()),
            LiveBroadcastRegistry::new(),
        )
        .unwrap();

        assert!(matches!(poller.poll_once().await, Err(PollError::Fetch(_))));
    }
}
