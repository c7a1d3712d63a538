use portal_redis::RedisClient;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber;

use portal_api::{
    api::{run_http_server, ApiState},
    config::Config,
    ledger::RedisLedger,
    LiveBroadcastRegistry, RequestDispatcher, SnapshotStore, UpstreamPoller,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_args()?;

    // Setup tracing with optional file output
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt().with_env_filter(env_filter);

    if let Some(log_file) = &config.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .map_err(|e| format!("Failed to open log file {}: {}", log_file, e))?;
        fmt_layer.with_writer(Arc::new(file)).init();
    } else {
        fmt_layer.init();
    }

    info!("Starting portal-api service");
    info!("Upstream stats URL: {}", config.poller.stats_url);
    info!("Listen address: {}", config.listen_address);
    info!(
        "Polling interval: {} seconds, keeping {} snapshots of history",
        config.poller.poll_interval_secs, config.poller.max_history
    );

    let store = Arc::new(SnapshotStore::new());
    let live = LiveBroadcastRegistry::new();

    let redis = RedisClient::new(&config.redis_url)
        .await
        .map_err(|e| format!("Failed to connect to Redis at {}: {}", config.redis_url, e))?;
    info!("Connected to Redis at {}", config.redis_url);
    let ledger = Arc::new(RedisLedger::new(redis, store.clone()));

    let dispatcher = Arc::new(RequestDispatcher::new(
        store.clone(),
        ledger,
        live.clone(),
        config.pool_configs,
    ));

    let poller = UpstreamPoller::new(config.poller, store.clone(), live)?;
    tokio::spawn(poller.run());

    run_http_server(
        config.listen_address,
        ApiState {
            dispatcher,
            store,
            staleness_threshold_secs: config.staleness_threshold_secs,
        },
    )
    .await?;

    Ok(())
}
