//! Method-name routing for the portal API.

use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::{
    address::parse_query_address,
    balances::PoolBalanceAggregator,
    error::{ApiError, Result},
    ledger::Ledger,
    live::{LiveBroadcastRegistry, LiveFeed},
    miner::AddressAggregator,
    store::SnapshotStore,
};

/// What a handled method produces.
pub enum Reply {
    /// A complete `application/json` body
    Json(String),
    /// A `text/event-stream` body fed by a live subscription
    EventStream(LiveFeed),
}

#[derive(Serialize)]
struct PoolPayments<'a> {
    name: &'a str,
    pending: &'a Value,
    payments: &'a Value,
}

pub struct RequestDispatcher {
    store: Arc<SnapshotStore>,
    miners: AddressAggregator,
    balances: PoolBalanceAggregator,
    live: Arc<LiveBroadcastRegistry>,
    pool_configs: Value,
}

impl RequestDispatcher {
    pub fn new(
        store: Arc<SnapshotStore>,
        ledger: Arc<dyn Ledger>,
        live: Arc<LiveBroadcastRegistry>,
        pool_configs: Value,
    ) -> Self {
        Self {
            miners: AddressAggregator::new(store.clone(), ledger.clone()),
            balances: PoolBalanceAggregator::new(ledger),
            store,
            live,
            pool_configs,
        }
    }

    /// Handle a public API method. `Ok(None)` means the method is not one of
    /// ours and the caller's fallback should run.
    pub async fn handle(&self, method: &str, query: Option<&str>) -> Result<Option<Reply>> {
        debug!("API request: method={} query={:?}", method, query);

        let reply = match method {
            "stats" => Reply::Json(self.store.load().stats_string.clone()),
            "pool_stats" => Reply::Json(serde_json::to_string(&self.store.load().history)?),
            "blocks" | "worker_balances" => Reply::Json(self.worker_balances(query).await?),
            "payments" => Reply::Json(self.payments()?),
            "worker_stats" => Reply::Json(self.worker_stats(query).await?),
            "live_stats" => Reply::EventStream(self.live.open()),
            _ => return Ok(None),
        };
        Ok(Some(reply))
    }

    /// Handle a method on the admin entry point.
    pub fn handle_admin(&self, method: &str) -> Option<Reply> {
        match method {
            "pools" => Some(Reply::Json(json!({ "result": self.pool_configs }).to_string())),
            _ => None,
        }
    }

    async fn worker_balances(&self, query: Option<&str>) -> Result<String> {
        let result = match parse_query_address(query) {
            Ok(address) => self.balances.compute_pool_balances(address).await,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(pools) => Ok(serde_json::to_string(&pools)?),
            Err(ApiError::Query(e)) => {
                Ok(json!({ "result": "error", "message": e.to_string() }).to_string())
            }
            Err(e) => Err(e),
        }
    }

    async fn worker_stats(&self, query: Option<&str>) -> Result<String> {
        let result = match parse_query_address(query) {
            Ok(address) => self.miners.compute_miner_view(address).await,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(view) => Ok(serde_json::to_string(&view)?),
            Err(ApiError::Query(_)) => Ok(json!({ "result": "error" }).to_string()),
            Err(e) => Err(e),
        }
    }

    fn payments(&self) -> Result<String> {
        let generation = self.store.load();
        let pools: Vec<PoolPayments<'_>> = generation
            .snapshot
            .pools
            .iter()
            .map(|(name, pool)| PoolPayments {
                name: name.as_str(),
                pending: &pool.pending,
                payments: &pool.payments,
            })
            .collect();
        Ok(serde_json::to_string(&pools)?)
    }
}
