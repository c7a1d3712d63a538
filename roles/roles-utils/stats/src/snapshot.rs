//! Snapshot types produced by the stats collector.
//!
//! Only the fields the portal reads are typed. Everything else the collector
//! emits is kept in `extra` so a snapshot re-serializes without loss.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One point-in-time view of every pool's aggregate and per-worker stats.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unix timestamp (seconds) at which the collector built this snapshot
    pub time: u64,
    #[serde(default)]
    pub pools: BTreeMap<String, PoolStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolStats {
    #[serde(rename = "poolStats", default)]
    pub pool_stats: PoolSummary,
    /// Keyed by worker key (`address` or `address.suffix`)
    #[serde(default)]
    pub workers: BTreeMap<String, WorkerStats>,
    #[serde(default)]
    pub pending: Value,
    #[serde(default)]
    pub payments: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolSummary {
    #[serde(rename = "networkSols", default)]
    pub network_sols: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashrate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Snapshot {
    /// Iterate `(pool name, pool, worker key, worker)` for every worker whose
    /// key starts with `address`, pools and workers in key order.
    pub fn workers_of<'a>(
        &'a self,
        address: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a PoolStats, &'a str, &'a WorkerStats)> + 'a {
        self.pools.iter().flat_map(move |(pool_name, pool)| {
            pool.workers
                .iter()
                .filter(move |(key, _)| key.starts_with(address))
                .map(move |(key, worker)| (pool_name.as_str(), pool, key.as_str(), worker))
        })
    }
}
