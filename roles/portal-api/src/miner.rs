//! Per-address miner view: live worker stats merged with ledger balances,
//! plus each worker's hashrate history.

use serde::Serialize;
use stats::WorkerStats;
use std::{collections::BTreeMap, sync::Arc};

use crate::{
    address::normalize_address,
    error::Result,
    ledger::{AddressBalances, Ledger},
    store::{SnapshotStore, StatsGeneration},
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HashrateSample {
    pub time: u64,
    pub hashrate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinerView {
    pub miner: String,
    pub total_hash: f64,
    pub total_shares: f64,
    pub network_sols: f64,
    pub immature: f64,
    pub balance: f64,
    pub paid: f64,
    pub workers: BTreeMap<String, WorkerStats>,
    pub history: BTreeMap<String, Vec<HashrateSample>>,
}

/// Build the view for `address` from one published generation and the
/// ledger answers for that address.
pub fn build_miner_view(
    address: &str,
    generation: &StatsGeneration,
    balances: &AddressBalances,
    total_shares: f64,
) -> MinerView {
    let mut history: BTreeMap<String, Vec<HashrateSample>> = BTreeMap::new();
    for past in &generation.history {
        for (_, _, key, worker) in past.workers_of(address) {
            if let Some(hashrate) = worker.hashrate {
                history.entry(key.to_string()).or_default().push(HashrateSample {
                    time: past.time,
                    hashrate,
                });
            }
        }
    }

    let mut workers = BTreeMap::new();
    let mut total_hash = 0.0;
    let mut network_sols = 0.0;
    for (_, pool, key, live) in generation.snapshot.workers_of(address) {
        let mut worker = live.clone();
        // Last matching record wins
        for record in balances.balances.iter().filter(|r| r.worker == key) {
            worker.paid = Some(record.paid);
            worker.balance = Some(record.balance);
        }
        worker.balance.get_or_insert(0.0);
        worker.paid.get_or_insert(0.0);

        total_hash += live.hashrate.unwrap_or(0.0);
        // Overwritten per matching worker, so the last pool iterated wins
        network_sols = pool.pool_stats.network_sols;
        workers.insert(key.to_string(), worker);
    }

    MinerView {
        miner: address.to_string(),
        total_hash,
        total_shares,
        network_sols,
        immature: balances.total_immature,
        balance: balances.total_held,
        paid: balances.total_paid,
        workers,
        history,
    }
}

pub struct AddressAggregator {
    store: Arc<SnapshotStore>,
    ledger: Arc<dyn Ledger>,
}

impl AddressAggregator {
    pub fn new(store: Arc<SnapshotStore>, ledger: Arc<dyn Ledger>) -> Self {
        Self { store, ledger }
    }

    pub async fn compute_miner_view(&self, address: &str) -> Result<MinerView> {
        let address = normalize_address(address)?;

        let (balances, total_shares) = tokio::try_join!(
            self.ledger.balance_by_address(address),
            self.ledger.total_shares_by_address(address),
        )?;

        let generation = self.store.load();
        Ok(build_miner_view(address, &generation, &balances, total_shares))
    }
}
