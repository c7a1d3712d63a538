use async_trait::async_trait;
use futures::future::try_join_all;
use portal_redis::RedisClient;
use std::{collections::HashMap, sync::Arc};
use tracing::debug;

use super::{AddressBalances, BalanceRecord, Ledger};
use crate::{error::LedgerError, store::SnapshotStore};

/// Immature amounts are stored in satoshis, everything else in coins.
const SATOSHIS_PER_COIN: f64 = 100_000_000.0;

/// Ledger reading the per-coin hashes the payment processor keeps in Redis:
/// `<coin>:balances`, `<coin>:payouts`, `<coin>:immature` and
/// `<coin>:shares:roundCurrent`, each keyed by worker.
///
/// The coins scanned are the pools of the currently published snapshot.
pub struct RedisLedger {
    client: RedisClient,
    store: Arc<SnapshotStore>,
}

impl RedisLedger {
    pub fn new(client: RedisClient, store: Arc<SnapshotStore>) -> Self {
        Self { client, store }
    }

    fn coins(&self) -> Vec<String> {
        self.store.load().snapshot.pools.keys().cloned().collect()
    }

    async fn scan_amounts(&self, key: &str, address: &str) -> Result<Vec<(String, f64)>, LedgerError> {
        let pattern = format!("{}*", escape_glob(address));
        self.client
            .hscan_match(key, &pattern)
            .await?
            .into_iter()
            .map(|(worker, value)| parse_amount(key, &value).map(|amount| (worker, amount)))
            .collect()
    }

    async fn coin_records(&self, coin: &str, address: &str) -> Result<Vec<BalanceRecord>, LedgerError> {
        let payouts_key = format!("{}:payouts", coin);
        let balances_key = format!("{}:balances", coin);
        let immature_key = format!("{}:immature", coin);

        let (payouts, balances, immature) = tokio::try_join!(
            self.scan_amounts(&payouts_key, address),
            self.scan_amounts(&balances_key, address),
            self.scan_amounts(&immature_key, address),
        )?;

        let mut records = Vec::new();
        let mut index = HashMap::new();
        for (worker, paid) in payouts {
            record_for(&mut records, &mut index, coin, worker).paid = paid;
        }
        for (worker, balance) in balances {
            record_for(&mut records, &mut index, coin, worker).balance = balance;
        }
        for (worker, satoshis) in immature {
            record_for(&mut records, &mut index, coin, worker).immature = satoshis / SATOSHIS_PER_COIN;
        }

        debug!("Ledger {} records for {} on {}", records.len(), address, coin);
        Ok(records)
    }
}

#[async_trait]
impl Ledger for RedisLedger {
    async fn balance_by_address(&self, address: &str) -> Result<AddressBalances, LedgerError> {
        let records = self.pool_balances_by_address(address).await?;
        Ok(AddressBalances::from_records(records))
    }

    async fn total_shares_by_address(&self, address: &str) -> Result<f64, LedgerError> {
        let keys: Vec<String> = self
            .coins()
            .iter()
            .map(|coin| format!("{}:shares:roundCurrent", coin))
            .collect();
        let per_coin = try_join_all(keys.iter().map(|key| self.scan_amounts(key, address))).await?;

        Ok(per_coin
            .into_iter()
            .flatten()
            .map(|(_, shares)| shares)
            .sum())
    }

    async fn pool_balances_by_address(
        &self,
        address: &str,
    ) -> Result<Vec<BalanceRecord>, LedgerError> {
        let coins = self.coins();
        let per_coin = try_join_all(coins.iter().map(|coin| self.coin_records(coin, address))).await?;
        Ok(per_coin.into_iter().flatten().collect())
    }
}

/// Record for `worker`, appended in first-seen order if not there yet.
fn record_for<'a>(
    records: &'a mut Vec<BalanceRecord>,
    index: &mut HashMap<String, usize>,
    coin: &str,
    worker: String,
) -> &'a mut BalanceRecord {
    let i = match index.get(&worker) {
        Some(&i) => i,
        None => {
            index.insert(worker.clone(), records.len());
            records.push(BalanceRecord {
                pool: coin.to_string(),
                worker,
                paid: 0.0,
                balance: 0.0,
                immature: 0.0,
            });
            records.len() - 1
        }
    };
    &mut records[i]
}

fn parse_amount(key: &str, value: &str) -> Result<f64, LedgerError> {
    value.trim().parse::<f64>().map_err(|_| LedgerError::InvalidAmount {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Escape the characters Redis treats specially in a MATCH pattern.
fn escape_glob(address: &str) -> String {
    let mut escaped = String::with_capacity(address.len());
    for c in address.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use stats::{PoolStats, Snapshot};

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("t1abc"), "t1abc");
        assert_eq!(escape_glob("a*b?[c]"), "a\\*b\\?\\[c\\]");
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("k", "1.25").unwrap(), 1.25);
        assert_eq!(parse_amount("k", " 3 ").unwrap(), 3.0);
        assert!(matches!(
            parse_amount("zclassic:balances", "abc"),
            Err(LedgerError::InvalidAmount { .. })
        ));
    }

    #[tokio::test]
    async fn test_redis_ledger_reads_coin_hashes() {
        let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());

        // Try to connect to Redis, skip test if not available
        let client = match RedisClient::new(&redis_url).await {
            Ok(client) => client,
            Err(e) => {
                println!("Skipping Redis tests: {}", e);
                return;
            }
        };

        let coin = "portal_ledger_test";
        for suffix in ["balances", "payouts", "immature", "shares:roundCurrent"] {
            client.delete(&format!("{}:{}", coin, suffix)).await.unwrap();
        }
        client.hset(&format!("{}:payouts", coin), "t1abc.rig1", "2.5").await.unwrap();
        client.hset(&format!("{}:balances", coin), "t1abc.rig1", "0.75").await.unwrap();
        client.hset(&format!("{}:balances", coin), "t1abc.rig2", "0.25").await.unwrap();
        client.hset(&format!("{}:immature", coin), "t1abc.rig2", "150000000").await.unwrap();
        client.hset(&format!("{}:balances", coin), "t1other", "9").await.unwrap();
        client.hset(&format!("{}:shares:roundCurrent", coin), "t1abc.rig1", "40").await.unwrap();
        client.hset(&format!("{}:shares:roundCurrent", coin), "t1abc.rig2", "2").await.unwrap();

        let mut snapshot = Snapshot::default();
        snapshot.pools.insert(coin.to_string(), PoolStats::default());
        let store = Arc::new(SnapshotStore::new());
        store.publish(Arc::new(snapshot), Vec::new()).unwrap();

        let ledger = RedisLedger::new(client, store);

        let balances = ledger.balance_by_address("t1abc").await.unwrap();
        assert_eq!(balances.balances.len(), 2);
        assert_eq!(balances.total_paid, 2.5);
        assert_eq!(balances.total_held, 1.0);
        assert_eq!(balances.total_immature, 1.5);

        let rig1 = balances.balances.iter().find(|r| r.worker == "t1abc.rig1").unwrap();
        assert_eq!(rig1.pool, coin);
        assert_eq!(rig1.immature, 0.0);

        assert_eq!(ledger.total_shares_by_address("t1abc").await.unwrap(), 42.0);
    }
}
