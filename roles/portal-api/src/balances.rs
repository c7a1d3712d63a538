//! Pool-grouped balance totals for a wallet address.

use serde::Serialize;
use std::{collections::HashMap, sync::Arc};

use crate::{
    address::normalize_address,
    error::Result,
    ledger::{BalanceRecord, Ledger},
};

/// Round a coin amount to 8 decimal places.
pub fn round_coins(amount: f64) -> f64 {
    (amount * 100_000_000.0).round() / 100_000_000.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedPoolBalance {
    pub name: String,
    pub total_paid: f64,
    pub total_balance: f64,
    pub total_immature: f64,
    pub workers: Vec<WorkerBalance>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerBalance {
    pub name: String,
    pub balance: f64,
    pub paid: f64,
    pub immature: f64,
}

/// Group ledger records by pool, keeping the order in which pools first
/// appear, and round each pool's totals.
pub fn group_by_pool(records: &[BalanceRecord]) -> Vec<AggregatedPoolBalance> {
    let mut pools: Vec<AggregatedPoolBalance> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for record in records {
        let i = *index.entry(record.pool.as_str()).or_insert_with(|| {
            pools.push(AggregatedPoolBalance {
                name: record.pool.clone(),
                total_paid: 0.0,
                total_balance: 0.0,
                total_immature: 0.0,
                workers: Vec::new(),
            });
            pools.len() - 1
        });

        let pool = &mut pools[i];
        pool.total_paid += record.paid;
        pool.total_balance += record.balance;
        pool.total_immature += record.immature;
        pool.workers.push(WorkerBalance {
            name: record.worker.clone(),
            balance: record.balance,
            paid: record.paid,
            immature: record.immature,
        });
    }

    for pool in &mut pools {
        pool.total_paid = round_coins(pool.total_paid);
        pool.total_balance = round_coins(pool.total_balance);
        pool.total_immature = round_coins(pool.total_immature);
    }

    pools
}

pub struct PoolBalanceAggregator {
    ledger: Arc<dyn Ledger>,
}

impl PoolBalanceAggregator {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    pub async fn compute_pool_balances(&self, address: &str) -> Result<Vec<AggregatedPoolBalance>> {
        let address = normalize_address(address)?;
        let records = self.ledger.pool_balances_by_address(address).await?;
        Ok(group_by_pool(&records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{ApiError, QueryError},
        ledger::InMemoryLedger,
    };

    fn record(pool: &str, worker: &str, paid: f64, balance: f64, immature: f64) -> BalanceRecord {
        BalanceRecord {
            pool: pool.to_string(),
            worker: worker.to_string(),
            paid,
            balance,
            immature,
        }
    }

    #[test]
    fn test_round_coins() {
        assert_eq!(round_coins(0.1 + 0.2), 0.3);
        assert_eq!(round_coins(1.123456789), 1.12345679);
        assert_eq!(round_coins(0.0), 0.0);
    }

    #[test]
    fn test_group_by_pool_keeps_first_seen_order() {
        let records = vec![
            record("zclassic", "t1abc.rig1", 1.0, 0.5, 0.0),
            record("bitcoinz", "t1abc.rig1", 0.0, 2.0, 0.0),
            record("zclassic", "t1abc.rig2", 0.25, 0.5, 0.1),
        ];

        let pools = group_by_pool(&records);
        let names: Vec<&str> = pools.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["zclassic", "bitcoinz"]);

        let zcl = &pools[0];
        assert_eq!(zcl.total_paid, 1.25);
        assert_eq!(zcl.total_balance, 1.0);
        assert_eq!(zcl.total_immature, 0.1);
        assert_eq!(zcl.workers.len(), 2);
        assert_eq!(zcl.workers[1].name, "t1abc.rig2");
    }

    #[test]
    fn test_worker_balances_sum_to_total() {
        let records: Vec<BalanceRecord> = (0..7)
            .map(|i| record("zclassic", &format!("t1abc.rig{}", i), 0.1 * i as f64, 0.013 * i as f64, 0.3))
            .collect();

        for pool in group_by_pool(&records) {
            let balance: f64 = pool.workers.iter().map(|w| w.balance).sum();
            let paid: f64 = pool.workers.iter().map(|w| w.paid).sum();
            let immature: f64 = pool.workers.iter().map(|w| w.immature).sum();
            assert!((balance - pool.total_balance).abs() <= 1e-8);
            assert!((paid - pool.total_paid).abs() <= 1e-8);
            assert!((immature - pool.total_immature).abs() <= 1e-8);
        }
    }

    #[test]
    fn test_serialized_field_names() {
        let pools = group_by_pool(&[record("zclassic", "t1abc", 1.0, 2.0, 3.0)]);
        let json = serde_json::to_value(&pools).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "name": "zclassic",
                "totalPaid": 1.0,
                "totalBalance": 2.0,
                "totalImmature": 3.0,
                "workers": [{"name": "t1abc", "balance": 2.0, "paid": 1.0, "immature": 3.0}]
            }])
        );
    }

    #[tokio::test]
    async fn test_compute_pool_balances_normalizes_address() {
        let ledger = InMemoryLedger::new()
            .with_record(record("zclassic", "t1abc.rig1", 1.0, 0.5, 0.0))
            .with_record(record("zclassic", "t1xyz.rig1", 9.0, 9.0, 9.0));
        let aggregator = PoolBalanceAggregator::new(Arc::new(ledger));

        let pools = aggregator.compute_pool_balances("t1abc.rig7").await.unwrap();
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].workers.len(), 1);
        assert_eq!(pools[0].total_paid, 1.0);

        let empty = aggregator.compute_pool_balances("t1none").await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_compute_pool_balances_rejects_empty_address() {
        let aggregator = PoolBalanceAggregator::new(Arc::new(InMemoryLedger::new()));
        let err = aggregator.compute_pool_balances("").await.unwrap_err();
        assert!(matches!(err, ApiError::Query(QueryError::InvalidAddress)));
    }
}
