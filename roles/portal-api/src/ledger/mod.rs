//! Ledger lookups: per-address balances, payouts, immature amounts and
//! current-round shares, as recorded by the payment processor.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{balances::round_coins, error::LedgerError};

pub mod memory;
pub mod redis;

pub use memory::InMemoryLedger;
pub use redis::RedisLedger;

/// Ledger amounts for one (pool, worker) pair, in coins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub pool: String,
    pub worker: String,
    pub paid: f64,
    pub balance: f64,
    pub immature: f64,
}

/// Address-level ledger totals plus the records they were summed from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddressBalances {
    pub total_held: f64,
    pub total_paid: f64,
    pub total_immature: f64,
    pub balances: Vec<BalanceRecord>,
}

impl AddressBalances {
    pub fn from_records(balances: Vec<BalanceRecord>) -> Self {
        let (held, paid, immature) = balances.iter().fold((0.0, 0.0, 0.0), |acc, record| {
            (
                acc.0 + record.balance,
                acc.1 + record.paid,
                acc.2 + record.immature,
            )
        });
        Self {
            total_held: round_coins(held),
            total_paid: round_coins(paid),
            total_immature: round_coins(immature),
            balances,
        }
    }
}

/// Read-only view of the payment ledger.
///
/// `address` is always a normalized wallet address; implementations match
/// every worker key that starts with it.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Address totals and per-worker records across all pools.
    async fn balance_by_address(&self, address: &str) -> Result<AddressBalances, LedgerError>;

    /// Shares the address has submitted in the current round, across all pools.
    async fn total_shares_by_address(&self, address: &str) -> Result<f64, LedgerError>;

    /// Raw per-(pool, worker) records for the address.
    async fn pool_balances_by_address(
        &self,
        address: &str,
    ) -> Result<Vec<BalanceRecord>, LedgerError>;
}
