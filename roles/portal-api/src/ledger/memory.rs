use async_trait::async_trait;

use super::{AddressBalances, BalanceRecord, Ledger};
use crate::error::LedgerError;

/// Ledger backed by fixed in-process data. Used by tests and by embedders
/// that resolve balances elsewhere.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    records: Vec<BalanceRecord>,
    round_shares: Vec<(String, f64)>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, record: BalanceRecord) -> Self {
        self.records.push(record);
        self
    }

    /// Current-round shares credited to `worker`.
    pub fn with_round_shares(mut self, worker: impl Into<String>, shares: f64) -> Self {
        self.round_shares.push((worker.into(), shares));
        self
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn balance_by_address(&self, address: &str) -> Result<AddressBalances, LedgerError> {
        let records = self.pool_balances_by_address(address).await?;
        Ok(AddressBalances::from_records(records))
    }

    async fn total_shares_by_address(&self, address: &str) -> Result<f64, LedgerError> {
        Ok(self
            .round_shares
            .iter()
            .filter(|(worker, _)| worker.starts_with(address))
            .map(|(_, shares)| shares)
            .sum())
    }

    async fn pool_balances_by_address(
        &self,
        address: &str,
    ) -> Result<Vec<BalanceRecord>, LedgerError> {
        Ok(self
            .records
            .iter()
            .filter(|record| record.worker.starts_with(address))
            .cloned()
            .collect())
    }
}
