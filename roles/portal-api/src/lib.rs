pub mod address;
pub mod api;
pub mod balances;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod ledger;
pub mod live;
pub mod miner;
pub mod poller;
pub mod store;

pub use address::{normalize_address, parse_query_address};
pub use api::{run_http_server, serve, ApiState};
pub use balances::{AggregatedPoolBalance, PoolBalanceAggregator, WorkerBalance};
pub use dispatcher::{Reply, RequestDispatcher};
pub use error::{ApiError, LedgerError, PollError, QueryError};
pub use ledger::{AddressBalances, BalanceRecord, InMemoryLedger, Ledger, RedisLedger};
pub use live::{LiveBroadcastRegistry, LiveFeed};
pub use miner::{AddressAggregator, MinerView};
pub use poller::{PollerSettings, UpstreamPoller};
pub use store::{SnapshotStore, StatsGeneration};
