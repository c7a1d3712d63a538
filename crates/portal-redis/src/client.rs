use redis::{aio::ConnectionManager, Client};
use std::collections::HashSet;
use tracing::debug;

use crate::error::RedisError;

/// Page size hint passed to HSCAN.
const SCAN_COUNT: u64 = 1000;

pub struct RedisClient {
    manager: ConnectionManager,
}

impl RedisClient {
    pub async fn new(redis_url: &str) -> Result<Self, RedisError> {
        let client = Client::open(redis_url)
            .map_err(|e| RedisError::ConnectionError(e.to_string()))?;

        let manager = ConnectionManager::new(client).await
            .map_err(|e| RedisError::ConnectionError(e.to_string()))?;

        Ok(Self { manager })
    }

    /// Walk a hash with `HSCAN ... MATCH pattern` until the cursor wraps and
    /// return the matching `(field, value)` pairs in scan order.
    ///
    /// HSCAN may report a field more than once while the hash is being
    /// rehashed; only the first occurrence is kept.
    pub async fn hscan_match(
        &self,
        key: &str,
        pattern: &str,
    ) -> Result<Vec<(String, String)>, RedisError> {
        let mut conn = self.manager.clone();
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        let mut cursor = 0u64;

        loop {
            let (next, flat): (u64, Vec<String>) = redis::cmd("HSCAN")
                .arg(key)
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await?;

            if flat.len() % 2 != 0 {
                return Err(RedisError::InvalidDataFormat(format!(
                    "HSCAN on {} returned an odd number of items",
                    key
                )));
            }

            let mut items = flat.into_iter();
            while let (Some(field), Some(value)) = (items.next(), items.next()) {
                if seen.insert(field.clone()) {
                    entries.push((field, value));
                }
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!("HSCAN {} MATCH {} -> {} entries", key, pattern, entries.len());
        Ok(entries)
    }

    pub async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), RedisError> {
        redis::cmd("HSET")
            .arg(key)
            .arg(field)
            .arg(value)
            .query_async::<_, ()>(&mut self.manager.clone())
            .await
            .map_err(RedisError::from)
    }

    pub async fn delete(&self, key: &str) -> Result<(), RedisError> {
        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, ()>(&mut self.manager.clone())
            .await
            .map_err(RedisError::from)
    }
}
