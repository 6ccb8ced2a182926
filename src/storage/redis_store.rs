// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Redis backend for the ephemeral store.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::ephemeral::{EphemeralStore, KeyTtl, StoreResult};

/// Keys requested per SCAN round trip.
const SCAN_BATCH: usize = 200;

/// Redis store over a multiplexed, auto-reconnecting connection.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connect to `redis://` / `rediss://` URL.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self { manager })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl EphemeralStore for RedisStore {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn();
        Ok(conn.get::<_, Option<String>>(key).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        let mut conn = self.conn();
        match ttl {
            Some(ttl) => conn.set_ex::<_, _, ()>(key, value, ttl_secs(ttl)).await?,
            None => conn.set::<_, _, ()>(key, value).await?,
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn();
        let removed = conn.del::<_, i64>(key).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn();
        Ok(conn.exists::<_, bool>(key).await?)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn();
        Ok(conn
            .expire::<_, bool>(key, ttl_secs(ttl) as i64)
            .await?)
    }

    async fn persist(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn();
        // PERSIST answers 0 both for missing keys and keys without a TTL.
        let (exists, _cleared) = redis::pipe()
            .atomic()
            .exists(key)
            .persist(key)
            .query_async::<_, (bool, bool)>(&mut conn)
            .await?;
        Ok(exists)
    }

    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl> {
        let mut conn = self.conn();
        let millis = conn.pttl::<_, i64>(key).await?;
        Ok(match millis {
            -2 => KeyTtl::Missing,
            -1 => KeyTtl::Persistent,
            ms => KeyTtl::Expires(Duration::from_millis(ms.max(0) as u64)),
        })
    }

    async fn push_front(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> StoreResult<usize> {
        let mut conn = self.conn();
        match ttl {
            Some(ttl) => {
                let replies = redis::pipe()
                    .atomic()
                    .lpush(key, value)
                    .expire(key, ttl_secs(ttl) as i64)
                    .ignore()
                    .query_async::<_, Vec<usize>>(&mut conn)
                    .await?;
                Ok(replies.first().copied().unwrap_or(0))
            }
            None => Ok(conn.lpush::<_, _, usize>(key, value).await?),
        }
    }

    async fn list(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn();
        Ok(conn.lrange::<_, Vec<String>>(key, 0, -1).await?)
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn();
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}
