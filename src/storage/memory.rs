// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process ephemeral store.
//!
//! Expired keys are invisible to every read as soon as their deadline passes;
//! the sweeper only reclaims memory. Deadlines use `tokio::time::Instant`, so
//! tests can drive expiry with a paused clock.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::ephemeral::{EphemeralStore, KeyTtl, StoreError, StoreResult};

/// How often the sweeper drops expired entries.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

enum Value {
    Text(String),
    List(VecDeque<String>),
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// In-process [`EphemeralStore`](super::EphemeralStore).
///
/// Expired keys are hidden on access and reclaimed by
/// [`run_sweeper`](Self::run_sweeper). Contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lock and drop `key` first if its deadline has passed.
    fn lock_live(&self, key: &str) -> MutexGuard<'_, HashMap<String, Entry>> {
        let mut entries = self.lock();
        let now = Instant::now();
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
        }
        entries
    }

    /// Remove every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Entries currently held, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Periodically purge expired entries until `shutdown` fires.
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        tracing::info!(interval_secs = interval.as_secs(), "Memory store sweeper started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Memory store sweeper shutting down");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    let purged = self.purge_expired();
                    if purged > 0 {
                        tracing::debug!(purged, "Purged expired keys");
                    }
                }
            }
        }
    }
}

fn deadline(ttl: Option<Duration>) -> Option<Instant> {
    ttl.map(|ttl| Instant::now() + ttl)
}

#[async_trait]
impl EphemeralStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let entries = self.lock_live(key);
        match entries.get(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Text(text),
                ..
            }) => Ok(Some(text.clone())),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        self.lock().insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: deadline(ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        Ok(self.lock_live(key).remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.lock_live(key).contains_key(key))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut entries = self.lock_live(key);
        match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = deadline(Some(ttl));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn persist(&self, key: &str) -> StoreResult<bool> {
        let mut entries = self.lock_live(key);
        match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl> {
        let entries = self.lock_live(key);
        Ok(match entries.get(key) {
            None => KeyTtl::Missing,
            Some(Entry {
                expires_at: None, ..
            }) => KeyTtl::Persistent,
            Some(Entry {
                expires_at: Some(deadline),
                ..
            }) => KeyTtl::Expires(deadline.saturating_duration_since(Instant::now())),
        })
    }

    async fn push_front(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> StoreResult<usize> {
        let mut entries = self.lock_live(key);
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::List(VecDeque::new()),
            expires_at: None,
        });
        let Value::List(list) = &mut entry.value else {
            return Err(StoreError::WrongType(key.to_string()));
        };
        list.push_front(value.to_string());
        let len = list.len();
        if ttl.is_some() {
            entry.expires_at = deadline(ttl);
        }
        Ok(len)
    }

    async fn list(&self, key: &str) -> StoreResult<Vec<String>> {
        let entries = self.lock_live(key);
        match entries.get(key) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: Value::List(list),
                ..
            }) => Ok(list.iter().cloned().collect()),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let now = Instant::now();
        let entries = self.lock();
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete() {
        let store = MemoryStore::new();
        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(store.exists("k").await.unwrap());
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_vanish_after_ttl() {
        let store = MemoryStore::new();
        store
            .set("k", "v", Some(Duration::from_secs(10)))
            .await
            .unwrap();
        assert!(matches!(store.ttl("k").await.unwrap(), KeyTtl::Expires(_)));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.ttl("k").await.unwrap(), KeyTtl::Missing);
    }

    #[tokio::test(start_paused = true)]
    async fn persist_clears_expiry() {
        let store = MemoryStore::new();
        store
            .set("k", "v", Some(Duration::from_secs(10)))
            .await
            .unwrap();
        assert!(store.persist("k").await.unwrap());
        assert_eq!(store.ttl("k").await.unwrap(), KeyTtl::Persistent);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(store.exists("k").await.unwrap());
        assert!(!store.persist("missing").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn push_front_refreshes_ttl_only_when_given() {
        let store = MemoryStore::new();
        store
            .push_front("l", "a", Some(Duration::from_secs(10)))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        let len = store
            .push_front("l", "b", Some(Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(len, 2);

        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(store.list("l").await.unwrap(), vec!["b", "a"]);

        store.persist("l").await.unwrap();
        store.push_front("l", "c", None).await.unwrap();
        assert_eq!(store.ttl("l").await.unwrap(), KeyTtl::Persistent);
    }

    #[tokio::test]
    async fn wrong_type_is_reported() {
        let store = MemoryStore::new();
        store.set("k", "v", None).await.unwrap();
        assert!(matches!(
            store.push_front("k", "x", None).await,
            Err(StoreError::WrongType(_))
        ));
        store.push_front("l", "x", None).await.unwrap();
        assert!(matches!(store.get("l").await, Err(StoreError::WrongType(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn scan_skips_expired_keys() {
        let store = MemoryStore::new();
        store.set("inbox:a", "1", None).await.unwrap();
        store
            .set("inbox:b", "1", Some(Duration::from_secs(5)))
            .await
            .unwrap();
        store.set("settings:a", "1", None).await.unwrap();

        assert_eq!(
            store.scan_prefix("inbox:").await.unwrap(),
            vec!["inbox:a", "inbox:b"]
        );
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.scan_prefix("inbox:").await.unwrap(), vec!["inbox:a"]);

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_stops_on_shutdown() {
        let store = Arc::new(MemoryStore::new());
        store
            .set("k", "v", Some(Duration::from_secs(1)))
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(
            store
                .clone()
                .run_sweeper(Duration::from_secs(5), shutdown.clone()),
        );

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(store.is_empty());

        shutdown.cancel();
        handle.await.unwrap();
    }
}
