// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key-value store with per-key expiry.
//!
//! Inboxes, settings, recovery tokens and mailbox sessions all live here. The
//! trait exposes only the primitives the mailbox services need; Redis is the
//! production backend and [`MemoryStore`](super::MemoryStore) covers tests and
//! single-node development.

use std::time::Duration;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Connection or command failure from the Redis backend.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A string operation hit a list key, or the other way round.
    #[error("key {0} holds a value of the wrong type")]
    WrongType(String),

    /// The value exists but does not decode as the expected record.
    #[error("corrupt value at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// No such key, or it already expired.
    Missing,
    /// The key exists without an expiry.
    Persistent,
    /// Time left before the key expires.
    Expires(Duration),
}

/// Backend for everything that may expire.
///
/// Each method is atomic for its own key. Nothing spans keys, so callers
/// that write several keys must tolerate a partial write.
#[async_trait]
pub trait EphemeralStore: Send + Sync {
    /// Short backend name for logs and health output.
    fn backend_name(&self) -> &'static str;

    /// Round-trip check used by the readiness probe.
    async fn ping(&self) -> StoreResult<()>;

    /// String value of a live key.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Overwrite a string value. `None` leaves the key without expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Whether a live key exists, of any type.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Returns whether the key existed and now carries the TTL.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Clear the TTL of a key. Returns whether the key exists.
    async fn persist(&self, key: &str) -> StoreResult<bool>;

    /// Remaining lifetime, see [`KeyTtl`].
    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl>;

    /// Prepend to a list and, when `ttl` is given, refresh its expiry in the
    /// same atomic step. Returns the new list length.
    async fn push_front(&self, key: &str, value: &str, ttl: Option<Duration>)
        -> StoreResult<usize>;

    /// Whole list, front first. Missing keys read as empty.
    async fn list(&self, key: &str) -> StoreResult<Vec<String>>;

    /// All live keys starting with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;
}
