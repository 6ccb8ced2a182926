// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage
//!
//! Two stores with different lifetimes:
//!
//! - **Ephemeral store** ([`EphemeralStore`]): inboxes, settings, recovery
//!   tokens and mailbox sessions, each key carrying its own TTL. Redis in
//!   production, [`MemoryStore`] otherwise. Services reach it through the typed
//!   [`InboxStore`] facade.
//! - **Address registry** ([`AddressRegistry`]): durable account ownership,
//!   owner sessions, history and preferences, backed by redb.
//!
//! Deleting an address touches both; see `mailbox::coordinator` for the
//! ordering and failure rules.

pub mod ephemeral;
pub mod inbox;
pub mod keys;
pub mod memory;
pub mod ownership;
pub mod redb_registry;
pub mod redis_store;
pub mod registry;

pub use ephemeral::{EphemeralStore, KeyTtl, StoreError, StoreResult};
pub use inbox::{InboxMessage, InboxStore};
pub use memory::{MemoryStore, DEFAULT_SWEEP_INTERVAL};
pub use ownership::{OwnedResource, OwnershipCheck, OwnershipEnforcer};
pub use redb_registry::RedbRegistry;
pub use redis_store::RedisStore;
pub use registry::{
    AddressRecord, AddressRegistry, HistoryEntry, OwnerSession, PurgedAddress, RegistryError,
    RegistryResult, UserPreferences, HISTORY_LIMIT,
};
