// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Durable registry of account-owned addresses.
//!
//! The registry is the source of truth for ownership. The ephemeral store only
//! carries a derived copy (`ownedByAccount` in settings) which reconciliation
//! repairs from here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ownership::OwnedResource;
use crate::mailbox::{EmailAddress, Retention};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("registry path error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: user {user_id} cannot access {resource}")]
    PermissionDenied { user_id: String, resource: String },
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// An address owned by an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    /// JWT subject of the owning account.
    pub owner_user_id: String,
    pub email: EmailAddress,
    /// Latest recovery token the owner holds for the address.
    pub recovery_token: Option<String>,
    pub retention: Retention,
    /// Kept from the first insert across upserts.
    pub created_at: DateTime<Utc>,
}

impl AddressRecord {
    pub fn new(owner_user_id: impl Into<String>, email: EmailAddress, retention: Retention) -> Self {
        Self {
            owner_user_id: owner_user_id.into(),
            email,
            recovery_token: None,
            retention,
            created_at: Utc::now(),
        }
    }

    /// Attach the recovery token the owner presented or was issued.
    pub fn with_recovery_token(mut self, token: impl Into<String>) -> Self {
        self.recovery_token = Some(token.into());
        self
    }
}

impl OwnedResource for AddressRecord {
    fn owner_user_id(&self) -> &str {
        &self.owner_user_id
    }
}

/// Durable copy of the mailbox session an owner holds for one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerSession {
    pub owner_user_id: String,
    pub email: EmailAddress,
    /// Same token as the `mailbox-session:{token}` key.
    pub session_token: String,
    pub created_at: DateTime<Utc>,
    /// `None` for sessions on permanent mailboxes.
    pub expires_at: Option<DateTime<Utc>>,
}

impl OwnerSession {
    /// Whether the row is still usable at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }
}

impl OwnedResource for OwnerSession {
    fn owner_user_id(&self) -> &str {
        &self.owner_user_id
    }

    fn resource_name(&self) -> String {
        format!("session for {}", self.email)
    }
}

/// An address the owner recently used, owned or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub email: EmailAddress,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    /// Retention for new owned addresses when the request names none.
    pub default_retention: Option<Retention>,
    /// Address the client shows on sign-in.
    pub current_address: Option<EmailAddress>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Everything removed from the registry for one address.
#[derive(Debug, Clone, Default)]
pub struct PurgedAddress {
    pub addresses: Vec<AddressRecord>,
    /// Removed session rows; their tokens still need revoking.
    pub sessions: Vec<OwnerSession>,
    /// History rows are only counted.
    pub history_entries: usize,
}

/// Maximum history entries kept per owner.
pub const HISTORY_LIMIT: usize = 20;

/// Durable address ownership store.
///
/// Implementations are synchronous and expected to be fast (embedded
/// database); async callers use them directly.
pub trait AddressRegistry: Send + Sync {
    /// Insert or update `(owner, email)`, keeping the original `created_at`.
    fn upsert_address(&self, record: &AddressRecord) -> RegistryResult<AddressRecord>;

    fn get_address(&self, owner: &str, email: &EmailAddress)
        -> RegistryResult<Option<AddressRecord>>;

    /// Whether `owner` holds a row for `email`.
    fn is_owner(&self, owner: &str, email: &EmailAddress) -> RegistryResult<bool> {
        Ok(self.get_address(owner, email)?.is_some())
    }

    /// Every owner of `email`, via the reverse index.
    fn owners_of(&self, email: &EmailAddress) -> RegistryResult<Vec<String>>;

    /// Whether any account owns `email`.
    fn is_account_owned(&self, email: &EmailAddress) -> RegistryResult<bool> {
        Ok(!self.owners_of(email)?.is_empty())
    }

    /// Owner's addresses, newest first.
    fn list_owned(&self, owner: &str) -> RegistryResult<Vec<AddressRecord>>;

    /// Every address row of every owner, for the admin listing.
    fn list_all(&self) -> RegistryResult<Vec<AddressRecord>>;

    /// Returns whether the row exists.
    fn set_retention(
        &self,
        owner: &str,
        email: &EmailAddress,
        retention: Retention,
    ) -> RegistryResult<bool>;

    /// Returns the removed record.
    fn remove_address(&self, owner: &str, email: &EmailAddress)
        -> RegistryResult<Option<AddressRecord>>;

    /// Store a session, returning the one it replaced.
    fn replace_session(&self, session: &OwnerSession) -> RegistryResult<Option<OwnerSession>>;

    /// Stored row, expired or not.
    fn get_session(&self, owner: &str, email: &EmailAddress)
        -> RegistryResult<Option<OwnerSession>>;

    /// Returns the removed row.
    fn remove_session(&self, owner: &str, email: &EmailAddress)
        -> RegistryResult<Option<OwnerSession>>;

    fn list_sessions(&self, owner: &str) -> RegistryResult<Vec<OwnerSession>>;

    /// Session rows of every owner of `email`.
    fn sessions_for_address(&self, email: &EmailAddress) -> RegistryResult<Vec<OwnerSession>>;

    /// Drop expiry from every session row for `email`. Returns rows touched.
    fn clear_session_expiry(&self, email: &EmailAddress) -> RegistryResult<usize>;

    /// Delete the owner's expired session rows. Returns rows removed.
    fn prune_expired_sessions(&self, owner: &str, now: DateTime<Utc>) -> RegistryResult<usize>;

    /// Add or refresh a history entry, keeping at most [`HISTORY_LIMIT`].
    fn record_history(&self, owner: &str, email: &EmailAddress) -> RegistryResult<()>;

    /// History newest first.
    fn history(&self, owner: &str) -> RegistryResult<Vec<HistoryEntry>>;

    /// Remove one entry, or all of them when `email` is `None`.
    fn remove_history(&self, owner: &str, email: Option<&EmailAddress>) -> RegistryResult<usize>;

    fn preferences(&self, owner: &str) -> RegistryResult<Option<UserPreferences>>;

    fn put_preferences(&self, owner: &str, preferences: &UserPreferences) -> RegistryResult<()>;

    /// Remove every row that references `email`, for all owners.
    fn purge_address(&self, email: &EmailAddress) -> RegistryResult<PurgedAddress>;

    /// Open a read transaction to prove the database is usable.
    fn health_check(&self) -> RegistryResult<()>;
}
