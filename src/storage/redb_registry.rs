// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Address registry backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `user_addresses`: `owner|email` → serialized AddressRecord
//! - `address_owners`: `email|owner` → owner (reverse index)
//! - `owner_sessions`: `owner|email` → serialized OwnerSession
//! - `session_owners`: `email|owner` → owner (reverse index)
//! - `email_history`: `owner|email` → serialized HistoryEntry
//! - `user_preferences`: owner → serialized UserPreferences
//!
//! Key components have `|` and `%` percent-escaped.

use std::borrow::Cow;
use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, Table, TableDefinition,
};
use serde::de::DeserializeOwned;

use super::registry::{
    AddressRecord, AddressRegistry, HistoryEntry, OwnerSession, PurgedAddress, RegistryError,
    RegistryResult, UserPreferences, HISTORY_LIMIT,
};
use crate::mailbox::{EmailAddress, Retention};

// =============================================================================
// Table Definitions
// =============================================================================

const USER_ADDRESSES: TableDefinition<&str, &[u8]> = TableDefinition::new("user_addresses");

const ADDRESS_OWNERS: TableDefinition<&str, &str> = TableDefinition::new("address_owners");

const OWNER_SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("owner_sessions");

const SESSION_OWNERS: TableDefinition<&str, &str> = TableDefinition::new("session_owners");

const EMAIL_HISTORY: TableDefinition<&str, &[u8]> = TableDefinition::new("email_history");

const USER_PREFERENCES: TableDefinition<&str, &[u8]> = TableDefinition::new("user_preferences");

// =============================================================================
// Key Helpers
// =============================================================================

/// Escape `|` (and `%`) in a key component. Owner ids are JWT subjects such
/// as `auth0|abc`, so an unescaped `{owner}|` prefix could match rows of
/// another owner.
fn escape(part: &str) -> Cow<'_, str> {
    if part.contains(['|', '%']) {
        Cow::Owned(part.replace('%', "%25").replace('|', "%7C"))
    } else {
        Cow::Borrowed(part)
    }
}

fn pair_key(left: &str, right: &str) -> String {
    format!("{}|{}", escape(left), escape(right))
}

fn prefix(left: &str) -> String {
    format!("{}|", escape(left))
}

/// Decode every value whose key starts with `prefix`.
fn scan_json<T, R>(table: &R, prefix: &str) -> RegistryResult<Vec<T>>
where
    T: DeserializeOwned,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    let mut out = Vec::new();
    for entry in table.range(prefix..)? {
        let (key, value) = entry?;
        if !key.value().starts_with(prefix) {
            break;
        }
        out.push(serde_json::from_slice(value.value())?);
    }
    Ok(out)
}

/// Values of an index table under `prefix`.
fn scan_index<R>(table: &R, prefix: &str) -> RegistryResult<Vec<String>>
where
    R: ReadableTable<&'static str, &'static str>,
{
    let mut out = Vec::new();
    for entry in table.range(prefix..)? {
        let (key, value) = entry?;
        if !key.value().starts_with(prefix) {
            break;
        }
        out.push(value.value().to_string());
    }
    Ok(out)
}

fn get_json<T, R>(table: &R, key: &str) -> RegistryResult<Option<T>>
where
    T: DeserializeOwned,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key)? {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

fn remove_json<T: DeserializeOwned>(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    key: &str,
) -> RegistryResult<Option<T>> {
    let bytes = match table.remove(key)? {
        Some(value) => value.value().to_vec(),
        None => return Ok(None),
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}

// =============================================================================
// RedbRegistry
// =============================================================================

pub struct RedbRegistry {
    db: Database,
}

impl RedbRegistry {
    /// Open (or create) the registry at the given path.
    pub fn open(path: &Path) -> RegistryResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Database::create(path)?)
    }

    /// Registry that lives only in memory, for tests and throwaway dev runs.
    pub fn in_memory() -> RegistryResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> RegistryResult<Self> {
        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USER_ADDRESSES)?;
            let _ = write_txn.open_table(ADDRESS_OWNERS)?;
            let _ = write_txn.open_table(OWNER_SESSIONS)?;
            let _ = write_txn.open_table(SESSION_OWNERS)?;
            let _ = write_txn.open_table(EMAIL_HISTORY)?;
            let _ = write_txn.open_table(USER_PREFERENCES)?;
        }
        write_txn.commit()?;
        Ok(Self { db })
    }
}

impl AddressRegistry for RedbRegistry {
    // =========================================================================
    // Addresses
    // =========================================================================

    fn upsert_address(&self, record: &AddressRecord) -> RegistryResult<AddressRecord> {
        let key = pair_key(&record.owner_user_id, record.email.as_str());
        let write_txn = self.db.begin_write()?;
        let stored = {
            let mut table = write_txn.open_table(USER_ADDRESSES)?;
            let existing: Option<AddressRecord> = get_json(&table, &key)?;

            let mut stored = record.clone();
            if let Some(existing) = existing {
                stored.created_at = existing.created_at;
                if stored.recovery_token.is_none() {
                    stored.recovery_token = existing.recovery_token;
                }
            }
            let json = serde_json::to_vec(&stored)?;
            table.insert(key.as_str(), json.as_slice())?;

            let mut owners = write_txn.open_table(ADDRESS_OWNERS)?;
            owners.insert(
                pair_key(record.email.as_str(), &record.owner_user_id).as_str(),
                record.owner_user_id.as_str(),
            )?;
            stored
        };
        write_txn.commit()?;
        Ok(stored)
    }

    fn get_address(
        &self,
        owner: &str,
        email: &EmailAddress,
    ) -> RegistryResult<Option<AddressRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USER_ADDRESSES)?;
        get_json(&table, &pair_key(owner, email.as_str()))
    }

    fn owners_of(&self, email: &EmailAddress) -> RegistryResult<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ADDRESS_OWNERS)?;
        scan_index(&table, &prefix(email.as_str()))
    }

    fn list_owned(&self, owner: &str) -> RegistryResult<Vec<AddressRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USER_ADDRESSES)?;
        let mut records: Vec<AddressRecord> = scan_json(&table, &prefix(owner))?;
        records.retain(|r| r.owner_user_id == owner);
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    fn list_all(&self) -> RegistryResult<Vec<AddressRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USER_ADDRESSES)?;
        let mut records = Vec::with_capacity(table.len()? as usize);
        for entry in table.iter()? {
            let (_, value) = entry?;
            records.push(serde_json::from_slice::<AddressRecord>(value.value())?);
        }
        Ok(records)
    }

    fn set_retention(
        &self,
        owner: &str,
        email: &EmailAddress,
        retention: Retention,
    ) -> RegistryResult<bool> {
        let key = pair_key(owner, email.as_str());
        let write_txn = self.db.begin_write()?;
        let found = {
            let mut table = write_txn.open_table(USER_ADDRESSES)?;
            match get_json::<AddressRecord, _>(&table, &key)? {
                Some(mut record) => {
                    record.retention = retention;
                    let json = serde_json::to_vec(&record)?;
                    table.insert(key.as_str(), json.as_slice())?;
                    true
                }
                None => false,
            }
        };
        write_txn.commit()?;
        Ok(found)
    }

    fn remove_address(
        &self,
        owner: &str,
        email: &EmailAddress,
    ) -> RegistryResult<Option<AddressRecord>> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(USER_ADDRESSES)?;
            let removed = remove_json(&mut table, &pair_key(owner, email.as_str()))?;
            let mut owners = write_txn.open_table(ADDRESS_OWNERS)?;
            owners.remove(pair_key(email.as_str(), owner).as_str())?;
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    // =========================================================================
    // Owner sessions
    // =========================================================================

    fn replace_session(&self, session: &OwnerSession) -> RegistryResult<Option<OwnerSession>> {
        let key = pair_key(&session.owner_user_id, session.email.as_str());
        let write_txn = self.db.begin_write()?;
        let previous = {
            let mut table = write_txn.open_table(OWNER_SESSIONS)?;
            let previous = remove_json(&mut table, &key)?;
            let json = serde_json::to_vec(session)?;
            table.insert(key.as_str(), json.as_slice())?;

            let mut index = write_txn.open_table(SESSION_OWNERS)?;
            index.insert(
                pair_key(session.email.as_str(), &session.owner_user_id).as_str(),
                session.owner_user_id.as_str(),
            )?;
            previous
        };
        write_txn.commit()?;
        Ok(previous)
    }

    fn get_session(
        &self,
        owner: &str,
        email: &EmailAddress,
    ) -> RegistryResult<Option<OwnerSession>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(OWNER_SESSIONS)?;
        get_json(&table, &pair_key(owner, email.as_str()))
    }

    fn remove_session(
        &self,
        owner: &str,
        email: &EmailAddress,
    ) -> RegistryResult<Option<OwnerSession>> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(OWNER_SESSIONS)?;
            let removed = remove_json(&mut table, &pair_key(owner, email.as_str()))?;
            let mut index = write_txn.open_table(SESSION_OWNERS)?;
            index.remove(pair_key(email.as_str(), owner).as_str())?;
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    fn list_sessions(&self, owner: &str) -> RegistryResult<Vec<OwnerSession>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(OWNER_SESSIONS)?;
        let mut sessions: Vec<OwnerSession> = scan_json(&table, &prefix(owner))?;
        sessions.retain(|s| s.owner_user_id == owner);
        Ok(sessions)
    }

    fn sessions_for_address(&self, email: &EmailAddress) -> RegistryResult<Vec<OwnerSession>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(SESSION_OWNERS)?;
        let table = read_txn.open_table(OWNER_SESSIONS)?;
        let mut sessions = Vec::new();
        for owner in scan_index(&index, &prefix(email.as_str()))? {
            if let Some(session) = get_json(&table, &pair_key(&owner, email.as_str()))? {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }

    fn clear_session_expiry(&self, email: &EmailAddress) -> RegistryResult<usize> {
        let write_txn = self.db.begin_write()?;
        let touched = {
            let index = write_txn.open_table(SESSION_OWNERS)?;
            let owners = scan_index(&index, &prefix(email.as_str()))?;
            let mut table = write_txn.open_table(OWNER_SESSIONS)?;
            let mut touched = 0;
            for owner in owners {
                let key = pair_key(&owner, email.as_str());
                if let Some(mut session) = get_json::<OwnerSession, _>(&table, &key)? {
                    if session.expires_at.is_some() {
                        session.expires_at = None;
                        let json = serde_json::to_vec(&session)?;
                        table.insert(key.as_str(), json.as_slice())?;
                        touched += 1;
                    }
                }
            }
            touched
        };
        write_txn.commit()?;
        Ok(touched)
    }

    fn prune_expired_sessions(&self, owner: &str, now: DateTime<Utc>) -> RegistryResult<usize> {
        let write_txn = self.db.begin_write()?;
        let pruned = {
            let mut table = write_txn.open_table(OWNER_SESSIONS)?;
            let expired: Vec<OwnerSession> = scan_json::<OwnerSession, _>(&table, &prefix(owner))?
                .into_iter()
                .filter(|s| s.owner_user_id == owner && !s.is_active(now))
                .collect();

            let mut index = write_txn.open_table(SESSION_OWNERS)?;
            for session in &expired {
                table.remove(pair_key(owner, session.email.as_str()).as_str())?;
                index.remove(pair_key(session.email.as_str(), owner).as_str())?;
            }
            expired.len()
        };
        write_txn.commit()?;
        Ok(pruned)
    }

    // =========================================================================
    // History & preferences
    // =========================================================================

    fn record_history(&self, owner: &str, email: &EmailAddress) -> RegistryResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(EMAIL_HISTORY)?;
            let entry = HistoryEntry {
                email: email.clone(),
                added_at: Utc::now(),
            };
            let json = serde_json::to_vec(&entry)?;
            table.insert(pair_key(owner, email.as_str()).as_str(), json.as_slice())?;

            let mut entries: Vec<HistoryEntry> = scan_json(&table, &prefix(owner))?;
            if entries.len() > HISTORY_LIMIT {
                entries.sort_by(|a, b| b.added_at.cmp(&a.added_at));
                for stale in &entries[HISTORY_LIMIT..] {
                    table.remove(pair_key(owner, stale.email.as_str()).as_str())?;
                }
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn history(&self, owner: &str) -> RegistryResult<Vec<HistoryEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(EMAIL_HISTORY)?;
        let mut entries: Vec<HistoryEntry> = scan_json(&table, &prefix(owner))?;
        entries.sort_by(|a, b| b.added_at.cmp(&a.added_at));
        entries.truncate(HISTORY_LIMIT);
        Ok(entries)
    }

    fn remove_history(&self, owner: &str, email: Option<&EmailAddress>) -> RegistryResult<usize> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(EMAIL_HISTORY)?;
            let targets: Vec<EmailAddress> = match email {
                Some(email) => vec![email.clone()],
                None => scan_json::<HistoryEntry, _>(&table, &prefix(owner))?
                    .into_iter()
                    .map(|entry| entry.email)
                    .collect(),
            };
            let mut removed = 0;
            for target in targets {
                if table.remove(pair_key(owner, target.as_str()).as_str())?.is_some() {
                    removed += 1;
                }
            }
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    fn preferences(&self, owner: &str) -> RegistryResult<Option<UserPreferences>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USER_PREFERENCES)?;
        get_json(&table, owner)
    }

    fn put_preferences(&self, owner: &str, preferences: &UserPreferences) -> RegistryResult<()> {
        let json = serde_json::to_vec(preferences)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(USER_PREFERENCES)?;
            table.insert(owner, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    // =========================================================================
    // Cascade
    // =========================================================================

    fn purge_address(&self, email: &EmailAddress) -> RegistryResult<PurgedAddress> {
        let mut purged = PurgedAddress::default();
        let write_txn = self.db.begin_write()?;
        {
            let mut owners_index = write_txn.open_table(ADDRESS_OWNERS)?;
            let owners = scan_index(&owners_index, &prefix(email.as_str()))?;
            let mut addresses = write_txn.open_table(USER_ADDRESSES)?;
            for owner in &owners {
                if let Some(record) = remove_json(&mut addresses, &pair_key(owner, email.as_str()))? {
                    purged.addresses.push(record);
                }
                owners_index.remove(pair_key(email.as_str(), owner).as_str())?;
            }

            let mut session_index = write_txn.open_table(SESSION_OWNERS)?;
            let session_owners = scan_index(&session_index, &prefix(email.as_str()))?;
            let mut sessions = write_txn.open_table(OWNER_SESSIONS)?;
            for owner in &session_owners {
                if let Some(session) = remove_json(&mut sessions, &pair_key(owner, email.as_str()))? {
                    purged.sessions.push(session);
                }
                session_index.remove(pair_key(email.as_str(), owner).as_str())?;
            }

            // History has no reverse index; owners come from both tables above.
            let mut history = write_txn.open_table(EMAIL_HISTORY)?;
            let mut candidates: Vec<&String> = owners.iter().chain(session_owners.iter()).collect();
            candidates.sort();
            candidates.dedup();
            for owner in candidates {
                if history.remove(pair_key(owner, email.as_str()).as_str())?.is_some() {
                    purged.history_entries += 1;
                }
            }
        }
        write_txn.commit()?;
        Ok(purged)
    }

    fn health_check(&self) -> RegistryResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(USER_ADDRESSES)?;
        Ok(())
    }
}
