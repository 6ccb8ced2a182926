// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Cascading delete and make-permanent.
//!
//! Recovery and session keys are keyed by token, not by address, so they can
//! only be found by following values. Both operations therefore run in two
//! phases: [`CascadeCoordinator::plan`] resolves every dependent key, then the
//! plan is executed key by key. A failing key is reported and skipped; a key
//! that is already gone is not a failure.

use std::collections::BTreeMap;

use serde::Serialize;
use utoipa::ToSchema;

use super::recovery::token_id;
use super::{EmailAddress, MailboxError, MailboxResult, Retention, RetentionSetting};
use crate::storage::{keys, AddressRegistry, InboxStore, PurgedAddress};

/// Which store a planned key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    Inbox,
    Settings,
    AddressToken,
    Recovery,
    AddressSession,
    Session,
}

impl KeyKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::Settings => "settings",
            Self::AddressToken => "address_token",
            Self::Recovery => "recovery",
            Self::AddressSession => "address_session",
            Self::Session => "session",
        }
    }
}

/// Every ephemeral key derived from one address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPlan {
    keys: BTreeMap<String, KeyKind>,
}

impl KeyPlan {
    fn add(&mut self, kind: KeyKind, key: String) {
        self.keys.entry(key).or_insert(kind);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, KeyKind)> {
        self.keys.iter().map(|(key, kind)| (key.as_str(), *kind))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Execution {
    touched: Vec<(String, KeyKind)>,
    missing: Vec<String>,
    failed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub address: String,
    /// Stores that had something removed: `registry` plus key kinds.
    pub deleted_stores: Vec<String>,
    pub deleted_keys: Vec<String>,
    pub failed_keys: Vec<String>,
    pub registry_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PersistReport {
    pub address: String,
    pub persisted_keys: Vec<String>,
    pub failed_keys: Vec<String>,
    pub sessions_updated: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchPersistReport {
    pub scanned: usize,
    pub persisted_count: usize,
    pub addresses: Vec<String>,
    pub failed_addresses: Vec<String>,
}

pub struct CascadeCoordinator<'a> {
    inbox: &'a InboxStore,
    registry: &'a dyn AddressRegistry,
}

impl<'a> CascadeCoordinator<'a> {
    pub fn new(inbox: &'a InboxStore, registry: &'a dyn AddressRegistry) -> Self {
        Self { inbox, registry }
    }

    /// Resolve every ephemeral key that belongs to `address`.
    ///
    /// Lookups that fail only shrink the plan; they are logged and skipped.
    pub async fn plan(&self, address: &EmailAddress, purged: &PurgedAddress) -> KeyPlan {
        let mut plan = KeyPlan::default();
        plan.add(KeyKind::Inbox, keys::inbox(address));
        plan.add(KeyKind::Settings, keys::settings(address));
        plan.add(KeyKind::AddressToken, keys::address_token(address));
        plan.add(KeyKind::AddressSession, keys::address_session(address));

        let mut tokens: Vec<String> = purged
            .addresses
            .iter()
            .filter_map(|row| row.recovery_token.clone())
            .collect();
        match self.inbox.address_token(address).await {
            Ok(Some(token)) => tokens.push(token),
            Ok(None) => {}
            Err(e) => tracing::warn!(address = %address, error = %e, "Recovery back-reference lookup failed"),
        }
        for id in tokens.iter().filter_map(|token| token_id(token)) {
            plan.add(KeyKind::Recovery, keys::recovery(id));
        }

        let mut sessions: Vec<String> = purged
            .sessions
            .iter()
            .map(|row| row.session_token.clone())
            .collect();
        match self.inbox.address_session(address).await {
            Ok(Some(token)) => sessions.push(token),
            Ok(None) => {}
            Err(e) => tracing::warn!(address = %address, error = %e, "Session back-reference lookup failed"),
        }
        for token in &sessions {
            plan.add(KeyKind::Session, keys::session(token));
        }

        match self.inbox.recovery_keys_for(address).await {
            Ok(found) => found.into_iter().for_each(|key| plan.add(KeyKind::Recovery, key)),
            Err(e) => tracing::warn!(address = %address, error = %e, "Recovery key scan failed"),
        }
        match self.inbox.session_keys_for(address).await {
            Ok(found) => found.into_iter().for_each(|key| plan.add(KeyKind::Session, key)),
            Err(e) => tracing::warn!(address = %address, error = %e, "Session key scan failed"),
        }

        plan
    }

    async fn delete_all(&self, plan: &KeyPlan) -> Execution {
        let mut execution = Execution::default();
        for (key, kind) in plan.iter() {
            match self.inbox.backend().delete(key).await {
                Ok(true) => execution.touched.push((key.to_string(), kind)),
                Ok(false) => execution.missing.push(key.to_string()),
                Err(e) => {
                    tracing::warn!(key, error = %e, "Failed to delete key");
                    execution.failed.push(key.to_string());
                }
            }
        }
        execution
    }

    async fn persist_all(&self, plan: &KeyPlan) -> Execution {
        let mut execution = Execution::default();
        for (key, kind) in plan.iter() {
            match self.inbox.backend().persist(key).await {
                Ok(true) => execution.touched.push((key.to_string(), kind)),
                Ok(false) => execution.missing.push(key.to_string()),
                Err(e) => {
                    tracing::warn!(key, error = %e, "Failed to persist key");
                    execution.failed.push(key.to_string());
                }
            }
        }
        execution
    }

    /// Remove an address from the registry and every ephemeral store key.
    ///
    /// An address that had anything to delete is then marked retired, so
    /// mail arriving afterwards is not readable without a new claim.
    pub async fn delete_address(&self, address: &EmailAddress) -> MailboxResult<CleanupReport> {
        let purged = self.registry.purge_address(address)?;
        let plan = self.plan(address, &purged).await;
        let mut execution = self.delete_all(&plan).await;

        let registry_rows = purged.addresses.len() + purged.sessions.len() + purged.history_entries;
        if registry_rows > 0 || !execution.touched.is_empty() {
            if let Err(e) = self.inbox.retire(address).await {
                tracing::warn!(address = %address, error = %e, "Failed to mark address deleted");
                execution.failed.push(keys::retired(address));
            }
        }
        let mut deleted_stores = Vec::new();
        if registry_rows > 0 {
            deleted_stores.push("registry".to_string());
        }
        let mut kinds: Vec<KeyKind> = execution.touched.iter().map(|(_, kind)| *kind).collect();
        kinds.sort();
        kinds.dedup();
        deleted_stores.extend(kinds.iter().map(|kind| kind.label().to_string()));

        if execution.failed.is_empty() {
            tracing::info!(
                address = %address,
                registry_rows,
                deleted = execution.touched.len(),
                already_gone = execution.missing.len(),
                "Address deleted"
            );
        } else {
            tracing::warn!(
                address = %address,
                failed_keys = ?execution.failed,
                deleted = execution.touched.len(),
                "Address partially deleted"
            );
        }

        Ok(CleanupReport {
            address: address.to_string(),
            deleted_stores,
            deleted_keys: execution.touched.into_iter().map(|(key, _)| key).collect(),
            failed_keys: execution.failed,
            registry_rows,
        })
    }

    /// Whether an account owns the address, per registry or settings flag.
    async fn is_owned(&self, address: &EmailAddress) -> MailboxResult<bool> {
        if self.registry.is_account_owned(address)? {
            return Ok(true);
        }
        match self.inbox.settings(address).await {
            Ok(setting) => Ok(setting.is_some_and(|s| s.owned_by_account)),
            Err(e) => {
                tracing::warn!(address = %address, error = %e, "Settings unreadable, treating as guest");
                Ok(false)
            }
        }
    }

    /// Drop every TTL tied to an owned address and record it as permanent.
    pub async fn make_permanent(&self, address: &EmailAddress) -> MailboxResult<PersistReport> {
        if !self.is_owned(address).await? {
            return Err(MailboxError::NotOwned(address.to_string()));
        }

        self.inbox
            .put_settings(address, &RetentionSetting::new(Retention::Permanent, true), None)
            .await?;
        let mut rows = Vec::new();
        for owner in self.registry.owners_of(address)? {
            self.registry
                .set_retention(&owner, address, Retention::Permanent)?;
            rows.extend(self.registry.get_address(&owner, address)?);
        }
        let sessions_updated = self.registry.clear_session_expiry(address)?;

        // Registry rows only feed the plan here; nothing is removed.
        let related = PurgedAddress {
            addresses: rows,
            sessions: self.registry.sessions_for_address(address)?,
            history_entries: 0,
        };
        let plan = self.plan(address, &related).await;
        let execution = self.persist_all(&plan).await;

        if !execution.failed.is_empty() {
            tracing::warn!(address = %address, failed_keys = ?execution.failed, "Address partially persisted");
        }
        tracing::info!(
            address = %address,
            persisted = execution.touched.len(),
            sessions_updated,
            "Address made permanent"
        );

        Ok(PersistReport {
            address: address.to_string(),
            persisted_keys: execution.touched.into_iter().map(|(key, _)| key).collect(),
            failed_keys: execution.failed,
            sessions_updated,
        })
    }

    /// Make every address flagged as owned in its settings permanent.
    pub async fn make_all_permanent(&self) -> MailboxResult<BatchPersistReport> {
        let candidates = self.inbox.settings_addresses().await?;
        let mut report = BatchPersistReport {
            scanned: candidates.len(),
            ..Default::default()
        };

        for address in candidates {
            let owned = match self.inbox.settings(&address).await {
                Ok(setting) => setting.is_some_and(|s| s.owned_by_account),
                Err(e) => {
                    tracing::warn!(address = %address, error = %e, "Skipping unreadable settings");
                    false
                }
            };
            if !owned {
                continue;
            }
            match self.make_permanent(&address).await {
                Ok(persisted) if persisted.failed_keys.is_empty() => {
                    report.persisted_count += 1;
                    report.addresses.push(address.to_string());
                }
                Ok(_) => {
                    report.persisted_count += 1;
                    report.addresses.push(address.to_string());
                    report.failed_addresses.push(address.to_string());
                }
                Err(e) => {
                    tracing::warn!(address = %address, error = %e, "Failed to make address permanent");
                    report.failed_addresses.push(address.to_string());
                }
            }
        }

        tracing::info!(
            scanned = report.scanned,
            persisted = report.persisted_count,
            failed = report.failed_addresses.len(),
            "Batch make-permanent finished"
        );
        Ok(report)
    }
}
