// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Typed access to the ephemeral store.
//!
//! Services never build keys or parse raw values themselves; they go through
//! [`InboxStore`], which owns the key layout from [`super::keys`] and the
//! value encodings.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ephemeral::{EphemeralStore, KeyTtl, StoreError, StoreResult};
use super::keys;
use crate::mailbox::{EmailAddress, Retention, RetentionSetting};

/// A received message as stored in `inbox:{address}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InboxMessage {
    /// Generated at ingestion (UUID v4).
    pub id: String,
    pub from: String,
    /// Normalized recipient address.
    pub to: String,
    pub subject: String,
    /// Plaintext body.
    pub text: String,
    /// HTML body; falls back to the plaintext body.
    pub html: String,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

#[derive(Clone)]
pub struct InboxStore {
    backend: Arc<dyn EphemeralStore>,
}

impl InboxStore {
    pub fn new(backend: Arc<dyn EphemeralStore>) -> Self {
        Self { backend }
    }

    /// Raw backend, for the cascade coordinator's key-by-key plans.
    pub fn backend(&self) -> &dyn EphemeralStore {
        self.backend.as_ref()
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// Prepend a message and refresh the inbox TTL atomically.
    pub async fn prepend_message(
        &self,
        address: &EmailAddress,
        message: &InboxMessage,
        retention: Retention,
    ) -> StoreResult<usize> {
        let json = serde_json::to_string(message)?;
        self.backend
            .push_front(&keys::inbox(address), &json, retention.ttl())
            .await
    }

    /// Messages newest first. Entries that fail to decode are skipped.
    pub async fn messages(&self, address: &EmailAddress) -> StoreResult<Vec<InboxMessage>> {
        let raw = self.backend.list(&keys::inbox(address)).await?;
        Ok(raw
            .iter()
            .filter_map(|entry| match serde_json::from_str::<InboxMessage>(entry) {
                Ok(message) => Some(message),
                Err(e) => {
                    tracing::warn!(address = %address, error = %e, "Skipping undecodable inbox entry");
                    None
                }
            })
            .collect())
    }

    pub async fn inbox_exists(&self, address: &EmailAddress) -> StoreResult<bool> {
        self.backend.exists(&keys::inbox(address)).await
    }

    pub async fn inbox_ttl(&self, address: &EmailAddress) -> StoreResult<KeyTtl> {
        self.backend.ttl(&keys::inbox(address)).await
    }

    /// Apply a retention to an existing inbox. Returns whether the inbox exists.
    pub async fn apply_inbox_retention(
        &self,
        address: &EmailAddress,
        retention: Retention,
    ) -> StoreResult<bool> {
        let key = keys::inbox(address);
        match retention.ttl() {
            Some(ttl) => self.backend.expire(&key, ttl).await,
            None => self.backend.persist(&key).await,
        }
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// Stored settings. Undecodable records surface as [`StoreError::Corrupt`].
    pub async fn settings(&self, address: &EmailAddress) -> StoreResult<Option<RetentionSetting>> {
        let key = keys::settings(address);
        match self.backend.get(&key).await? {
            Some(raw) => RetentionSetting::decode(&raw)
                .map(Some)
                .map_err(|e| StoreError::Corrupt {
                    key,
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// Overwrite the settings record. `ttl` is `None` for owned records.
    pub async fn put_settings(
        &self,
        address: &EmailAddress,
        setting: &RetentionSetting,
        ttl: Option<Duration>,
    ) -> StoreResult<()> {
        self.backend
            .set(&keys::settings(address), &setting.encode(), ttl)
            .await
    }

    // =========================================================================
    // Recovery tokens
    // =========================================================================

    /// Store a recovery token and the address back-reference, both with `ttl`.
    pub async fn put_recovery(
        &self,
        token_id: &str,
        token: &str,
        address: &EmailAddress,
        ttl: Duration,
    ) -> StoreResult<()> {
        self.backend
            .set(&keys::recovery(token_id), address.as_str(), Some(ttl))
            .await?;
        self.backend
            .set(&keys::address_token(address), token, Some(ttl))
            .await
    }

    /// Raw address stored for a recovery token id.
    pub async fn recovery_address(&self, token_id: &str) -> StoreResult<Option<String>> {
        self.backend.get(&keys::recovery(token_id)).await
    }

    /// Latest recovery token issued for the address.
    pub async fn address_token(&self, address: &EmailAddress) -> StoreResult<Option<String>> {
        self.backend.get(&keys::address_token(address)).await
    }

    pub async fn has_address_token(&self, address: &EmailAddress) -> StoreResult<bool> {
        self.backend.exists(&keys::address_token(address)).await
    }

    /// Drop the TTL on the address back-reference and on the given recovery
    /// keys. Keys that are already gone are skipped.
    pub async fn persist_recovery(
        &self,
        address: &EmailAddress,
        token_ids: &[&str],
    ) -> StoreResult<usize> {
        let mut persisted = usize::from(self.backend.persist(&keys::address_token(address)).await?);
        for id in token_ids {
            persisted += usize::from(self.backend.persist(&keys::recovery(id)).await?);
        }
        Ok(persisted)
    }

    // =========================================================================
    // Deleted addresses
    // =========================================================================

    /// Mark an address as deleted. The marker has no TTL.
    pub async fn retire(&self, address: &EmailAddress) -> StoreResult<()> {
        self.backend
            .set(&keys::retired(address), &Utc::now().to_rfc3339(), None)
            .await
    }

    pub async fn is_retired(&self, address: &EmailAddress) -> StoreResult<bool> {
        self.backend.exists(&keys::retired(address)).await
    }

    /// Forget a deletion marker and any mail that arrived after the delete.
    /// Returns whether the address had been retired.
    pub async fn reclaim(&self, address: &EmailAddress) -> StoreResult<bool> {
        if !self.backend.delete(&keys::retired(address)).await? {
            return Ok(false);
        }
        self.backend.delete(&keys::inbox(address)).await?;
        Ok(true)
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Write both directions of a session mapping.
    pub async fn put_session(
        &self,
        token: &str,
        address: &EmailAddress,
        ttl: Option<Duration>,
    ) -> StoreResult<()> {
        self.backend
            .set(&keys::session(token), address.as_str(), ttl)
            .await?;
        self.backend
            .set(&keys::address_session(address), token, ttl)
            .await
    }

    /// Address a session token grants access to.
    pub async fn session_address(&self, token: &str) -> StoreResult<Option<String>> {
        self.backend.get(&keys::session(token)).await
    }

    pub async fn address_session(&self, address: &EmailAddress) -> StoreResult<Option<String>> {
        self.backend.get(&keys::address_session(address)).await
    }

    /// Remove a session token, and the reverse mapping if it still points at it.
    pub async fn remove_session(&self, token: &str) -> StoreResult<Option<EmailAddress>> {
        let Some(raw) = self.session_address(token).await? else {
            return Ok(None);
        };
        self.backend.delete(&keys::session(token)).await?;

        let address = EmailAddress::parse(&raw).ok();
        if let Some(address) = &address {
            if self.address_session(address).await?.as_deref() == Some(token) {
                self.backend.delete(&keys::address_session(address)).await?;
            }
        }
        Ok(address)
    }

    /// Session keys (`mailbox-session:*`) whose value is `address`.
    pub async fn session_keys_for(&self, address: &EmailAddress) -> StoreResult<Vec<String>> {
        self.keys_pointing_at(keys::SESSION_PREFIX, address).await
    }

    /// Recovery keys (`recovery:*`) whose value is `address`, including tokens
    /// superseded by a later reissue.
    pub async fn recovery_keys_for(&self, address: &EmailAddress) -> StoreResult<Vec<String>> {
        self.keys_pointing_at(keys::RECOVERY_PREFIX, address).await
    }

    async fn keys_pointing_at(
        &self,
        prefix: &str,
        address: &EmailAddress,
    ) -> StoreResult<Vec<String>> {
        let mut matching = Vec::new();
        for key in self.backend.scan_prefix(prefix).await? {
            if let Some(value) = self.backend.get(&key).await? {
                if address.matches(&value) {
                    matching.push(key);
                }
            }
        }
        Ok(matching)
    }

    // =========================================================================
    // Scans
    // =========================================================================

    /// Addresses that currently have an inbox.
    pub async fn inbox_addresses(&self) -> StoreResult<Vec<EmailAddress>> {
        self.addresses_under(keys::INBOX_PREFIX).await
    }

    /// Addresses that currently have stored settings.
    pub async fn settings_addresses(&self) -> StoreResult<Vec<EmailAddress>> {
        self.addresses_under(keys::SETTINGS_PREFIX).await
    }

    async fn addresses_under(&self, prefix: &str) -> StoreResult<Vec<EmailAddress>> {
        Ok(self
            .backend
            .scan_prefix(prefix)
            .await?
            .iter()
            .filter_map(|key| keys::address_from_key(prefix, key))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn store() -> InboxStore {
        InboxStore::new(Arc::new(MemoryStore::new()))
    }

    fn message(id: &str, to: &str) -> InboxMessage {
        InboxMessage {
            id: id.to_string(),
            from: "sender@example.com".to_string(),
            to: to.to_string(),
            subject: "Hi".to_string(),
            text: "hello".to_string(),
            html: "hello".to_string(),
            received_at: Utc::now(),
            read: false,
        }
    }

    #[tokio::test]
    async fn messages_are_newest_first() {
        let inbox = store();
        let address = EmailAddress::parse("a@example.com").unwrap();
        inbox
            .prepend_message(&address, &message("1", "a@example.com"), Retention::Seconds(60))
            .await
            .unwrap();
        inbox
            .prepend_message(&address, &message("2", "a@example.com"), Retention::Seconds(60))
            .await
            .unwrap();

        let ids: Vec<_> = inbox
            .messages(&address)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["2", "1"]);
        assert!(matches!(
            inbox.inbox_ttl(&address).await.unwrap(),
            KeyTtl::Expires(_)
        ));
    }

    #[tokio::test]
    async fn undecodable_messages_are_skipped() {
        let inbox = store();
        let address = EmailAddress::parse("a@example.com").unwrap();
        inbox
            .backend()
            .push_front(&keys::inbox(&address), "{broken", None)
            .await
            .unwrap();
        inbox
            .prepend_message(&address, &message("1", "a@example.com"), Retention::Permanent)
            .await
            .unwrap();
        assert_eq!(inbox.messages(&address).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn corrupt_settings_are_reported() {
        let inbox = store();
        let address = EmailAddress::parse("a@example.com").unwrap();
        inbox
            .backend()
            .set(&keys::settings(&address), "{\"ttl\":1}", None)
            .await
            .unwrap();
        assert!(matches!(
            inbox.settings(&address).await,
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn persist_recovery_clears_both_ttls() {
        let inbox = store();
        let address = EmailAddress::parse("a@example.com").unwrap();
        inbox
            .put_recovery("tid", "tid.x", &address, Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(inbox.persist_recovery(&address, &["tid", "gone"]).await.unwrap(), 2);
        for key in [keys::recovery("tid"), keys::address_token(&address)] {
            assert_eq!(inbox.backend().ttl(&key).await.unwrap(), KeyTtl::Persistent, "{key}");
        }
    }

    #[tokio::test]
    async fn reclaim_drops_marker_and_late_mail() {
        let inbox = store();
        let address = EmailAddress::parse("a@example.com").unwrap();
        assert!(!inbox.reclaim(&address).await.unwrap());

        inbox.retire(&address).await.unwrap();
        inbox
            .prepend_message(&address, &message("late", "a@example.com"), Retention::Seconds(60))
            .await
            .unwrap();
        assert!(inbox.is_retired(&address).await.unwrap());

        assert!(inbox.reclaim(&address).await.unwrap());
        assert!(!inbox.is_retired(&address).await.unwrap());
        assert!(!inbox.inbox_exists(&address).await.unwrap());
    }

    #[tokio::test]
    async fn remove_session_clears_reverse_mapping_only_when_current() {
        let inbox = store();
        let address = EmailAddress::parse("a@example.com").unwrap();
        inbox.put_session("old", &address, None).await.unwrap();
        inbox.put_session("new", &address, None).await.unwrap();

        assert_eq!(inbox.remove_session("old").await.unwrap(), Some(address.clone()));
        assert_eq!(
            inbox.address_session(&address).await.unwrap().as_deref(),
            Some("new")
        );

        inbox.remove_session("new").await.unwrap();
        assert_eq!(inbox.address_session(&address).await.unwrap(), None);
        assert_eq!(inbox.remove_session("new").await.unwrap(), None);
    }

    #[tokio::test]
    async fn session_keys_for_matches_case_insensitively() {
        let inbox = store();
        let address = EmailAddress::parse("a@example.com").unwrap();
        inbox
            .backend()
            .set(&keys::session("t1"), "A@Example.com", None)
            .await
            .unwrap();
        inbox
            .backend()
            .set(&keys::session("t2"), "b@example.com", None)
            .await
            .unwrap();

        assert_eq!(
            inbox.session_keys_for(&address).await.unwrap(),
            vec!["mailbox-session:t1"]
        );
    }

    #[tokio::test]
    async fn recovery_keys_include_superseded_tokens() {
        let inbox = store();
        let address = EmailAddress::parse("a@example.com").unwrap();
        let ttl = Duration::from_secs(60);
        inbox.put_recovery("first", "first.x", &address, ttl).await.unwrap();
        inbox.put_recovery("second", "second.x", &address, ttl).await.unwrap();

        let mut found = inbox.recovery_keys_for(&address).await.unwrap();
        found.sort();
        assert_eq!(found, vec!["recovery:first", "recovery:second"]);
        assert_eq!(
            inbox.address_token(&address).await.unwrap().as_deref(),
            Some("second.x")
        );
    }

    #[tokio::test]
    async fn scans_return_addresses() {
        let inbox = store();
        let a = EmailAddress::parse("a@example.com").unwrap();
        let b = EmailAddress::parse("b@example.com").unwrap();
        inbox
            .prepend_message(&a, &message("1", "a@example.com"), Retention::Permanent)
            .await
            .unwrap();
        inbox
            .put_settings(&b, &RetentionSetting::new(Retention::Permanent, true), None)
            .await
            .unwrap();

        assert_eq!(inbox.inbox_addresses().await.unwrap(), vec![a]);
        assert_eq!(inbox.settings_addresses().await.unwrap(), vec![b]);
    }
}
