// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Retention setting writes.
//!
//! Every update writes through to the ephemeral settings record, the live
//! inbox TTL and, for owners, the registry row, so ingestion and the registry
//! agree on the same retention.

use std::time::Duration;

use super::recovery::RecoveryTokens;
use super::{EmailAddress, MailboxError, MailboxResult, Retention, RetentionPolicy, RetentionSetting};
use crate::auth::AuthenticatedUser;
use crate::storage::{AddressRegistry, InboxStore};

/// Lifetime of a guest settings record. Owned records never expire.
pub const GUEST_SETTINGS_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionUpdate {
    pub retention: Retention,
    pub owned_by_account: bool,
    /// Whether a live inbox had its TTL changed.
    pub inbox_updated: bool,
}

pub struct RetentionSettings<'a> {
    inbox: &'a InboxStore,
    registry: &'a dyn AddressRegistry,
    policy: &'a RetentionPolicy,
}

impl<'a> RetentionSettings<'a> {
    pub fn new(
        inbox: &'a InboxStore,
        registry: &'a dyn AddressRegistry,
        policy: &'a RetentionPolicy,
    ) -> Self {
        Self {
            inbox,
            registry,
            policy,
        }
    }

    /// Write the settings record with the TTL matching its ownership.
    pub async fn store(
        &self,
        address: &EmailAddress,
        setting: &RetentionSetting,
    ) -> MailboxResult<()> {
        let ttl = (!setting.owned_by_account).then_some(GUEST_SETTINGS_TTL);
        self.inbox.put_settings(address, setting, ttl).await?;
        Ok(())
    }

    /// Resolve and apply a retention change for `address`.
    ///
    /// Guests may only (re)apply the guest TTL, and may not touch an address
    /// some account owns.
    pub async fn update(
        &self,
        address: &EmailAddress,
        requested: Option<Retention>,
        caller: Option<&AuthenticatedUser>,
    ) -> MailboxResult<RetentionUpdate> {
        let owned = match caller {
            Some(user) => self.registry.is_owner(&user.user_id, address)?,
            None => false,
        };
        if !owned && self.registry.is_account_owned(address)? {
            return Err(MailboxError::NotOwned(address.to_string()));
        }

        let retention = self.policy.resolve(owned, requested);
        self.store(address, &RetentionSetting::new(retention, owned))
            .await?;
        let inbox_updated = self.inbox.apply_inbox_retention(address, retention).await?;

        if let (true, Some(user)) = (owned, caller) {
            self.registry
                .set_retention(&user.user_id, address, retention)?;
            if retention.is_permanent() {
                RecoveryTokens::new(self.inbox).pin(address, None).await?;
            }
        }

        tracing::info!(
            address = %address,
            owned,
            retention_secs = retention.as_seconds(),
            inbox_updated,
            "Retention updated"
        );
        Ok(RetentionUpdate {
            retention,
            owned_by_account: owned,
            inbox_updated,
        })
    }

    /// Effective retention for an address right now.
    pub async fn current(&self, address: &EmailAddress) -> MailboxResult<(Retention, bool)> {
        let setting = match self.inbox.settings(address).await {
            Ok(setting) => setting,
            Err(e) => {
                tracing::warn!(address = %address, error = %e, "Settings read failed, reporting guest policy");
                None
            }
        };
        let owned = setting.is_some_and(|s| s.owned_by_account);
        Ok((self.policy.for_setting(setting.as_ref()), owned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::storage::{keys, AddressRecord, InboxMessage, KeyTtl, MemoryStore, RedbRegistry};
    use chrono::Utc;
    use std::sync::Arc;

    struct Fixture {
        inbox: InboxStore,
        registry: RedbRegistry,
        policy: RetentionPolicy,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                inbox: InboxStore::new(Arc::new(MemoryStore::new())),
                registry: RedbRegistry::in_memory().unwrap(),
                policy: RetentionPolicy::default(),
            }
        }

        fn settings(&self) -> RetentionSettings<'_> {
            RetentionSettings::new(&self.inbox, &self.registry, &self.policy)
        }

        async fn seed_inbox(&self, address: &EmailAddress) {
            let message = InboxMessage {
                id: "m".to_string(),
                from: "f@example.com".to_string(),
                to: address.to_string(),
                subject: "s".to_string(),
                text: String::new(),
                html: String::new(),
                received_at: Utc::now(),
                read: false,
            };
            self.inbox
                .prepend_message(address, &message, Retention::Seconds(3600))
                .await
                .unwrap();
        }
    }

    fn user(id: &str) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: id.to_string(),
            role: Role::User,
            session_id: None,
            issuer: "test".to_string(),
            email: None,
            expires_at: 0,
        }
    }

    #[tokio::test]
    async fn guest_requests_are_capped() {
        let fx = Fixture::new();
        let address = EmailAddress::parse("alice@domain").unwrap();
        for requested in [None, Some(Retention::Permanent), Some(Retention::Seconds(604800))] {
            let update = fx.settings().update(&address, requested, None).await.unwrap();
            assert_eq!(update.retention, Retention::Seconds(3600));
            assert!(!update.owned_by_account);
        }

        let stored = fx.inbox.settings(&address).await.unwrap().unwrap();
        assert_eq!(stored.retention, Retention::Seconds(3600));
        assert!(matches!(
            fx.inbox
                .backend()
                .ttl(&keys::settings(&address))
                .await
                .unwrap(),
            KeyTtl::Expires(_)
        ));
    }

    #[tokio::test]
    async fn owner_defaults_to_permanent_and_persists_inbox() {
        let fx = Fixture::new();
        let address = EmailAddress::parse("bob@domain").unwrap();
        let bob = user("user_bob");
        fx.registry
            .upsert_address(&AddressRecord::new("user_bob", address.clone(), Retention::Seconds(60)))
            .unwrap();
        fx.seed_inbox(&address).await;

        let update = fx
            .settings()
            .update(&address, None, Some(&bob))
            .await
            .unwrap();
        assert_eq!(update.retention, Retention::Permanent);
        assert!(update.owned_by_account);
        assert!(update.inbox_updated);

        assert_eq!(fx.inbox.inbox_ttl(&address).await.unwrap(), KeyTtl::Persistent);
        assert_eq!(
            fx.inbox
                .backend()
                .ttl(&keys::settings(&address))
                .await
                .unwrap(),
            KeyTtl::Persistent
        );
        assert_eq!(
            fx.registry
                .get_address("user_bob", &address)
                .unwrap()
                .unwrap()
                .retention,
            Retention::Permanent
        );
        assert_eq!(
            fx.settings().current(&address).await.unwrap(),
            (Retention::Permanent, true)
        );
    }

    #[tokio::test]
    async fn owner_permanent_retention_pins_recovery_keys() {
        let fx = Fixture::new();
        let address = EmailAddress::parse("frank@domain").unwrap();
        let frank = user("user_frank");
        let token = RecoveryTokens::new(&fx.inbox).issue(&address).await.unwrap();
        fx.registry
            .upsert_address(&AddressRecord::new("user_frank", address.clone(), Retention::Seconds(60)))
            .unwrap();

        fx.settings()
            .update(&address, Some(Retention::Permanent), Some(&frank))
            .await
            .unwrap();
        for key in [keys::recovery(&token.token_id), keys::address_token(&address)] {
            assert_eq!(
                fx.inbox.backend().ttl(&key).await.unwrap(),
                KeyTtl::Persistent,
                "{key}"
            );
        }
    }

    #[tokio::test]
    async fn owner_explicit_retention_is_applied() {
        let fx = Fixture::new();
        let address = EmailAddress::parse("eve@domain").unwrap();
        let eve = user("user_eve");
        fx.registry
            .upsert_address(&AddressRecord::new("user_eve", address.clone(), Retention::Permanent))
            .unwrap();

        let update = fx
            .settings()
            .update(&address, Some(Retention::Seconds(86400)), Some(&eve))
            .await
            .unwrap();
        assert_eq!(update.retention, Retention::Seconds(86400));
        assert!(!update.inbox_updated);
    }

    #[tokio::test]
    async fn non_owner_cannot_touch_owned_address() {
        let fx = Fixture::new();
        let address = EmailAddress::parse("taken@domain").unwrap();
        fx.registry
            .upsert_address(&AddressRecord::new("user_owner", address.clone(), Retention::Permanent))
            .unwrap();

        assert!(matches!(
            fx.settings().update(&address, None, None).await,
            Err(MailboxError::NotOwned(_))
        ));
        let mallory = user("user_mallory");
        assert!(matches!(
            fx.settings().update(&address, None, Some(&mallory)).await,
            Err(MailboxError::NotOwned(_))
        ));
    }

    #[tokio::test]
    async fn current_defaults_to_guest() {
        let fx = Fixture::new();
        let address = EmailAddress::parse("new@domain").unwrap();
        assert_eq!(
            fx.settings().current(&address).await.unwrap(),
            (Retention::Seconds(3600), false)
        );
    }
}
