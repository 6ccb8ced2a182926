// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Address creation and the owner-facing account operations.

use chrono::Utc;

use super::address::generate_local_part;
use super::coordinator::{CascadeCoordinator, CleanupReport};
use super::recovery::{RecoveryToken, RecoveryTokens};
use super::sessions::{IssuedSession, MailboxSessions};
use super::settings::RetentionSettings;
use super::{EmailAddress, MailboxError, MailboxResult, Retention, RetentionPolicy, RetentionSetting};
use crate::auth::AuthenticatedUser;
use crate::storage::{
    AddressRecord, AddressRegistry, HistoryEntry, InboxStore, StoreError, UserPreferences,
};

/// Attempts at finding a free generated local part.
const GENERATE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone)]
pub struct CreatedAddress {
    pub address: EmailAddress,
    pub recovery: RecoveryToken,
    pub session: IssuedSession,
    pub retention: Retention,
    pub owned_by_account: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub pruned_sessions: usize,
    pub restored_settings: usize,
}

/// Guest state held by a client, imported when the user signs in.
#[derive(Debug, Clone, Default)]
pub struct GuestData {
    pub tokens: Vec<String>,
    pub history: Vec<EmailAddress>,
    pub default_retention: Option<Retention>,
    pub current_address: Option<EmailAddress>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub migrated: Vec<EmailAddress>,
    /// Tokens that did not resolve, or resolved to someone else's address.
    pub rejected: usize,
    pub history_imported: usize,
    pub preferences_updated: bool,
}

pub struct Accounts<'a> {
    inbox: &'a InboxStore,
    registry: &'a dyn AddressRegistry,
    policy: &'a RetentionPolicy,
}

impl<'a> Accounts<'a> {
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

    fn settings(&self) -> RetentionSettings<'_> {
        RetentionSettings::new(self.inbox, self.registry, self.policy)
    }

    /// Whether the address is already held by a recovery token or an account.
    /// Deleted addresses are free to claim again.
    async fn is_taken(&self, address: &EmailAddress) -> MailboxResult<bool> {
        Ok(self.inbox.has_address_token(address).await?
            || self.registry.is_account_owned(address)?)
    }

    async fn pick_address(&self, local_part: Option<&str>, domain: &str) -> MailboxResult<EmailAddress> {
        if let Some(local) = local_part.map(str::trim).filter(|l| !l.is_empty()) {
            let address = EmailAddress::parse(&format!("{local}@{domain}"))?;
            if self.is_taken(&address).await? {
                return Err(MailboxError::AddressTaken(address.to_string()));
            }
            return Ok(address);
        }

        for _ in 0..GENERATE_ATTEMPTS {
            let address = EmailAddress::parse(&format!("{}@{domain}", generate_local_part()?))?;
            if !self.is_taken(&address).await? {
                return Ok(address);
            }
        }
        Err(MailboxError::AddressTaken(format!("*@{domain}")))
    }

    /// Owner retention: explicit value, then stored preference, then permanent.
    fn owner_retention(&self, user: &AuthenticatedUser, requested: Option<Retention>) -> MailboxResult<Retention> {
        let fallback = match requested {
            Some(retention) => Some(retention),
            None => self
                .registry
                .preferences(&user.user_id)?
                .and_then(|prefs| prefs.default_retention),
        };
        Ok(self.policy.resolve(true, fallback))
    }

    /// Create a mailbox, protect it with a recovery token and open a session.
    pub async fn create_address(
        &self,
        local_part: Option<&str>,
        domain: &str,
        requested: Option<Retention>,
        caller: Option<&AuthenticatedUser>,
    ) -> MailboxResult<CreatedAddress> {
        let address = self.pick_address(local_part, domain).await?;
        let retention = match caller {
            Some(user) => self.owner_retention(user, requested)?,
            None => self.policy.resolve(false, requested),
        };
        let owned = caller.is_some();

        if self.inbox.reclaim(&address).await? {
            tracing::info!(address = %address, "Reclaiming deleted address");
        }
        let tokens = RecoveryTokens::new(self.inbox);
        let recovery = tokens.issue(&address).await?;
        if owned && retention.is_permanent() {
            tokens.pin(&address, None).await?;
        }
        self.settings()
            .store(&address, &RetentionSetting::new(retention, owned))
            .await?;

        if let Some(user) = caller {
            self.registry.upsert_address(
                &AddressRecord::new(&user.user_id, address.clone(), retention)
                    .with_recovery_token(&recovery.token),
            )?;
            self.registry.record_history(&user.user_id, &address)?;
            self.set_current_address(user, &address)?;
        }

        let session = MailboxSessions::new(self.inbox, self.registry, self.policy)
            .create_session(&address, Some(&recovery.token), caller)
            .await?;

        tracing::info!(
            address = %address,
            owned,
            retention_secs = retention.as_seconds(),
            "Address created"
        );
        Ok(CreatedAddress {
            address,
            recovery,
            session,
            retention,
            owned_by_account: owned,
        })
    }

    fn set_current_address(&self, user: &AuthenticatedUser, address: &EmailAddress) -> MailboxResult<()> {
        let mut prefs = self.registry.preferences(&user.user_id)?.unwrap_or_default();
        prefs.current_address = Some(address.clone());
        prefs.updated_at = Some(Utc::now());
        self.registry.put_preferences(&user.user_id, &prefs)?;
        Ok(())
    }

    /// Attach an address to the caller's account.
    ///
    /// A protected mailbox needs its recovery token unless the caller already
    /// owns it. Addresses held by another account are refused.
    pub async fn associate(
        &self,
        user: &AuthenticatedUser,
        address: &EmailAddress,
        recovery_token: Option<&str>,
        requested: Option<Retention>,
    ) -> MailboxResult<AddressRecord> {
        let already_owner = self.registry.is_owner(&user.user_id, address)?;
        if !already_owner && self.registry.is_account_owned(address)? {
            return Err(MailboxError::NotOwned(address.to_string()));
        }

        let token = recovery_token.map(str::trim).filter(|t| !t.is_empty());
        match token {
            Some(token) => {
                let resolved = RecoveryTokens::new(self.inbox).resolve(token).await?;
                if resolved != *address {
                    return Err(MailboxError::RecoveryKeyMismatch);
                }
            }
            None if already_owner => {}
            None => {
                if RecoveryTokens::new(self.inbox).is_protected(address).await? {
                    return Err(MailboxError::Unauthorized);
                }
            }
        }

        let retention = self.owner_retention(user, requested)?;
        let mut record = AddressRecord::new(&user.user_id, address.clone(), retention);
        if let Some(token) = token {
            record = record.with_recovery_token(token);
        }
        let stored = self.registry.upsert_address(&record)?;
        self.registry.record_history(&user.user_id, address)?;
        self.attach_ephemeral(address, retention, token).await?;

        tracing::info!(address = %address, user_id = %user.user_id, "Address associated with account");
        Ok(stored)
    }

    /// Mark the ephemeral copy as owned and align the inbox TTL. Permanent
    /// mailboxes also keep their recovery keys.
    async fn attach_ephemeral(
        &self,
        address: &EmailAddress,
        retention: Retention,
        presented_token: Option<&str>,
    ) -> MailboxResult<()> {
        self.settings()
            .store(address, &RetentionSetting::new(retention, true))
            .await?;
        self.inbox.apply_inbox_retention(address, retention).await?;
        if retention.is_permanent() {
            RecoveryTokens::new(self.inbox)
                .pin(address, presented_token)
                .await?;
        }
        Ok(())
    }

    /// Drop an owned address. The last owner removing it deletes the mailbox.
    pub async fn remove_owned(
        &self,
        user: &AuthenticatedUser,
        address: &EmailAddress,
    ) -> MailboxResult<CleanupReport> {
        if !self.registry.is_owner(&user.user_id, address)? {
            return Err(MailboxError::NotOwned(address.to_string()));
        }

        let others = self
            .registry
            .owners_of(address)?
            .into_iter()
            .any(|owner| owner != user.user_id);
        if !others {
            return CascadeCoordinator::new(self.inbox, self.registry)
                .delete_address(address)
                .await;
        }

        MailboxSessions::new(self.inbox, self.registry, self.policy)
            .end_owner_session(user, address)
            .await?;
        let removed = self.registry.remove_address(&user.user_id, address)?;
        self.registry.remove_history(&user.user_id, Some(address))?;
        tracing::info!(address = %address, user_id = %user.user_id, "Address detached, other owners remain");
        Ok(CleanupReport {
            address: address.to_string(),
            deleted_stores: vec!["registry".to_string()],
            deleted_keys: Vec::new(),
            failed_keys: Vec::new(),
            registry_rows: usize::from(removed.is_some()),
        })
    }

    /// Repair the owner's derived state. Safe to run any number of times.
    pub async fn reconcile_owner(&self, user: &AuthenticatedUser) -> MailboxResult<ReconcileReport> {
        let mut report = ReconcileReport {
            pruned_sessions: self
                .registry
                .prune_expired_sessions(&user.user_id, Utc::now())?,
            ..Default::default()
        };

        for record in self.registry.list_owned(&user.user_id)? {
            let missing = match self.inbox.settings(&record.email).await {
                Ok(setting) => setting.is_none(),
                Err(StoreError::Corrupt { .. }) => true,
                Err(e) => {
                    tracing::warn!(address = %record.email, error = %e, "Skipping settings repair");
                    false
                }
            };
            if missing {
                self.settings()
                    .store(&record.email, &RetentionSetting::new(record.retention, true))
                    .await?;
                report.restored_settings += 1;
            }
        }

        if report != ReconcileReport::default() {
            tracing::info!(
                user_id = %user.user_id,
                pruned_sessions = report.pruned_sessions,
                restored_settings = report.restored_settings,
                "Owner state reconciled"
            );
        }
        Ok(report)
    }

    pub async fn list_owned(&self, user: &AuthenticatedUser) -> MailboxResult<Vec<AddressRecord>> {
        self.reconcile_owner(user).await?;
        Ok(self.registry.list_owned(&user.user_id)?)
    }

    /// Import client-held guest state. Every token is checked against the
    /// recovery mapping before its address is attached.
    pub async fn migrate_guest_data(
        &self,
        user: &AuthenticatedUser,
        data: GuestData,
    ) -> MailboxResult<MigrationReport> {
        let mut report = MigrationReport::default();
        let tokens = RecoveryTokens::new(self.inbox);

        for token in data.tokens.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            let address = match tokens.resolve(token).await {
                Ok(address) => address,
                Err(MailboxError::MalformedToken | MailboxError::TokenExpiredOrInvalid) => {
                    report.rejected += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            if !self.registry.is_owner(&user.user_id, &address)?
                && self.registry.is_account_owned(&address)?
            {
                tracing::warn!(address = %address, user_id = %user.user_id, "Guest token for an address owned elsewhere");
                report.rejected += 1;
                continue;
            }

            self.registry.upsert_address(
                &AddressRecord::new(&user.user_id, address.clone(), Retention::Permanent)
                    .with_recovery_token(token),
            )?;
            self.registry
                .set_retention(&user.user_id, &address, Retention::Permanent)?;
            self.registry.record_history(&user.user_id, &address)?;
            self.attach_ephemeral(&address, Retention::Permanent, Some(token))
                .await?;
            report.migrated.push(address);
        }

        for address in &data.history {
            self.registry.record_history(&user.user_id, address)?;
            report.history_imported += 1;
        }

        if data.default_retention.is_some() || data.current_address.is_some() {
            let mut prefs = self.registry.preferences(&user.user_id)?.unwrap_or_default();
            if let Some(retention) = data.default_retention {
                prefs.default_retention = Some(retention);
            }
            if let Some(address) = data.current_address {
                prefs.current_address = Some(address);
            }
            prefs.updated_at = Some(Utc::now());
            self.registry.put_preferences(&user.user_id, &prefs)?;
            report.preferences_updated = true;
        }

        tracing::info!(
            user_id = %user.user_id,
            migrated = report.migrated.len(),
            rejected = report.rejected,
            history = report.history_imported,
            "Guest data migrated"
        );
        Ok(report)
    }

    // =========================================================================
    // History and preferences
    // =========================================================================

    pub fn history(&self, user: &AuthenticatedUser) -> MailboxResult<Vec<HistoryEntry>> {
        Ok(self.registry.history(&user.user_id)?)
    }

    pub fn add_history(&self, user: &AuthenticatedUser, address: &EmailAddress) -> MailboxResult<()> {
        Ok(self.registry.record_history(&user.user_id, address)?)
    }

    /// Remove one entry, or every entry when `address` is `None`.
    pub fn remove_history(
        &self,
        user: &AuthenticatedUser,
        address: Option<&EmailAddress>,
    ) -> MailboxResult<usize> {
        Ok(self.registry.remove_history(&user.user_id, address)?)
    }

    pub fn preferences(&self, user: &AuthenticatedUser) -> MailboxResult<UserPreferences> {
        Ok(self
            .registry
            .preferences(&user.user_id)?
            .unwrap_or_default())
    }

    pub fn put_preferences(
        &self,
        user: &AuthenticatedUser,
        default_retention: Option<Retention>,
        current_address: Option<EmailAddress>,
    ) -> MailboxResult<UserPreferences> {
        let prefs = UserPreferences {
            default_retention,
            current_address,
            updated_at: Some(Utc::now()),
        };
        self.registry.put_preferences(&user.user_id, &prefs)?;
        Ok(prefs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::mailbox::sessions::{AccessDecision, AccessPath, VerificationReason};
    use crate::storage::{keys, KeyTtl, MemoryStore, OwnerSession, RedbRegistry};
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

        fn accounts(&self) -> Accounts<'_> {
            Accounts::new(&self.inbox, &self.registry, &self.policy)
        }

        fn sessions(&self) -> MailboxSessions<'_> {
            MailboxSessions::new(&self.inbox, &self.registry, &self.policy)
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
    async fn guest_create_gets_guest_retention_and_session() {
        let fx = Fixture::new();
        let created = fx
            .accounts()
            .create_address(Some("alice"), "domain", Some(Retention::Permanent), None)
            .await
            .unwrap();

        assert_eq!(created.address.as_str(), "alice@domain");
        assert_eq!(created.retention, Retention::Seconds(3600));
        assert!(!created.owned_by_account);
        assert_eq!(created.session.expires_in(), 3600);

        let resolved = RecoveryTokens::new(&fx.inbox)
            .resolve(&created.recovery.token)
            .await
            .unwrap();
        assert_eq!(resolved, created.address);

        let decision = fx
            .sessions()
            .check_access(&created.address, Some(&created.session.token), None)
            .await;
        assert!(matches!(
            decision,
            AccessDecision::Granted {
                path: AccessPath::Session,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn generated_local_part_is_used_when_absent() {
        let fx = Fixture::new();
        let created = fx
            .accounts()
            .create_address(None, "mail.test", None, None)
            .await
            .unwrap();
        assert_eq!(created.address.domain(), "mail.test");
        assert!(created.address.local_part().contains('.'));
    }

    #[tokio::test]
    async fn taken_address_is_refused() {
        let fx = Fixture::new();
        fx.accounts()
            .create_address(Some("alice"), "domain", None, None)
            .await
            .unwrap();
        let again = fx
            .accounts()
            .create_address(Some("ALICE"), "domain", None, None)
            .await;
        assert!(matches!(again, Err(MailboxError::AddressTaken(_))));
    }

    #[tokio::test]
    async fn owner_create_is_permanent_and_registered() {
        let fx = Fixture::new();
        let bob = user("user_bob");
        let created = fx
            .accounts()
            .create_address(Some("bob"), "domain", None, Some(&bob))
            .await
            .unwrap();

        assert_eq!(created.retention, Retention::Permanent);
        assert!(created.owned_by_account);
        assert_eq!(created.session.expires_in(), -1);

        let record = fx
            .registry
            .get_address("user_bob", &created.address)
            .unwrap()
            .unwrap();
        assert_eq!(record.recovery_token.as_deref(), Some(created.recovery.token.as_str()));
        assert_eq!(fx.registry.history("user_bob").unwrap().len(), 1);
        assert_eq!(
            fx.accounts().preferences(&bob).unwrap().current_address,
            Some(created.address.clone())
        );
        assert_eq!(
            fx.inbox
                .backend()
                .ttl(&keys::settings(&created.address))
                .await
                .unwrap(),
            KeyTtl::Persistent
        );
    }

    #[tokio::test]
    async fn owner_create_falls_back_to_preference() {
        let fx = Fixture::new();
        let bob = user("user_bob");
        fx.accounts()
            .put_preferences(&bob, Some(Retention::Seconds(86400)), None)
            .unwrap();
        let created = fx
            .accounts()
            .create_address(Some("bob"), "domain", None, Some(&bob))
            .await
            .unwrap();
        assert_eq!(created.retention, Retention::Seconds(86400));
    }

    #[tokio::test]
    async fn associate_requires_token_for_protected_mailbox() {
        let fx = Fixture::new();
        let created = fx
            .accounts()
            .create_address(Some("carol"), "domain", None, None)
            .await
            .unwrap();
        let carol = user("user_carol");

        let denied = fx
            .accounts()
            .associate(&carol, &created.address, None, None)
            .await;
        assert!(matches!(denied, Err(MailboxError::Unauthorized)));

        let other = EmailAddress::parse("carol@otherdomain").unwrap();
        let mismatch = fx
            .accounts()
            .associate(&carol, &other, Some(&created.recovery.token), None)
            .await;
        assert!(matches!(mismatch, Err(MailboxError::RecoveryKeyMismatch)));

        let record = fx
            .accounts()
            .associate(&carol, &created.address, Some(&created.recovery.token), None)
            .await
            .unwrap();
        assert_eq!(record.retention, Retention::Permanent);
        let setting = fx.inbox.settings(&created.address).await.unwrap().unwrap();
        assert!(setting.owned_by_account);

        let mallory = user("user_mallory");
        let stolen = fx
            .accounts()
            .associate(&mallory, &created.address, Some(&created.recovery.token), None)
            .await;
        assert!(matches!(stolen, Err(MailboxError::NotOwned(_))));
    }

    #[tokio::test]
    async fn remove_owned_cascades_for_last_owner() {
        let fx = Fixture::new();
        let bob = user("user_bob");
        let created = fx
            .accounts()
            .create_address(Some("bob"), "domain", None, Some(&bob))
            .await
            .unwrap();

        let mallory = user("user_mallory");
        assert!(matches!(
            fx.accounts().remove_owned(&mallory, &created.address).await,
            Err(MailboxError::NotOwned(_))
        ));

        let report = fx
            .accounts()
            .remove_owned(&bob, &created.address)
            .await
            .unwrap();
        assert!(report.deleted_stores.contains(&"registry".to_string()));
        assert!(fx.registry.list_owned("user_bob").unwrap().is_empty());
        assert!(matches!(
            RecoveryTokens::new(&fx.inbox)
                .resolve(&created.recovery.token)
                .await,
            Err(MailboxError::TokenExpiredOrInvalid)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn owned_permanent_mailbox_outlives_token_ttl() {
        let fx = Fixture::new();
        let bob = user("user_bob");
        let created = fx
            .accounts()
            .create_address(Some("bob"), "domain", None, Some(&bob))
            .await
            .unwrap();

        tokio::time::advance(crate::mailbox::RECOVERY_TOKEN_TTL + std::time::Duration::from_secs(1)).await;

        assert_eq!(
            RecoveryTokens::new(&fx.inbox)
                .resolve(&created.recovery.token)
                .await
                .unwrap(),
            created.address
        );
        assert_eq!(
            fx.sessions().check_access(&created.address, None, None).await,
            AccessDecision::RequiresVerification(VerificationReason::ProtectedMailbox)
        );
    }

    #[tokio::test]
    async fn deleted_address_can_be_claimed_again_without_old_mail() {
        let fx = Fixture::new();
        let bob = user("user_bob");
        let created = fx
            .accounts()
            .create_address(Some("bob"), "domain", None, Some(&bob))
            .await
            .unwrap();
        fx.accounts().remove_owned(&bob, &created.address).await.unwrap();

        let late = crate::storage::InboxMessage {
            id: "late".to_string(),
            from: "x@example.com".to_string(),
            to: created.address.to_string(),
            subject: "after delete".to_string(),
            text: String::new(),
            html: String::new(),
            received_at: Utc::now(),
            read: false,
        };
        fx.inbox
            .prepend_message(&created.address, &late, Retention::Seconds(3600))
            .await
            .unwrap();

        let denied = fx
            .accounts()
            .associate(&user("user_mallory"), &created.address, None, None)
            .await;
        assert!(matches!(denied, Err(MailboxError::Unauthorized)));

        let again = fx
            .accounts()
            .create_address(Some("bob"), "domain", None, None)
            .await
            .unwrap();
        assert!(!fx.inbox.is_retired(&again.address).await.unwrap());
        match fx
            .sessions()
            .check_access(&again.address, Some(&again.session.token), None)
            .await
        {
            AccessDecision::Granted { messages, .. } => assert!(messages.is_empty()),
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    #[tokio::test]
    async fn reconcile_restores_settings_and_prunes_sessions() {
        let fx = Fixture::new();
        let dave = user("user_dave");
        let address = EmailAddress::parse("dave@domain").unwrap();
        fx.registry
            .upsert_address(&AddressRecord::new("user_dave", address.clone(), Retention::Seconds(7200)))
            .unwrap();
        fx.registry
            .replace_session(&OwnerSession {
                owner_user_id: "user_dave".to_string(),
                email: address.clone(),
                session_token: "stale".to_string(),
                created_at: Utc::now() - chrono::Duration::hours(2),
                expires_at: Some(Utc::now() - chrono::Duration::hours(1)),
            })
            .unwrap();

        let report = fx.accounts().reconcile_owner(&dave).await.unwrap();
        assert_eq!(report.pruned_sessions, 1);
        assert_eq!(report.restored_settings, 1);
        assert_eq!(
            fx.inbox.settings(&address).await.unwrap(),
            Some(RetentionSetting::new(Retention::Seconds(7200), true))
        );

        let again = fx.accounts().reconcile_owner(&dave).await.unwrap();
        assert_eq!(again, ReconcileReport::default());
        assert_eq!(fx.accounts().list_owned(&dave).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn migration_verifies_tokens() {
        let fx = Fixture::new();
        let guest = fx
            .accounts()
            .create_address(Some("erin"), "domain", None, None)
            .await
            .unwrap();
        let erin = user("user_erin");
        let visited = EmailAddress::parse("seen@domain").unwrap();

        let report = fx
            .accounts()
            .migrate_guest_data(
                &erin,
                GuestData {
                    tokens: vec![guest.recovery.token.clone(), "bogus.token".to_string(), "noid".to_string()],
                    history: vec![visited.clone()],
                    default_retention: Some(Retention::Seconds(86400)),
                    current_address: Some(guest.address.clone()),
                },
            )
            .await
            .unwrap();

        assert_eq!(report.migrated, vec![guest.address.clone()]);
        assert_eq!(report.rejected, 2);
        assert_eq!(report.history_imported, 1);
        assert!(report.preferences_updated);

        assert!(fx.registry.is_owner("user_erin", &guest.address).unwrap());
        assert_eq!(
            fx.inbox
                .backend()
                .ttl(&keys::recovery(&guest.recovery.token_id))
                .await
                .unwrap(),
            KeyTtl::Persistent
        );
        assert_eq!(
            fx.inbox.settings(&guest.address).await.unwrap(),
            Some(RetentionSetting::new(Retention::Permanent, true))
        );
        let prefs = fx.accounts().preferences(&erin).unwrap();
        assert_eq!(prefs.default_retention, Some(Retention::Seconds(86400)));
        assert_eq!(fx.accounts().history(&erin).unwrap().len(), 2);

        assert_eq!(fx.accounts().remove_history(&erin, Some(&visited)).unwrap(), 1);
        assert_eq!(fx.accounts().remove_history(&erin, None).unwrap(), 1);
    }
}
