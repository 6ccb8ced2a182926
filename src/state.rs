// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::JwksManager;
use crate::mailbox::{
    Accounts, CascadeCoordinator, DisabledNotifier, EmailAddress, Ingestion, MailboxSessions,
    Notifier, RecoveryTokens, RetentionPolicy, RetentionSettings,
};
use crate::storage::{AddressRegistry, EphemeralStore, InboxStore, MemoryStore, RedbRegistry, RegistryError};

/// Bearer token verification settings.
///
/// With `jwks` unset, tokens are decoded without signature verification
/// (development mode).
#[derive(Clone, Default)]
pub struct AuthConfig {
    pub jwks: Option<JwksManager>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub inbox: InboxStore,
    pub registry: Arc<dyn AddressRegistry>,
    pub notifier: Arc<dyn Notifier>,
    pub policy: RetentionPolicy,
    pub auth_config: AuthConfig,
    /// Domain used when address creation does not name one.
    pub default_domain: String,
}

impl AppState {
    pub fn new(
        ephemeral: Arc<dyn EphemeralStore>,
        registry: Arc<dyn AddressRegistry>,
        notifier: Arc<dyn Notifier>,
        policy: RetentionPolicy,
    ) -> Self {
        Self {
            inbox: InboxStore::new(ephemeral),
            registry,
            notifier,
            policy,
            auth_config: AuthConfig::default(),
            default_domain: "vaultmail.local".to_string(),
        }
    }

    /// In-process stores only; used by tests and local runs without Redis.
    pub fn in_memory() -> Result<Self, RegistryError> {
        Ok(Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(RedbRegistry::in_memory()?),
            Arc::new(DisabledNotifier),
            RetentionPolicy::default(),
        ))
    }

    pub fn with_auth_config(mut self, auth_config: AuthConfig) -> Self {
        self.auth_config = auth_config;
        self
    }

    pub fn with_default_domain(mut self, domain: impl Into<String>) -> Self {
        self.default_domain = domain.into();
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    // Per-request service views.

    pub fn sessions(&self) -> MailboxSessions<'_> {
        MailboxSessions::new(&self.inbox, self.registry.as_ref(), &self.policy)
    }

    pub fn recovery(&self) -> RecoveryTokens<'_> {
        RecoveryTokens::new(&self.inbox)
    }

    pub fn retention(&self) -> RetentionSettings<'_> {
        RetentionSettings::new(&self.inbox, self.registry.as_ref(), &self.policy)
    }

    pub fn ingestion(&self) -> Ingestion<'_> {
        Ingestion::new(&self.inbox, self.notifier.as_ref(), &self.policy)
    }

    pub fn cascade(&self) -> CascadeCoordinator<'_> {
        CascadeCoordinator::new(&self.inbox, self.registry.as_ref())
    }

    pub fn accounts(&self) -> Accounts<'_> {
        Accounts::new(&self.inbox, self.registry.as_ref(), &self.policy)
    }

    /// Whether `user_id` owns `address` in the registry.
    pub fn is_owner(&self, user_id: &str, address: &EmailAddress) -> Result<bool, RegistryError> {
        self.registry.is_owner(user_id, address)
    }
}
