// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Mailbox sessions and the inbox access decision.
//!
//! A session token is minted after a recovery key (or account ownership) is
//! proven and stored both ways: `mailbox-session:{token}` → address and
//! `email-session:{address}` → token. Guest sessions expire with the guest
//! TTL; sessions on account-owned addresses do not expire.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use super::recovery::RecoveryTokens;
use super::secrets::generate_secret;
use super::{EmailAddress, MailboxError, MailboxResult, RetentionPolicy};
use crate::auth::AuthenticatedUser;
use crate::storage::{AddressRegistry, InboxMessage, InboxStore, OwnerSession, OwnershipCheck};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedSession {
    pub token: String,
    pub address: EmailAddress,
    /// `None` when the session never expires.
    pub ttl: Option<Duration>,
    pub owned_by_account: bool,
}

impl IssuedSession {
    /// Wire form: seconds, or `-1` for no expiry.
    pub fn expires_in(&self) -> i64 {
        self.ttl.map_or(-1, |ttl| ttl.as_secs() as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCheck {
    Verified(EmailAddress),
    /// Unknown or expired token.
    Expired,
    /// Token is live but grants a different address.
    Mismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VerificationReason {
    SessionInvalid,
    ProtectedMailbox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPath {
    Owner,
    Session,
    Unprotected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Granted {
        path: AccessPath,
        messages: Vec<InboxMessage>,
    },
    RequiresVerification(VerificationReason),
    /// The store could not answer; callers render an empty inbox.
    Degraded,
}

pub struct MailboxSessions<'a> {
    inbox: &'a InboxStore,
    registry: &'a dyn AddressRegistry,
    policy: &'a RetentionPolicy,
}

impl<'a> MailboxSessions<'a> {
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

    fn owns(&self, caller: Option<&AuthenticatedUser>, address: &EmailAddress) -> MailboxResult<bool> {
        match caller {
            Some(user) => Ok(self.registry.is_owner(&user.user_id, address)?),
            None => Ok(false),
        }
    }

    /// Exchange a recovery key (or account ownership) for a session token.
    pub async fn create_session(
        &self,
        address: &EmailAddress,
        recovery_key: Option<&str>,
        caller: Option<&AuthenticatedUser>,
    ) -> MailboxResult<IssuedSession> {
        let owned = self.owns(caller, address)?;

        if !owned {
            let key = recovery_key
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .ok_or_else(|| MailboxError::MissingParameters("recoveryKey".to_string()))?;
            let resolved = match RecoveryTokens::new(self.inbox).resolve(key).await {
                Err(MailboxError::MalformedToken) => Err(MailboxError::TokenExpiredOrInvalid),
                other => other,
            }?;
            if resolved != *address {
                tracing::warn!(address = %address, "Recovery key does not match mailbox");
                return Err(MailboxError::RecoveryKeyMismatch);
            }
        }

        let ttl = (!owned).then(|| self.policy.guest_ttl());
        let token = generate_secret()?;
        self.inbox.put_session(&token, address, ttl).await?;

        if let (true, Some(user)) = (owned, caller) {
            self.store_owner_session(user, address, &token, ttl).await?;
        }

        tracing::info!(address = %address, owned, "Mailbox session created");
        Ok(IssuedSession {
            token,
            address: address.clone(),
            ttl,
            owned_by_account: owned,
        })
    }

    async fn store_owner_session(
        &self,
        user: &AuthenticatedUser,
        address: &EmailAddress,
        token: &str,
        ttl: Option<Duration>,
    ) -> MailboxResult<()> {
        let now = Utc::now();
        let row = OwnerSession {
            owner_user_id: user.user_id.clone(),
            email: address.clone(),
            session_token: token.to_string(),
            created_at: now,
            expires_at: ttl.and_then(|ttl| chrono::Duration::from_std(ttl).ok().map(|d| now + d)),
        };
        if let Some(previous) = self.registry.replace_session(&row)? {
            if previous.session_token != token {
                if let Err(e) = self.inbox.remove_session(&previous.session_token).await {
                    tracing::warn!(address = %address, error = %e, "Failed to revoke replaced session");
                }
            }
        }
        Ok(())
    }

    pub async fn verify_session(
        &self,
        address: &EmailAddress,
        token: &str,
    ) -> MailboxResult<SessionCheck> {
        Ok(match self.inbox.session_address(token.trim()).await? {
            None => SessionCheck::Expired,
            Some(stored) if address.matches(&stored) => SessionCheck::Verified(address.clone()),
            Some(_) => SessionCheck::Mismatch,
        })
    }

    /// Decide whether the caller may read the inbox, and read it if so.
    ///
    /// Order: account owner, then supplied session (an invalid one is final),
    /// then unprotected mailboxes. Store failures degrade instead of erroring.
    /// Addresses that are account-owned or were deleted are never unprotected,
    /// even once their recovery token has expired.
    pub async fn check_access(
        &self,
        address: &EmailAddress,
        session: Option<&str>,
        caller: Option<&AuthenticatedUser>,
    ) -> AccessDecision {
        match self.owns(caller, address) {
            Ok(true) => return self.granted(AccessPath::Owner, address).await,
            Ok(false) => {}
            Err(e) => tracing::warn!(address = %address, error = %e, "Ownership lookup failed"),
        }

        if let Some(token) = session.map(str::trim).filter(|t| !t.is_empty()) {
            return match self.verify_session(address, token).await {
                Ok(SessionCheck::Verified(_)) => self.granted(AccessPath::Session, address).await,
                Ok(_) => AccessDecision::RequiresVerification(VerificationReason::SessionInvalid),
                Err(e) => {
                    tracing::warn!(address = %address, error = %e, "Session lookup failed");
                    AccessDecision::Degraded
                }
            };
        }

        match self.is_open(address).await {
            Ok(true) => self.granted(AccessPath::Unprotected, address).await,
            Ok(false) => AccessDecision::RequiresVerification(VerificationReason::ProtectedMailbox),
            Err(e) => {
                tracing::warn!(address = %address, error = %e, "Protection lookup failed");
                AccessDecision::Degraded
            }
        }
    }

    /// Legacy mailboxes readable without proof: never given a recovery token,
    /// never deleted, and not held by any account.
    async fn is_open(&self, address: &EmailAddress) -> MailboxResult<bool> {
        if RecoveryTokens::new(self.inbox).is_protected(address).await? {
            return Ok(false);
        }
        Ok(!self.registry.is_account_owned(address)?)
    }

    async fn granted(&self, path: AccessPath, address: &EmailAddress) -> AccessDecision {
        let messages = match self.inbox.messages(address).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(address = %address, error = %e, "Inbox read failed");
                Vec::new()
            }
        };
        AccessDecision::Granted { path, messages }
    }

    /// Revoke a session token. Returns whether it existed.
    pub async fn end_session(&self, token: &str) -> MailboxResult<bool> {
        Ok(self.inbox.remove_session(token.trim()).await?.is_some())
    }

    // =========================================================================
    // Owner session rows
    // =========================================================================

    /// Live owner session for an address; expired rows are dropped on read.
    pub async fn owner_session(
        &self,
        user: &AuthenticatedUser,
        address: &EmailAddress,
    ) -> MailboxResult<Option<OwnerSession>> {
        match self.registry.get_session(&user.user_id, address)? {
            Some(row) if row.is_active(Utc::now()) => Ok(Some(row)),
            Some(_) => {
                self.registry.remove_session(&user.user_id, address)?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Attach an existing session token to the owner's account.
    pub async fn record_owner_session(
        &self,
        user: &AuthenticatedUser,
        address: &EmailAddress,
        token: &str,
    ) -> MailboxResult<OwnerSession> {
        if !self.registry.is_owner(&user.user_id, address)? {
            return Err(MailboxError::NotOwned(address.to_string()));
        }
        match self.verify_session(address, token).await? {
            SessionCheck::Verified(_) => {}
            SessionCheck::Expired => return Err(MailboxError::SessionExpired),
            SessionCheck::Mismatch => return Err(MailboxError::SessionMismatch),
        }
        // Owned mailboxes keep their sessions.
        self.inbox.put_session(token.trim(), address, None).await?;
        self.store_owner_session(user, address, token.trim(), None)
            .await?;
        Ok(self
            .registry
            .get_session(&user.user_id, address)
            .verify_owner(user)?)
    }

    pub async fn end_owner_session(
        &self,
        user: &AuthenticatedUser,
        address: &EmailAddress,
    ) -> MailboxResult<bool> {
        let Some(row) = self.registry.remove_session(&user.user_id, address)? else {
            return Ok(false);
        };
        if let Err(e) = self.inbox.remove_session(&row.session_token).await {
            tracing::warn!(address = %address, error = %e, "Failed to revoke owner session token");
        }
        Ok(true)
    }
}
