// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Recovery tokens.
//!
//! A token is `{token_id}.{base64url(address)}`. Only the id is looked up; the
//! address half lets a client show which mailbox a pasted token belongs to
//! before asking the server. Both `recovery:{token_id}` and the
//! `email:{address}:token` back-reference carry a 30 day TTL, dropped once
//! the mailbox is owned with permanent retention.

use std::time::Duration;

use base64ct::{Base64UrlUnpadded, Encoding};

use super::secrets::generate_secret;
use super::{EmailAddress, MailboxError, MailboxResult};
use crate::storage::{InboxStore, StoreResult};

pub const RECOVERY_TOKEN_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Human-readable lifetime returned to clients.
pub const RECOVERY_TOKEN_TTL_LABEL: &str = "30 days";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryToken {
    pub token: String,
    pub token_id: String,
    pub address: EmailAddress,
}

/// The id half of a recovery token, if it has the `{id}.{...}` shape.
pub fn token_id(token: &str) -> Option<&str> {
    let (id, _) = token.trim().split_once('.')?;
    (!id.is_empty()).then_some(id)
}

/// The address encoded in the second half of a token, unverified.
pub fn embedded_address(token: &str) -> Option<EmailAddress> {
    let (_, encoded) = token.trim().split_once('.')?;
    let bytes = Base64UrlUnpadded::decode_vec(encoded).ok()?;
    EmailAddress::parse(std::str::from_utf8(&bytes).ok()?).ok()
}

pub struct RecoveryTokens<'a> {
    inbox: &'a InboxStore,
}

impl<'a> RecoveryTokens<'a> {
    pub fn new(inbox: &'a InboxStore) -> Self {
        Self { inbox }
    }

    /// Issue a new token. Earlier tokens for the address stay valid until
    /// their own TTL runs out.
    pub async fn issue(&self, address: &EmailAddress) -> MailboxResult<RecoveryToken> {
        let token_id = generate_secret()?;
        let token = format!(
            "{token_id}.{}",
            Base64UrlUnpadded::encode_string(address.as_str().as_bytes())
        );

        self.inbox
            .put_recovery(&token_id, &token, address, RECOVERY_TOKEN_TTL)
            .await?;

        tracing::info!(address = %address, "Issued recovery token");
        Ok(RecoveryToken {
            token,
            token_id,
            address: address.clone(),
        })
    }

    /// Address a token was issued for.
    pub async fn resolve(&self, token: &str) -> MailboxResult<EmailAddress> {
        let id = token_id(token).ok_or(MailboxError::MalformedToken)?;
        let stored = self
            .inbox
            .recovery_address(id)
            .await?
            .ok_or(MailboxError::TokenExpiredOrInvalid)?;
        EmailAddress::parse(&stored).map_err(|_| MailboxError::TokenExpiredOrInvalid)
    }

    /// Most recent token issued for an address.
    pub async fn lookup_by_address(&self, address: &EmailAddress) -> MailboxResult<String> {
        self.inbox
            .address_token(address)
            .await?
            .ok_or(MailboxError::TokenExpiredOrInvalid)
    }

    /// Whether the mailbox needs proof of access: a recovery token is live,
    /// or the address was deleted.
    pub async fn is_protected(&self, address: &EmailAddress) -> StoreResult<bool> {
        Ok(self.inbox.has_address_token(address).await? || self.inbox.is_retired(address).await?)
    }

    /// Stop the recovery keys of a permanent mailbox from expiring: the latest
    /// token plus `also`, typically the token an owner just presented.
    pub async fn pin(&self, address: &EmailAddress, also: Option<&str>) -> StoreResult<usize> {
        let latest = self.inbox.address_token(address).await?;
        let ids: Vec<&str> = latest
            .as_deref()
            .into_iter()
            .chain(also)
            .filter_map(token_id)
            .collect();
        let persisted = self.inbox.persist_recovery(address, &ids).await?;
        tracing::debug!(address = %address, persisted, "Recovery keys pinned");
        Ok(persisted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{KeyTtl, MemoryStore};
    use std::sync::Arc;

    fn inbox() -> InboxStore {
        InboxStore::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn issued_token_resolves_to_address() {
        let inbox = inbox();
        let tokens = RecoveryTokens::new(&inbox);
        let address = EmailAddress::parse("Alice@Domain.com").unwrap();

        let issued = tokens.issue(&address).await.unwrap();
        assert!(issued.token.starts_with(&issued.token_id));
        assert_eq!(embedded_address(&issued.token), Some(address.clone()));
        assert_eq!(tokens.resolve(&issued.token).await.unwrap(), address);
        assert_eq!(tokens.lookup_by_address(&address).await.unwrap(), issued.token);
        assert!(tokens.is_protected(&address).await.unwrap());

        let ttl = inbox
            .backend()
            .ttl(&crate::storage::keys::recovery(&issued.token_id))
            .await
            .unwrap();
        assert!(matches!(ttl, KeyTtl::Expires(d) if d <= RECOVERY_TOKEN_TTL));
    }

    #[tokio::test]
    async fn reissue_keeps_old_token_valid() {
        let inbox = inbox();
        let tokens = RecoveryTokens::new(&inbox);
        let address = EmailAddress::parse("bob@domain.com").unwrap();

        let first = tokens.issue(&address).await.unwrap();
        let second = tokens.issue(&address).await.unwrap();
        assert_ne!(first.token, second.token);
        assert_eq!(tokens.resolve(&first.token).await.unwrap(), address);
        assert_eq!(tokens.lookup_by_address(&address).await.unwrap(), second.token);
    }

    #[tokio::test]
    async fn unknown_and_malformed_tokens() {
        let inbox = inbox();
        let tokens = RecoveryTokens::new(&inbox);
        assert!(matches!(
            tokens.resolve("nodot").await,
            Err(MailboxError::MalformedToken)
        ));
        assert!(matches!(
            tokens.resolve("unknown.Ym9i").await,
            Err(MailboxError::TokenExpiredOrInvalid)
        ));
        let address = EmailAddress::parse("carol@domain.com").unwrap();
        assert!(matches!(
            tokens.lookup_by_address(&address).await,
            Err(MailboxError::TokenExpiredOrInvalid)
        ));
        assert!(!tokens.is_protected(&address).await.unwrap());
    }

    #[tokio::test]
    async fn deleted_address_stays_protected() {
        let inbox = inbox();
        let tokens = RecoveryTokens::new(&inbox);
        let address = EmailAddress::parse("dave@domain.com").unwrap();
        assert!(!tokens.is_protected(&address).await.unwrap());

        inbox.retire(&address).await.unwrap();
        assert!(tokens.is_protected(&address).await.unwrap());
    }

    #[tokio::test]
    async fn pin_covers_latest_and_presented_tokens() {
        let inbox = inbox();
        let tokens = RecoveryTokens::new(&inbox);
        let address = EmailAddress::parse("erin@domain.com").unwrap();
        let older = tokens.issue(&address).await.unwrap();
        let latest = tokens.issue(&address).await.unwrap();

        assert_eq!(tokens.pin(&address, Some(&older.token)).await.unwrap(), 3);
        let backend = inbox.backend();
        for key in [
            crate::storage::keys::recovery(&older.token_id),
            crate::storage::keys::recovery(&latest.token_id),
            crate::storage::keys::address_token(&address),
        ] {
            assert_eq!(backend.ttl(&key).await.unwrap(), KeyTtl::Persistent, "{key}");
        }
    }

    #[test]
    fn token_id_requires_separator() {
        assert_eq!(token_id("abc.def"), Some("abc"));
        assert_eq!(token_id(".def"), None);
        assert_eq!(token_id("abc"), None);
    }
}
