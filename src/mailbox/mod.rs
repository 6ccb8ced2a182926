// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Mailbox lifecycle and access control.
//!
//! Services here are short-lived views over the stores held in
//! [`crate::state::AppState`]: handlers build one per request, e.g.
//! `MailboxSessions::new(&state.inbox, state.registry.as_ref(), &state.policy)`.
//!
//! - [`retention`]: guest/owner retention resolution and the settings record
//! - [`recovery`]: recovery token issue and lookup
//! - [`sessions`]: session tokens and the inbox access decision
//! - [`ingest`]: inbound webhook messages
//! - [`settings`]: retention updates written through every store
//! - [`coordinator`]: cascading delete and make-permanent
//! - [`accounts`]: address creation and owner operations

pub mod accounts;
pub mod address;
pub mod coordinator;
pub mod ingest;
pub mod notifier;
pub mod recovery;
pub mod retention;
pub mod secrets;
pub mod sessions;
pub mod settings;

pub use accounts::{Accounts, CreatedAddress, GuestData, MigrationReport, ReconcileReport};
pub use address::{AddressError, EmailAddress};
pub use coordinator::{BatchPersistReport, CascadeCoordinator, CleanupReport, PersistReport};
pub use ingest::{InboundPayload, IngestedMessage, Ingestion};
pub use notifier::{AblyNotifier, DisabledNotifier, Notifier};
pub use recovery::{RecoveryTokens, RECOVERY_TOKEN_TTL};
pub use retention::{
    Retention, RetentionError, RetentionPolicy, RetentionSetting, SettingsError,
    DEFAULT_GUEST_RETENTION_SECS,
};
pub use sessions::{AccessDecision, AccessPath, IssuedSession, MailboxSessions, SessionCheck, VerificationReason};
pub use settings::{RetentionSettings, RetentionUpdate};

use crate::storage::{RegistryError, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("no recipient address found in {0:?}")]
    InvalidRecipient(String),

    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("missing required parameters: {0}")]
    MissingParameters(String),

    #[error(transparent)]
    InvalidRetention(#[from] RetentionError),

    #[error("recovery token expired or invalid")]
    TokenExpiredOrInvalid,

    #[error("malformed recovery token")]
    MalformedToken,

    #[error("recovery key does not match this mailbox")]
    RecoveryKeyMismatch,

    #[error("session expired or invalid")]
    SessionExpired,

    #[error("session does not grant access to this mailbox")]
    SessionMismatch,

    #[error("verification required")]
    Unauthorized,

    #[error("address {0} is not owned by the caller")]
    NotOwned(String),

    #[error("address {0} is already taken")]
    AddressTaken(String),

    #[error("system random source failed")]
    Entropy,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

pub type MailboxResult<T> = Result<T, MailboxError>;
