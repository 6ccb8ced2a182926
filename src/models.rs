// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies for the REST API. Field names are camelCase on
//! the wire. Addresses travel as plain strings and are parsed by the
//! handlers, so a malformed address is a 400 with a useful message rather
//! than a generic deserialization failure.
//!
//! Retention is always expressed in seconds, with `-1` meaning the mailbox
//! never expires.
//!
//! ## Model Categories
//!
//! - **Addresses**: creation and owner association
//! - **Recovery / Access**: recovery tokens and mailbox sessions
//! - **Inbox / Settings**: reading messages and changing retention
//! - **Account**: owner sessions, history, preferences, guest migration
//! - **Admin**: address listing and maintenance

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::mailbox::VerificationReason;
use crate::storage::{AddressRecord, HistoryEntry, InboxMessage, OwnerSession, UserPreferences};

// =============================================================================
// Addresses
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateAddressRequest {
    /// Local part; a `firstname.lastnameNN` name is generated when absent.
    pub local_part: Option<String>,
    /// Domain; the server default when absent.
    pub domain: Option<String>,
    /// Ignored for guests, who always get the guest retention.
    pub retention_seconds: Option<i64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateAddressResponse {
    /// Normalized address.
    pub address: String,
    /// Only shown once; the client must keep it to reopen the mailbox.
    pub recovery_token: String,
    /// Human-readable lifetime, e.g. `30 days`.
    pub recovery_expires_in: String,
    pub session_token: String,
    /// Seconds, or `-1` when the session does not expire.
    pub session_expires_in: i64,
    /// Effective retention, `-1` for permanent.
    pub retention_seconds: i64,
    pub owned_by_account: bool,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssociateAddressRequest {
    pub email: String,
    /// Required unless the mailbox was never protected.
    pub recovery_token: Option<String>,
    /// Falls back to the account's default retention, then permanent.
    pub retention_seconds: Option<i64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OwnedAddress {
    pub email: String,
    pub recovery_token: Option<String>,
    pub retention_seconds: i64,
    /// RFC 3339.
    pub created_at: String,
}

impl From<AddressRecord> for OwnedAddress {
    fn from(record: AddressRecord) -> Self {
        Self {
            email: record.email.to_string(),
            recovery_token: record.recovery_token,
            retention_seconds: record.retention.as_seconds(),
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OwnedAddressList {
    pub emails: Vec<OwnedAddress>,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct EmailQuery {
    pub email: String,
}

// =============================================================================
// Recovery
// =============================================================================

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssueRecoveryRequest {
    pub email: String,
    /// Proof of access for addresses that are already protected.
    pub session: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssueRecoveryResponse {
    /// `{id}.{base64url(address)}`.
    pub token: String,
    pub expires_in: String,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct RecoveryQuery {
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ResolveRecoveryResponse {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct RecoveryLookupQuery {
    pub email: String,
    /// Proof of access; owners may omit it.
    pub session: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RecoveryLookupResponse {
    pub token: String,
}

// =============================================================================
// Access
// =============================================================================

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub email: String,
    /// Not needed when the caller owns the address.
    pub recovery_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub success: bool,
    pub session_token: String,
    pub email: String,
    /// Seconds, or `-1` for a permanent session.
    pub expires_in: i64,
    pub is_permanent: bool,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct SessionQuery {
    pub email: Option<String>,
    pub session: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionFailure {
    /// Unknown or expired token.
    Expired,
    /// Live token for a different address.
    Mismatch,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VerifySessionResponse {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SessionFailure>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RevokeSessionResponse {
    pub success: bool,
    /// Whether the token existed.
    pub revoked: bool,
}

// =============================================================================
// Inbox
// =============================================================================

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct InboxQuery {
    /// Required; optional only so its absence is a 400 with a message.
    pub address: Option<String>,
    pub session: Option<String>,
}

/// Either the messages, or a request to verify first.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(untagged)]
pub enum InboxResponse {
    Emails {
        emails: Vec<InboxMessage>,
    },
    RequiresVerification {
        #[serde(rename = "requiresVerification")]
        requires_verification: bool,
        reason: VerificationReason,
    },
}

// =============================================================================
// Settings
// =============================================================================

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsRequest {
    pub address: String,
    /// `-1` for permanent. Ignored for guests.
    pub retention_seconds: Option<i64>,
    /// Mailbox session; required when the address is protected.
    pub session: Option<String>,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct SettingsQuery {
    pub address: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SettingsResponse {
    pub address: String,
    /// Effective retention after policy was applied.
    pub retention_seconds: i64,
    pub owned_by_account: bool,
    /// Only on updates: whether a live inbox had its TTL changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inbox_updated: Option<bool>,
}

// =============================================================================
// Webhook
// =============================================================================

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub success: bool,
    pub message_id: String,
    /// Normalized recipient the message was filed under.
    pub address: String,
}

// =============================================================================
// Account
// =============================================================================

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OwnerSessionRequest {
    pub email: String,
    /// Existing mailbox session to keep; a new one is minted when absent.
    pub session_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OwnerSessionView {
    pub token: String,
    /// Unix milliseconds, absent for sessions that never expire.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl From<OwnerSession> for OwnerSessionView {
    fn from(session: OwnerSession) -> Self {
        Self {
            token: session.session_token,
            expires_at: session.expires_at.map(|at| at.timestamp_millis()),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OwnerSessionResponse {
    pub session: Option<OwnerSessionView>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MigrateRequest {
    /// Address to recovery token, as kept by the client.
    #[serde(default)]
    pub tokens: BTreeMap<String, String>,
    #[serde(default)]
    pub history: Vec<String>,
    pub default_retention: Option<i64>,
    pub current_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MigrateResponse {
    pub success: bool,
    /// Addresses now attached to the account.
    pub migrated: Vec<String>,
    /// Tokens that were unknown, expired or for another account's address.
    pub rejected: usize,
    pub history_imported: usize,
    pub preferences_updated: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub email: String,
    pub added_at: String,
}

impl From<HistoryEntry> for HistoryItem {
    fn from(entry: HistoryEntry) -> Self {
        Self {
            email: entry.email.to_string(),
            added_at: entry.added_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HistoryResponse {
    pub history: Vec<HistoryItem>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AddHistoryRequest {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct OptionalEmailQuery {
    /// Omit to clear everything.
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RemovedResponse {
    pub success: bool,
    pub removed: usize,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesBody {
    pub default_retention: Option<i64>,
    pub current_address: Option<String>,
}

impl From<UserPreferences> for PreferencesBody {
    fn from(prefs: UserPreferences) -> Self {
        Self {
            default_retention: prefs.default_retention.map(|r| r.as_seconds()),
            current_address: prefs.current_address.map(|a| a.to_string()),
        }
    }
}

// =============================================================================
// Admin
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AddressSource {
    /// Registry row owned by an account.
    User,
    /// Live inbox with no owner.
    Guest,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminAddressItem {
    pub address: String,
    pub source: AddressSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AdminAddressList {
    pub emails: Vec<AdminAddressItem>,
    pub total: usize,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct AddressQuery {
    pub address: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AddressBody {
    pub address: String,
}
