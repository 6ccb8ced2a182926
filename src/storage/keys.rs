// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key layout for the ephemeral store.
//!
//! ```text
//! inbox:{address}             list of JSON messages, newest first
//! settings:{address}          versioned retention record
//! recovery:{token_id}         address the recovery token was issued for
//! email:{address}:token       latest recovery token issued for the address
//! mailbox-session:{token}     address the session grants access to
//! email-session:{address}     latest session token for the address
//! email:{address}:deleted     marker left by a cascading delete
//! ```
//!
//! Addresses are always the normalized form, so two spellings of one address
//! map to the same keys.

use crate::mailbox::EmailAddress;

pub const INBOX_PREFIX: &str = "inbox:";
pub const SETTINGS_PREFIX: &str = "settings:";
pub const RECOVERY_PREFIX: &str = "recovery:";
pub const SESSION_PREFIX: &str = "mailbox-session:";
pub const ADDRESS_SESSION_PREFIX: &str = "email-session:";

pub fn inbox(address: &EmailAddress) -> String {
    format!("{INBOX_PREFIX}{address}")
}

pub fn settings(address: &EmailAddress) -> String {
    format!("{SETTINGS_PREFIX}{address}")
}

pub fn recovery(token_id: &str) -> String {
    format!("{RECOVERY_PREFIX}{token_id}")
}

pub fn address_token(address: &EmailAddress) -> String {
    format!("email:{address}:token")
}

/// Set once an address has been deleted, so it is never read as unprotected.
pub fn retired(address: &EmailAddress) -> String {
    format!("email:{address}:deleted")
}

pub fn session(token: &str) -> String {
    format!("{SESSION_PREFIX}{token}")
}

pub fn address_session(address: &EmailAddress) -> String {
    format!("{ADDRESS_SESSION_PREFIX}{address}")
}

/// Inverse of the `{prefix}{address}` keys, for scans.
pub fn address_from_key(prefix: &str, key: &str) -> Option<EmailAddress> {
    key.strip_prefix(prefix)
        .and_then(|rest| EmailAddress::parse(rest).ok())
}
