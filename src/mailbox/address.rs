// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Disposable address parsing and normalization.
//!
//! Every address that reaches a store goes through [`EmailAddress::parse`],
//! which trims and lowercases it. Store keys, session comparisons and registry
//! rows all rely on that single normalized form.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::secrets::random_index;
use super::MailboxResult;

/// Error returned when a string cannot be used as a mailbox address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,
    #[error("address must contain a single '@' with a local part and a domain: {0}")]
    Malformed(String),
    #[error("address contains forbidden characters: {0}")]
    ForbiddenCharacters(String),
}

/// A normalized (trimmed, lowercased) `local@domain` address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Parse and normalize a bare address.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let normalized = input.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(AddressError::Empty);
        }

        if normalized
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '<' | '>' | ',' | '|'))
        {
            return Err(AddressError::ForbiddenCharacters(normalized));
        }

        let mut parts = normalized.split('@');
        let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(AddressError::Malformed(normalized));
        };
        if local.is_empty() || domain.is_empty() || domain.starts_with('.') || domain.ends_with('.')
        {
            return Err(AddressError::Malformed(normalized));
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn local_part(&self) -> &str {
        self.0.split('@').next().unwrap_or_default()
    }

    pub fn domain(&self) -> &str {
        self.0.rsplit('@').next().unwrap_or_default()
    }

    /// Case-insensitive comparison against a raw stored value.
    pub fn matches(&self, stored: &str) -> bool {
        self.0 == stored.trim().to_lowercase()
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EmailAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EmailAddress> for String {
    fn from(value: EmailAddress) -> Self {
        value.0
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Extract the target mailbox from a possibly decorated recipient header.
///
/// Accepts `Name <addr>`, `"Quoted, Name" <addr>`, `mailto:addr`, bare
/// addresses and comma separated lists (the first address wins). Returns
/// `None` when nothing address-shaped is present.
pub fn extract_recipient(raw: &str) -> Option<EmailAddress> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Some(start) = raw.find('<') {
        if let Some(len) = raw[start + 1..].find('>') {
            let inner = &raw[start + 1..start + 1 + len];
            return EmailAddress::parse(strip_decoration(inner)).ok();
        }
    }

    raw.split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .map(strip_decoration)
        .filter(|token| token.contains('@'))
        .find_map(|token| EmailAddress::parse(token).ok())
}

fn strip_decoration(token: &str) -> &str {
    let token = token.trim().trim_matches(|c| matches!(c, '"' | '\'' | '(' | ')' | '[' | ']'));
    let token = token
        .strip_prefix("mailto:")
        .or_else(|| token.strip_prefix("MAILTO:"))
        .unwrap_or(token);
    token.trim()
}

const FIRST_NAMES: &[&str] = &[
    "andi", "budi", "cahya", "dewi", "fajar", "indra", "maya", "putri", "rizky", "sari",
    "james", "mary", "robert", "linda", "michael", "emily", "daniel", "sarah", "thomas", "emma",
    "oliver", "amelia", "harry", "isla", "jack", "poppy", "george", "freya", "charlie", "lily",
];

const LAST_NAMES: &[&str] = &[
    "pratama", "wijaya", "santoso", "kusuma", "nugroho", "hidayat", "setiawan", "wibowo",
    "smith", "johnson", "brown", "garcia", "miller", "davis", "wilson", "taylor",
    "walker", "wright", "evans", "roberts", "hughes", "clarke", "turner", "cooper",
];

/// Generate a human-looking local part: `firstname.lastnameNN`.
pub fn generate_local_part() -> MailboxResult<String> {
    let first = FIRST_NAMES[random_index(FIRST_NAMES.len())?];
    let last = LAST_NAMES[random_index(LAST_NAMES.len())?];
    let suffix = 10 + random_index(90)?;
    Ok(format!("{first}.{last}{suffix}"))
}
