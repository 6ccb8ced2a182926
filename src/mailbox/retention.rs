// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Retention values, the guest/owner policy, and the stored settings record.
//!
//! On the wire a retention is an integer number of seconds where `-1` means
//! "never expires". Internally it is [`Retention`], so the sentinel never leaks
//! into TTL arithmetic.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Wire value meaning "never expires".
pub const PERMANENT_SENTINEL: i64 = -1;

/// Guest mailbox lifetime when nothing else is configured.
pub const DEFAULT_GUEST_RETENTION_SECS: u64 = 3600;

/// Current version of the serialized settings record.
pub const SETTINGS_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RetentionError {
    #[error("retention must be a positive number of seconds or -1, got {0}")]
    Invalid(i64),
}

/// How long a mailbox and its settings live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Retention {
    Permanent,
    Seconds(u64),
}

impl Retention {
    pub fn from_seconds(seconds: i64) -> Result<Self, RetentionError> {
        match seconds {
            PERMANENT_SENTINEL => Ok(Self::Permanent),
            s if s > 0 => Ok(Self::Seconds(s as u64)),
            s => Err(RetentionError::Invalid(s)),
        }
    }

    pub fn as_seconds(&self) -> i64 {
        match self {
            Self::Permanent => PERMANENT_SENTINEL,
            Self::Seconds(s) => i64::try_from(*s).unwrap_or(i64::MAX),
        }
    }

    /// TTL to apply to keys, `None` when they must persist.
    pub fn ttl(&self) -> Option<Duration> {
        match self {
            Self::Permanent => None,
            Self::Seconds(s) => Some(Duration::from_secs(*s)),
        }
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent)
    }
}

impl TryFrom<i64> for Retention {
    type Error = RetentionError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::from_seconds(value)
    }
}

impl From<Retention> for i64 {
    fn from(value: Retention) -> Self {
        value.as_seconds()
    }
}

/// Decides what retention a mailbox actually gets.
///
/// Guests are always capped to the guest TTL, whatever they request. Owners get
/// what they asked for, or permanent when they ask for nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    guest_ttl: u64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            guest_ttl: DEFAULT_GUEST_RETENTION_SECS,
        }
    }
}

impl RetentionPolicy {
    pub fn new(guest_ttl_secs: u64) -> Self {
        Self {
            guest_ttl: guest_ttl_secs.max(1),
        }
    }

    pub fn guest_retention(&self) -> Retention {
        Retention::Seconds(self.guest_ttl)
    }

    pub fn guest_ttl(&self) -> Duration {
        Duration::from_secs(self.guest_ttl)
    }

    pub fn resolve(&self, owned_by_account: bool, requested: Option<Retention>) -> Retention {
        if owned_by_account {
            requested.unwrap_or(Retention::Permanent)
        } else {
            self.guest_retention()
        }
    }

    /// Effective retention for a mailbox given its stored settings, if any.
    pub fn for_setting(&self, setting: Option<&RetentionSetting>) -> Retention {
        match setting {
            Some(s) => self.resolve(s.owned_by_account, Some(s.retention)),
            None => self.guest_retention(),
        }
    }
}

/// Per-address retention preference stored under `settings:{address}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionSetting {
    pub retention: Retention,
    pub owned_by_account: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("unrecognized settings record: {0}")]
    UnknownShape(String),
    #[error("unsupported settings version {0}")]
    UnsupportedVersion(u32),
    #[error(transparent)]
    Retention(#[from] RetentionError),
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SettingsRecord {
    version: u32,
    retention_seconds: i64,
    owned_by_account: bool,
}

/// Unversioned record written by earlier deployments.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct LegacySettingsRecord {
    retention_seconds: Option<i64>,
    is_logged_in: Option<bool>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredSettings {
    Versioned(SettingsRecord),
    Legacy(LegacySettingsRecord),
}

impl RetentionSetting {
    pub fn new(retention: Retention, owned_by_account: bool) -> Self {
        Self {
            retention,
            owned_by_account,
        }
    }

    pub fn encode(&self) -> String {
        let record = SettingsRecord {
            version: SETTINGS_VERSION,
            retention_seconds: self.retention.as_seconds(),
            owned_by_account: self.owned_by_account,
        };
        // A struct of integers and a bool always serializes.
        serde_json::to_string(&record).unwrap_or_default()
    }

    /// Decode a stored record, migrating the legacy unversioned shape.
    pub fn decode(raw: &str) -> Result<Self, SettingsError> {
        let stored: StoredSettings =
            serde_json::from_str(raw).map_err(|e| SettingsError::UnknownShape(e.to_string()))?;

        match stored {
            StoredSettings::Versioned(record) => {
                if record.version != SETTINGS_VERSION {
                    return Err(SettingsError::UnsupportedVersion(record.version));
                }
                Ok(Self {
                    retention: Retention::from_seconds(record.retention_seconds)?,
                    owned_by_account: record.owned_by_account,
                })
            }
            StoredSettings::Legacy(record) => {
                let retention = match record.retention_seconds {
                    Some(seconds) => Retention::from_seconds(seconds)?,
                    None => Retention::Permanent,
                };
                Ok(Self {
                    retention,
                    owned_by_account: record.is_logged_in.unwrap_or(false),
                })
            }
        }
    }
}
