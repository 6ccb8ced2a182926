// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment once at startup into
//! [`ServerConfig`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `REDIS_URL` | Ephemeral store (inboxes, tokens, sessions) | in-process store |
//! | `REGISTRY_PATH` | redb file holding account-owned addresses | `./data/registry.redb` |
//! | `GUEST_RETENTION_SECONDS` | Inbox and session TTL for guests | `3600` |
//! | `DEFAULT_DOMAIN` | Domain for addresses created without one | `vaultmail.local` |
//! | `ABLY_API_KEY` | Realtime notifications for new messages | disabled |
//! | `AUTH_JWKS_URL` | JWKS endpoint for bearer token verification | Required for production |
//! | `AUTH_ISSUER` | Expected JWT issuer claim | Required for production |
//! | `AUTH_AUDIENCE` | Expected JWT audience claim | Optional |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::mailbox::DEFAULT_GUEST_RETENTION_SECS;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// Redis connection URL. When unset the server keeps ephemeral data in
/// process memory, which does not survive restarts.
pub const REDIS_URL_ENV: &str = "REDIS_URL";

pub const REGISTRY_PATH_ENV: &str = "REGISTRY_PATH";
pub const GUEST_RETENTION_ENV: &str = "GUEST_RETENTION_SECONDS";
pub const DEFAULT_DOMAIN_ENV: &str = "DEFAULT_DOMAIN";
pub const ABLY_API_KEY_ENV: &str = "ABLY_API_KEY";

/// JWKS endpoint. Without it tokens are decoded without signature checks,
/// which is only acceptable in development.
pub const AUTH_JWKS_URL_ENV: &str = "AUTH_JWKS_URL";
pub const AUTH_ISSUER_ENV: &str = "AUTH_ISSUER";
pub const AUTH_AUDIENCE_ENV: &str = "AUTH_AUDIENCE";

pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_REGISTRY_PATH: &str = "./data/registry.redb";
const DEFAULT_DOMAIN: &str = "vaultmail.local";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl LogFormat {
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub redis_url: Option<String>,
    pub registry_path: PathBuf,
    pub guest_retention_secs: u64,
    pub default_domain: String,
    pub ably_api_key: Option<String>,
    pub jwks_url: Option<String>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            redis_url: None,
            registry_path: PathBuf::from(DEFAULT_REGISTRY_PATH),
            guest_retention_secs: DEFAULT_GUEST_RETENTION_SECS,
            default_domain: DEFAULT_DOMAIN.to_string(),
            ably_api_key: None,
            jwks_url: None,
            issuer: None,
            audience: None,
            log_format: LogFormat::Pretty,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let port = match get(PORT_ENV) {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: PORT_ENV,
                value: raw,
            })?,
            None => defaults.port,
        };
        let guest_retention_secs = match get(GUEST_RETENTION_ENV) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: GUEST_RETENTION_ENV,
                        value: raw,
                    })
                }
            },
            None => defaults.guest_retention_secs,
        };

        Ok(Self {
            host: get(HOST_ENV).unwrap_or(defaults.host),
            port,
            redis_url: get(REDIS_URL_ENV),
            registry_path: get(REGISTRY_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or(defaults.registry_path),
            guest_retention_secs,
            default_domain: get(DEFAULT_DOMAIN_ENV)
                .map(|d| d.to_lowercase())
                .unwrap_or(defaults.default_domain),
            ably_api_key: get(ABLY_API_KEY_ENV),
            jwks_url: get(AUTH_JWKS_URL_ENV),
            issuer: get(AUTH_ISSUER_ENV),
            audience: get(AUTH_AUDIENCE_ENV),
            log_format: get(LOG_FORMAT_ENV)
                .map(|f| LogFormat::parse(&f))
                .unwrap_or_default(),
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::Invalid {
                name: HOST_ENV,
                value: self.host.clone(),
            })
    }
}
