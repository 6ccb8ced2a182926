// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Realtime "new message" notifications.
//!
//! Publishing is fire-and-forget: a slow or failing provider never fails or
//! delays ingestion beyond [`PUBLISH_TIMEOUT`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use url::Url;
use utoipa::ToSchema;

use super::EmailAddress;

pub const DEFAULT_ABLY_REST_URL: &str = "https://rest.ably.io";

/// Event name clients subscribe to.
pub const NEW_MESSAGE_EVENT: &str = "new-email";

pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(3);

/// Summary pushed to subscribers of an inbox channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewMessageEvent {
    pub id: String,
    pub from: String,
    pub subject: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("base url cannot carry a path: {0}")]
    BaseUrl(String),
    #[error("api key must look like `name:secret`")]
    InvalidApiKey,
    #[error("provider rejected publish with HTTP {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn is_enabled(&self) -> bool;

    async fn publish(&self, channel: &str, event: &NewMessageEvent) -> Result<(), NotifyError>;
}

/// Channel name for an inbox: `inbox:` plus the address with `@` and `.`
/// replaced by `_`.
pub fn inbox_channel(address: &EmailAddress) -> String {
    let flattened: String = address
        .as_str()
        .chars()
        .map(|c| if matches!(c, '@' | '.') { '_' } else { c })
        .collect();
    format!("inbox:{flattened}")
}

/// Publish and log the outcome. Never fails.
pub async fn notify_best_effort(notifier: &dyn Notifier, address: &EmailAddress, event: &NewMessageEvent) {
    if !notifier.is_enabled() {
        return;
    }
    let channel = inbox_channel(address);
    match tokio::time::timeout(PUBLISH_TIMEOUT, notifier.publish(&channel, event)).await {
        Ok(Ok(())) => tracing::debug!(channel = %channel, message_id = %event.id, "Published new message event"),
        Ok(Err(e)) => tracing::warn!(channel = %channel, error = %e, "Realtime publish failed"),
        Err(_) => tracing::warn!(channel = %channel, "Realtime publish timed out"),
    }
}

/// Used when no realtime provider is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn publish(&self, _channel: &str, _event: &NewMessageEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Ably REST publisher.
pub struct AblyNotifier {
    client: reqwest::Client,
    base_url: Url,
    key_name: String,
    key_secret: String,
}

impl AblyNotifier {
    pub fn new(api_key: &str) -> Result<Self, NotifyError> {
        Self::with_base_url(api_key, DEFAULT_ABLY_REST_URL)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Result<Self, NotifyError> {
        let (name, secret) = api_key
            .trim()
            .split_once(':')
            .filter(|(name, secret)| !name.is_empty() && !secret.is_empty())
            .ok_or(NotifyError::InvalidApiKey)?;
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(NotifyError::BaseUrl(base_url.to_string()));
        }
        let client = reqwest::Client::builder().timeout(PUBLISH_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url,
            key_name: name.to_string(),
            key_secret: secret.to_string(),
        })
    }

    fn messages_url(&self, channel: &str) -> Result<Url, NotifyError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| NotifyError::BaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["channels", channel, "messages"]);
        Ok(url)
    }
}

#[async_trait]
impl Notifier for AblyNotifier {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn publish(&self, channel: &str, event: &NewMessageEvent) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.messages_url(channel)?)
            .basic_auth(&self.key_name, Some(&self.key_secret))
            .json(&serde_json::json!({ "name": NEW_MESSAGE_EVENT, "data": event }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}
