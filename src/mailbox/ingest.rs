// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Inbound message ingestion.
//!
//! Mail providers post either JSON or form data with provider-specific field
//! names (`recipient`, `body-plain`, `body-html`). [`InboundPayload`] accepts
//! all of them; [`Ingestion::ingest`] stores the message under the recipient's
//! retention and then publishes a realtime event.

use chrono::Utc;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::address::extract_recipient;
use super::notifier::{notify_best_effort, NewMessageEvent, Notifier};
use super::{EmailAddress, MailboxError, MailboxResult, Retention, RetentionPolicy};
use crate::storage::{InboxMessage, InboxStore, StoreError};

pub const DEFAULT_SUBJECT: &str = "(No Subject)";

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct InboundPayload {
    pub from: Option<String>,
    pub to: Option<String>,
    /// Alternate name for `to`.
    pub recipient: Option<String>,
    pub subject: Option<String>,
    pub text: Option<String>,
    #[serde(rename = "body-plain")]
    pub body_plain: Option<String>,
    pub html: Option<String>,
    #[serde(rename = "body-html")]
    pub body_html: Option<String>,
}

impl InboundPayload {
    /// Set a field from a multipart part. Unknown names are ignored.
    pub fn apply_field(&mut self, name: &str, value: String) {
        let slot = match name {
            "from" => &mut self.from,
            "to" => &mut self.to,
            "recipient" => &mut self.recipient,
            "subject" => &mut self.subject,
            "text" => &mut self.text,
            "body-plain" => &mut self.body_plain,
            "html" => &mut self.html,
            "body-html" => &mut self.body_html,
            _ => return,
        };
        *slot = Some(value);
    }

    fn non_empty(value: Option<String>) -> Option<String> {
        value.filter(|v| !v.trim().is_empty())
    }

    fn into_message(self, address: &EmailAddress, raw_to: String, from: String) -> InboxMessage {
        let text = Self::non_empty(self.text)
            .or(Self::non_empty(self.body_plain))
            .unwrap_or_default();
        let html = Self::non_empty(self.html)
            .or(Self::non_empty(self.body_html))
            .unwrap_or_else(|| text.clone());
        tracing::trace!(address = %address, "Normalized inbound payload");
        InboxMessage {
            id: Uuid::new_v4().to_string(),
            from,
            to: raw_to,
            subject: Self::non_empty(self.subject).unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
            text,
            html,
            received_at: Utc::now(),
            read: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestedMessage {
    pub id: String,
    pub address: EmailAddress,
    pub retention: Retention,
}

pub struct Ingestion<'a> {
    inbox: &'a InboxStore,
    notifier: &'a dyn Notifier,
    policy: &'a RetentionPolicy,
}

impl<'a> Ingestion<'a> {
    pub fn new(
        inbox: &'a InboxStore,
        notifier: &'a dyn Notifier,
        policy: &'a RetentionPolicy,
    ) -> Self {
        Self {
            inbox,
            notifier,
            policy,
        }
    }

    pub async fn ingest(&self, mut payload: InboundPayload) -> MailboxResult<IngestedMessage> {
        let raw_to = InboundPayload::non_empty(payload.to.take())
            .or(InboundPayload::non_empty(payload.recipient.take()));
        let from = InboundPayload::non_empty(payload.from.take());
        let (Some(raw_to), Some(from)) = (raw_to, from) else {
            return Err(MailboxError::MissingParameters("from, to".to_string()));
        };

        let address =
            extract_recipient(&raw_to).ok_or_else(|| MailboxError::InvalidRecipient(raw_to.clone()))?;

        let setting = match self.inbox.settings(&address).await {
            Ok(setting) => setting,
            Err(StoreError::Corrupt { key, reason }) => {
                tracing::warn!(key = %key, reason = %reason, "Ignoring unreadable settings, applying guest retention");
                None
            }
            Err(e) => return Err(e.into()),
        };
        let retention = self.policy.for_setting(setting.as_ref());

        let message = payload.into_message(&address, raw_to, from);
        self.inbox
            .prepend_message(&address, &message, retention)
            .await?;

        tracing::info!(
            address = %address,
            message_id = %message.id,
            retention_secs = retention.as_seconds(),
            "Message ingested"
        );

        let event = NewMessageEvent {
            id: message.id.clone(),
            from: message.from.clone(),
            subject: message.subject.clone(),
            received_at: message.received_at,
        };
        notify_best_effort(self.notifier, &address, &event).await;

        Ok(IngestedMessage {
            id: message.id,
            address,
            retention,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::notifier::{DisabledNotifier, NotifyError};
    use crate::mailbox::RetentionSetting;
    use crate::storage::{keys, KeyTtl, MemoryStore};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn inbox() -> InboxStore {
        InboxStore::new(Arc::new(MemoryStore::new()))
    }

    fn payload(to: &str) -> InboundPayload {
        InboundPayload {
            from: Some("Sender <sender@example.com>".to_string()),
            to: Some(to.to_string()),
            subject: Some("Hello".to_string()),
            text: Some("Body".to_string()),
            ..Default::default()
        }
    }

    #[derive(Default)]
    struct RecordingNotifier(Mutex<Vec<String>>);

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn is_enabled(&self) -> bool {
            true
        }

        async fn publish(&self, channel: &str, _event: &NewMessageEvent) -> Result<(), NotifyError> {
            self.0.lock().unwrap().push(channel.to_string());
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        fn is_enabled(&self) -> bool {
            true
        }

        async fn publish(&self, _channel: &str, _event: &NewMessageEvent) -> Result<(), NotifyError> {
            Err(NotifyError::Rejected(500))
        }
    }

    #[tokio::test]
    async fn guest_message_gets_guest_ttl_and_defaults() {
        let inbox = inbox();
        let policy = RetentionPolicy::default();
        let notifier = RecordingNotifier::default();
        let ingestion = Ingestion::new(&inbox, &notifier, &policy);

        let mut p = payload("Alice Doe <Alice@Domain>");
        p.subject = None;
        p.text = None;
        p.body_plain = Some("plain".to_string());
        let stored = ingestion.ingest(p).await.unwrap();

        assert_eq!(stored.address.as_str(), "alice@domain");
        assert_eq!(stored.retention, Retention::Seconds(3600));

        let messages = inbox.messages(&stored.address).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].subject, DEFAULT_SUBJECT);
        assert_eq!(messages[0].text, "plain");
        assert_eq!(messages[0].html, "plain");
        assert!(!messages[0].read);

        match inbox.inbox_ttl(&stored.address).await.unwrap() {
            KeyTtl::Expires(ttl) => assert!(ttl <= Duration::from_secs(3600)),
            other => panic!("expected expiring inbox, got {other:?}"),
        }
        assert_eq!(notifier.0.lock().unwrap().as_slice(), ["inbox:alice_domain"]);
    }

    #[tokio::test]
    async fn owned_permanent_inbox_has_no_ttl() {
        let inbox = inbox();
        let policy = RetentionPolicy::default();
        let address = EmailAddress::parse("carol@domain.com").unwrap();
        inbox
            .put_settings(&address, &RetentionSetting::new(Retention::Permanent, true), None)
            .await
            .unwrap();

        let stored = Ingestion::new(&inbox, &DisabledNotifier, &policy)
            .ingest(payload("carol@domain.com"))
            .await
            .unwrap();
        assert_eq!(stored.retention, Retention::Permanent);
        assert_eq!(inbox.inbox_ttl(&address).await.unwrap(), KeyTtl::Persistent);
    }

    #[tokio::test]
    async fn guest_cannot_claim_permanent_through_settings() {
        let inbox = inbox();
        let policy = RetentionPolicy::default();
        let address = EmailAddress::parse("guest@domain.com").unwrap();
        inbox
            .put_settings(&address, &RetentionSetting::new(Retention::Permanent, false), None)
            .await
            .unwrap();

        let stored = Ingestion::new(&inbox, &DisabledNotifier, &policy)
            .ingest(payload("guest@domain.com"))
            .await
            .unwrap();
        assert_eq!(stored.retention, Retention::Seconds(3600));
    }

    #[tokio::test]
    async fn corrupt_settings_fall_back_to_guest() {
        let inbox = inbox();
        let policy = RetentionPolicy::default();
        let address = EmailAddress::parse("odd@domain.com").unwrap();
        inbox
            .backend()
            .set(&keys::settings(&address), "[1,2,3]", None)
            .await
            .unwrap();

        let stored = Ingestion::new(&inbox, &DisabledNotifier, &policy)
            .ingest(payload("odd@domain.com"))
            .await
            .unwrap();
        assert_eq!(stored.retention, Retention::Seconds(3600));
    }

    #[tokio::test]
    async fn notifier_failure_does_not_fail_ingestion() {
        let inbox = inbox();
        let policy = RetentionPolicy::default();
        let stored = Ingestion::new(&inbox, &FailingNotifier, &policy)
            .ingest(payload("dave@domain.com"))
            .await
            .unwrap();
        assert_eq!(inbox.messages(&stored.address).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_and_invalid_recipients() {
        let inbox = inbox();
        let policy = RetentionPolicy::default();
        let ingestion = Ingestion::new(&inbox, &DisabledNotifier, &policy);

        let mut no_to = payload("x@domain.com");
        no_to.to = None;
        assert!(matches!(
            ingestion.ingest(no_to).await,
            Err(MailboxError::MissingParameters(_))
        ));

        let mut no_from = payload("x@domain.com");
        no_from.from = Some("  ".to_string());
        assert!(matches!(
            ingestion.ingest(no_from).await,
            Err(MailboxError::MissingParameters(_))
        ));

        assert!(matches!(
            ingestion.ingest(payload("undisclosed-recipients:;")).await,
            Err(MailboxError::InvalidRecipient(_))
        ));
    }

    #[tokio::test]
    async fn recipient_field_and_form_names_are_accepted() {
        let inbox = inbox();
        let policy = RetentionPolicy::default();
        let mut p = InboundPayload::default();
        p.apply_field("from", "s@example.com".to_string());
        p.apply_field("recipient", "Eve@Domain.com".to_string());
        p.apply_field("body-html", "<b>hi</b>".to_string());
        p.apply_field("attachment-count", "0".to_string());

        let stored = Ingestion::new(&inbox, &DisabledNotifier, &policy)
            .ingest(p)
            .await
            .unwrap();
        let messages = inbox.messages(&stored.address).await.unwrap();
        assert_eq!(messages[0].html, "<b>hi</b>");
        assert_eq!(messages[0].text, "");
        assert_eq!(messages[0].to, "Eve@Domain.com");
    }

    #[test]
    fn payload_deserializes_provider_names() {
        let p: InboundPayload = serde_json::from_str(
            r#"{"from":"a@b.c","recipient":"d@e.f","body-plain":"x","extra":1}"#,
        )
        .unwrap();
        assert_eq!(p.recipient.as_deref(), Some("d@e.f"));
        assert_eq!(p.body_plain.as_deref(), Some("x"));
    }
}
