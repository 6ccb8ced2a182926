// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Inbound mail webhook.

use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::header::CONTENT_TYPE,
    Form, Json,
};

use crate::{
    error::ApiError,
    mailbox::{InboundPayload, MailboxError},
    models::WebhookResponse,
    state::AppState,
};

/// Body encodings the provider may post.
enum PayloadKind {
    Json,
    Form,
    Multipart,
}

fn payload_kind(content_type: &str) -> Option<PayloadKind> {
    let mime = content_type.split(';').next()?.trim().to_ascii_lowercase();
    match mime.as_str() {
        "application/json" => Some(PayloadKind::Json),
        "application/x-www-form-urlencoded" => Some(PayloadKind::Form),
        "multipart/form-data" => Some(PayloadKind::Multipart),
        _ => None,
    }
}

/// Decode the body by content type. Unknown types are a 415.
async fn read_payload(state: &AppState, request: Request) -> Result<InboundPayload, ApiError> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let malformed = |e: &dyn std::fmt::Display| {
        tracing::debug!(error = %e, "Unreadable webhook body");
        ApiError::from(MailboxError::MissingParameters("from, to".to_string()))
    };

    match payload_kind(&content_type) {
        Some(PayloadKind::Json) => {
            let Json(payload) = Json::<InboundPayload>::from_request(request, state)
                .await
                .map_err(|e| malformed(&e))?;
            Ok(payload)
        }
        Some(PayloadKind::Form) => {
            let Form(payload) = Form::<InboundPayload>::from_request(request, state)
                .await
                .map_err(|e| malformed(&e))?;
            Ok(payload)
        }
        Some(PayloadKind::Multipart) => {
            let mut multipart = Multipart::from_request(request, state)
                .await
                .map_err(|e| malformed(&e))?;
            let mut payload = InboundPayload::default();
            while let Some(field) = multipart.next_field().await.map_err(|e| malformed(&e))? {
                let Some(name) = field.name().map(str::to_string) else {
                    continue;
                };
                // Attachments and provider extras are skipped unread.
                if !matches!(
                    name.as_str(),
                    "from" | "to" | "recipient" | "subject" | "text" | "body-plain" | "html" | "body-html"
                ) {
                    continue;
                }
                let value = field.text().await.map_err(|e| malformed(&e))?;
                payload.apply_field(&name, value);
            }
            Ok(payload)
        }
        None => Err(MailboxError::UnsupportedContentType(content_type).into()),
    }
}

/// Receive an inbound message from the mail provider.
///
/// Accepts JSON, urlencoded or multipart bodies. The message is stored under
/// the recipient's retention; the realtime notification is best effort.
#[utoipa::path(
    post,
    path = "/v1/webhook",
    tag = "Webhook",
    request_body(content = InboundPayload, content_type = "application/json"),
    responses(
        (status = 200, description = "Message stored", body = WebhookResponse),
        (status = 400, description = "Missing parameters or invalid recipient"),
        (status = 415, description = "Unsupported content type")
    )
)]
pub async fn receive(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<WebhookResponse>, ApiError> {
    let payload = read_payload(&state, request).await?;
    let ingested = state.ingestion().ingest(payload).await?;

    Ok(Json(WebhookResponse {
        success: true,
        message_id: ingested.id,
        address: ingested.address.to_string(),
    }))
}
