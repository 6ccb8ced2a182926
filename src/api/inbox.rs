// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Inbox reads.

use axum::{
    extract::{Query, State},
    Json,
};

use super::parse_address;
use crate::{
    auth::OptionalAuth,
    error::ApiError,
    mailbox::AccessDecision,
    models::{InboxQuery, InboxResponse},
    state::AppState,
};

impl From<AccessDecision> for InboxResponse {
    fn from(decision: AccessDecision) -> Self {
        match decision {
            AccessDecision::Granted { messages, .. } => Self::Emails { emails: messages },
            AccessDecision::RequiresVerification(reason) => Self::RequiresVerification {
                requires_verification: true,
                reason,
            },
            // Keep clients polling through store hiccups.
            AccessDecision::Degraded => Self::Emails { emails: Vec::new() },
        }
    }
}

/// Read an inbox, newest message first.
///
/// Owners read without a session. Everyone else needs a session for
/// protected mailboxes; without one the response asks for verification
/// instead of returning messages.
#[utoipa::path(
    get,
    path = "/v1/inbox",
    tag = "Inbox",
    params(InboxQuery),
    responses(
        (status = 200, description = "Messages, or a verification request", body = InboxResponse),
        (status = 400, description = "Address required")
    )
)]
pub async fn get_inbox(
    State(state): State<AppState>,
    OptionalAuth(caller): OptionalAuth,
    Query(query): Query<InboxQuery>,
) -> Result<Json<InboxResponse>, ApiError> {
    let raw = query
        .address
        .as_deref()
        .filter(|a| !a.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Address required"))?;
    let address = parse_address(raw)?;

    let decision = state
        .sessions()
        .check_access(&address, query.session.as_deref(), caller.as_ref())
        .await;
    if let AccessDecision::Granted { path, messages } = &decision {
        tracing::debug!(address = %address, ?path, count = messages.len(), "Inbox read");
    }
    Ok(Json(decision.into()))
}
