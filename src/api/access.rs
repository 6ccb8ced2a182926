// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Mailbox session endpoints (`/v1/verify-access`).

use axum::{
    extract::{Query, State},
    Json,
};

use super::parse_address;
use crate::{
    auth::OptionalAuth,
    error::ApiError,
    mailbox::{MailboxError, SessionCheck},
    models::{
        CreateSessionRequest, CreateSessionResponse, RevokeSessionResponse, SessionFailure,
        SessionQuery, VerifySessionResponse,
    },
    state::AppState,
};

/// Exchange a recovery key for a mailbox session.
///
/// Owners of the address need no key and get a session that does not expire.
#[utoipa::path(
    post,
    path = "/v1/verify-access",
    tag = "Access",
    request_body = CreateSessionRequest,
    responses(
        (status = 200, description = "Session created", body = CreateSessionResponse),
        (status = 400, description = "Missing email or recovery key"),
        (status = 401, description = "Recovery key expired, invalid or for another address")
    )
)]
pub async fn create_session(
    State(state): State<AppState>,
    OptionalAuth(caller): OptionalAuth,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, ApiError> {
    let address = parse_address(&request.email)?;

    let issued = state
        .sessions()
        .create_session(&address, request.recovery_key.as_deref(), caller.as_ref())
        .await
        .map_err(|e| match e {
            // A dead key is a failed credential here, not a missing resource.
            MailboxError::TokenExpiredOrInvalid => {
                ApiError::unauthorized("Recovery key expired or invalid")
            }
            other => other.into(),
        })?;

    Ok(Json(CreateSessionResponse {
        success: true,
        expires_in: issued.expires_in(),
        is_permanent: issued.ttl.is_none(),
        session_token: issued.token,
        email: issued.address.to_string(),
    }))
}

/// Check whether a session token grants access to an address.
#[utoipa::path(
    get,
    path = "/v1/verify-access",
    tag = "Access",
    params(SessionQuery),
    responses(
        (status = 200, description = "Verification result", body = VerifySessionResponse),
        (status = 400, description = "Email and session required")
    )
)]
pub async fn verify_session(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<VerifySessionResponse>, ApiError> {
    let (Some(email), Some(session)) = (query.email.as_deref(), query.session.as_deref()) else {
        return Err(ApiError::bad_request("Email and session required"));
    };
    let address = parse_address(email)?;

    let response = match state.sessions().verify_session(&address, session).await? {
        SessionCheck::Verified(address) => VerifySessionResponse {
            verified: true,
            email: Some(address.to_string()),
            reason: None,
        },
        SessionCheck::Expired => VerifySessionResponse {
            verified: false,
            email: None,
            reason: Some(SessionFailure::Expired),
        },
        SessionCheck::Mismatch => VerifySessionResponse {
            verified: false,
            email: None,
            reason: Some(SessionFailure::Mismatch),
        },
    };
    Ok(Json(response))
}

/// Revoke a session token (sign out of a mailbox).
#[utoipa::path(
    delete,
    path = "/v1/verify-access",
    tag = "Access",
    params(SessionQuery),
    responses(
        (status = 200, description = "Session revoked", body = RevokeSessionResponse),
        (status = 400, description = "Session required")
    )
)]
pub async fn revoke_session(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<RevokeSessionResponse>, ApiError> {
    let session = query
        .session
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Session required"))?;

    let revoked = state.sessions().end_session(session).await?;
    Ok(Json(RevokeSessionResponse {
        success: true,
        revoked,
    }))
}
