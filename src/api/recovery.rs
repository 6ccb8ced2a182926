// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Recovery token endpoints.

use axum::{
    extract::{Query, State},
    Json,
};

use super::{parse_address, require_mailbox_access};
use crate::{
    auth::OptionalAuth,
    error::ApiError,
    mailbox::recovery::RECOVERY_TOKEN_TTL_LABEL,
    models::{
        IssueRecoveryRequest, IssueRecoveryResponse, RecoveryLookupQuery, RecoveryLookupResponse,
        RecoveryQuery, ResolveRecoveryResponse,
    },
    state::AppState,
};

/// Issue a recovery token for an address.
///
/// Addresses that are already protected, or owned by an account, need proof
/// of access: ownership or a live mailbox session.
#[utoipa::path(
    post,
    path = "/v1/recovery",
    tag = "Recovery",
    request_body = IssueRecoveryRequest,
    responses(
        (status = 200, description = "Token issued", body = IssueRecoveryResponse),
        (status = 400, description = "Invalid email"),
        (status = 401, description = "Address is protected and no access was proven")
    )
)]
pub async fn issue_token(
    State(state): State<AppState>,
    OptionalAuth(caller): OptionalAuth,
    Json(request): Json<IssueRecoveryRequest>,
) -> Result<Json<IssueRecoveryResponse>, ApiError> {
    let address = parse_address(&request.email)?;

    let protected = state.recovery().is_protected(&address).await?
        || state.registry.is_account_owned(&address)?;
    if protected {
        require_mailbox_access(&state, &address, request.session.as_deref(), caller.as_ref())
            .await?;
    }

    let issued = state.recovery().issue(&address).await?;
    Ok(Json(IssueRecoveryResponse {
        token: issued.token,
        expires_in: RECOVERY_TOKEN_TTL_LABEL.to_string(),
    }))
}

/// Resolve a recovery token to the address it was issued for.
#[utoipa::path(
    get,
    path = "/v1/recovery",
    tag = "Recovery",
    params(RecoveryQuery),
    responses(
        (status = 200, description = "Token is valid", body = ResolveRecoveryResponse),
        (status = 400, description = "Missing or malformed token"),
        (status = 404, description = "Token expired or invalid")
    )
)]
pub async fn resolve_token(
    State(state): State<AppState>,
    Query(query): Query<RecoveryQuery>,
) -> Result<Json<ResolveRecoveryResponse>, ApiError> {
    let token = query
        .token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::bad_request("Token required"))?;

    let address = state.recovery().resolve(token).await?;
    Ok(Json(ResolveRecoveryResponse {
        email: address.to_string(),
    }))
}

/// Latest recovery token for an address, for callers that already have access.
#[utoipa::path(
    get,
    path = "/v1/recovery/lookup",
    tag = "Recovery",
    params(RecoveryLookupQuery),
    responses(
        (status = 200, description = "Token found", body = RecoveryLookupResponse),
        (status = 401, description = "No ownership or session for the address"),
        (status = 404, description = "No live token for the address")
    )
)]
pub async fn lookup_token(
    State(state): State<AppState>,
    OptionalAuth(caller): OptionalAuth,
    Query(query): Query<RecoveryLookupQuery>,
) -> Result<Json<RecoveryLookupResponse>, ApiError> {
    let address = parse_address(&query.email)?;
    require_mailbox_access(&state, &address, query.session.as_deref(), caller.as_ref()).await?;

    let token = state.recovery().lookup_by_address(&address).await?;
    Ok(Json(RecoveryLookupResponse { token }))
}
