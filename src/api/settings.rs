// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Retention settings.

use axum::{
    extract::{Query, State},
    Json,
};

use super::{parse_address, parse_retention, require_mailbox_access};
use crate::{
    auth::OptionalAuth,
    error::ApiError,
    models::{SettingsQuery, SettingsResponse, UpdateSettingsRequest},
    state::AppState,
};

/// Change how long an address keeps its messages.
///
/// Guests always get the guest retention whatever they ask for, and need a
/// live session for a protected mailbox. Owners get the requested value, or
/// permanent when none is given.
#[utoipa::path(
    post,
    path = "/v1/settings",
    tag = "Settings",
    request_body = UpdateSettingsRequest,
    responses(
        (status = 200, description = "Effective retention", body = SettingsResponse),
        (status = 400, description = "Invalid address or retention"),
        (status = 401, description = "Address is protected and no session was presented"),
        (status = 403, description = "Address is owned by another account")
    )
)]
pub async fn update_settings(
    State(state): State<AppState>,
    OptionalAuth(caller): OptionalAuth,
    Json(request): Json<UpdateSettingsRequest>,
) -> Result<Json<SettingsResponse>, ApiError> {
    let address = parse_address(&request.address)?;
    let requested = parse_retention(request.retention_seconds)?;

    // Owned addresses are refused for non-owners by the update itself.
    if !state.registry.is_account_owned(&address)? && state.recovery().is_protected(&address).await? {
        require_mailbox_access(&state, &address, request.session.as_deref(), caller.as_ref())
            .await?;
    }

    let update = state
        .retention()
        .update(&address, requested, caller.as_ref())
        .await?;

    Ok(Json(SettingsResponse {
        address: address.to_string(),
        retention_seconds: update.retention.as_seconds(),
        owned_by_account: update.owned_by_account,
        inbox_updated: Some(update.inbox_updated),
    }))
}

/// Effective retention for an address.
#[utoipa::path(
    get,
    path = "/v1/settings",
    tag = "Settings",
    params(SettingsQuery),
    responses(
        (status = 200, description = "Effective retention", body = SettingsResponse),
        (status = 400, description = "Invalid address")
    )
)]
pub async fn get_settings(
    State(state): State<AppState>,
    Query(query): Query<SettingsQuery>,
) -> Result<Json<SettingsResponse>, ApiError> {
    let address = parse_address(&query.address)?;
    let (retention, owned_by_account) = state.retention().current(&address).await?;

    Ok(Json(SettingsResponse {
        address: address.to_string(),
        retention_seconds: retention.as_seconds(),
        owned_by_account,
        inbox_updated: None,
    }))
}
