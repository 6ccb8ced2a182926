// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Address creation.

use axum::{extract::State, http::StatusCode, Json};

use super::parse_retention;
use crate::{
    auth::OptionalAuth,
    error::ApiError,
    mailbox::recovery::RECOVERY_TOKEN_TTL_LABEL,
    models::{CreateAddressRequest, CreateAddressResponse},
    state::AppState,
};

/// Create a disposable address.
///
/// The response carries the recovery token (shown to the user once) and a
/// mailbox session so the client can read the inbox right away. Signed-in
/// callers become the owner of the address.
#[utoipa::path(
    post,
    path = "/v1/addresses",
    tag = "Addresses",
    request_body = CreateAddressRequest,
    responses(
        (status = 201, description = "Address created", body = CreateAddressResponse),
        (status = 400, description = "Invalid local part, domain or retention"),
        (status = 409, description = "Address already taken")
    )
)]
pub async fn create_address(
    State(state): State<AppState>,
    OptionalAuth(caller): OptionalAuth,
    Json(request): Json<CreateAddressRequest>,
) -> Result<(StatusCode, Json<CreateAddressResponse>), ApiError> {
    let domain = request
        .domain
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(&state.default_domain)
        .to_string();
    let retention = parse_retention(request.retention_seconds)?;

    let created = state
        .accounts()
        .create_address(request.local_part.as_deref(), &domain, retention, caller.as_ref())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateAddressResponse {
            address: created.address.to_string(),
            recovery_token: created.recovery.token,
            recovery_expires_in: RECOVERY_TOKEN_TTL_LABEL.to_string(),
            session_token: created.session.token.clone(),
            session_expires_in: created.session.expires_in(),
            retention_seconds: created.retention.as_seconds(),
            owned_by_account: created.owned_by_account,
        }),
    ))
}
