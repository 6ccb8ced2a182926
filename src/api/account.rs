// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Account endpoints (`/v1/user/*`).
//!
//! Everything here requires a signed-in user and only touches that user's
//! own registry rows.

use axum::{
    extract::{Query, State},
    Json,
};

use super::{parse_address, parse_retention};
use crate::{
    auth::Auth,
    error::ApiError,
    mailbox::{CleanupReport, GuestData, MailboxError},
    models::{
        AddHistoryRequest, AssociateAddressRequest, EmailQuery, HistoryItem, HistoryResponse,
        MigrateRequest, MigrateResponse, OptionalEmailQuery, OwnedAddress, OwnedAddressList,
        OwnerSessionRequest, OwnerSessionResponse, OwnerSessionView, PreferencesBody,
        RemovedResponse,
    },
    state::AppState,
};

// =============================================================================
// Owned addresses
// =============================================================================

/// List the caller's addresses.
///
/// Derived state is repaired first: expired owner sessions are pruned and
/// missing settings records are restored from the registry.
#[utoipa::path(
    get,
    path = "/v1/user/addresses",
    tag = "Account",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Owned addresses", body = OwnedAddressList),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_addresses(
    State(state): State<AppState>,
    Auth(user): Auth,
) -> Result<Json<OwnedAddressList>, ApiError> {
    let records = state.accounts().list_owned(&user).await?;
    Ok(Json(OwnedAddressList {
        emails: records.into_iter().map(OwnedAddress::from).collect(),
    }))
}

/// Attach an existing address to the caller's account.
#[utoipa::path(
    post,
    path = "/v1/user/addresses",
    tag = "Account",
    security(("bearer" = [])),
    request_body = AssociateAddressRequest,
    responses(
        (status = 200, description = "Address associated", body = OwnedAddress),
        (status = 401, description = "Recovery token missing or for another address"),
        (status = 403, description = "Address is owned by another account"),
        (status = 404, description = "Recovery token expired or invalid")
    )
)]
pub async fn associate_address(
    State(state): State<AppState>,
    Auth(user): Auth,
    Json(request): Json<AssociateAddressRequest>,
) -> Result<Json<OwnedAddress>, ApiError> {
    let address = parse_address(&request.email)?;
    let requested = parse_retention(request.retention_seconds)?;

    let record = state
        .accounts()
        .associate(&user, &address, request.recovery_token.as_deref(), requested)
        .await?;
    Ok(Json(record.into()))
}

/// Remove an address from the caller's account.
///
/// When the caller is the last owner the whole mailbox is deleted.
#[utoipa::path(
    delete,
    path = "/v1/user/addresses",
    tag = "Account",
    security(("bearer" = [])),
    params(EmailQuery),
    responses(
        (status = 200, description = "Address removed", body = CleanupReport),
        (status = 403, description = "Caller does not own the address")
    )
)]
pub async fn remove_address(
    State(state): State<AppState>,
    Auth(user): Auth,
    Query(query): Query<EmailQuery>,
) -> Result<Json<CleanupReport>, ApiError> {
    let address = parse_address(&query.email)?;
    let report = state.accounts().remove_owned(&user, &address).await?;
    Ok(Json(report))
}

// =============================================================================
// Owner sessions
// =============================================================================

/// The caller's stored mailbox session for an address.
#[utoipa::path(
    get,
    path = "/v1/user/sessions",
    tag = "Account",
    security(("bearer" = [])),
    params(EmailQuery),
    responses(
        (status = 200, description = "Stored session, if any", body = OwnerSessionResponse)
    )
)]
pub async fn get_owner_session(
    State(state): State<AppState>,
    Auth(user): Auth,
    Query(query): Query<EmailQuery>,
) -> Result<Json<OwnerSessionResponse>, ApiError> {
    let address = parse_address(&query.email)?;
    let session = state.sessions().owner_session(&user, &address).await?;
    Ok(Json(OwnerSessionResponse {
        session: session.map(OwnerSessionView::from),
    }))
}

/// Store a mailbox session on the caller's account.
///
/// With a `sessionToken` the existing session is kept; without one a new
/// non-expiring session is minted.
#[utoipa::path(
    post,
    path = "/v1/user/sessions",
    tag = "Account",
    security(("bearer" = [])),
    request_body = OwnerSessionRequest,
    responses(
        (status = 200, description = "Session stored", body = OwnerSessionResponse),
        (status = 401, description = "Session expired or for another address"),
        (status = 403, description = "Caller does not own the address")
    )
)]
pub async fn store_owner_session(
    State(state): State<AppState>,
    Auth(user): Auth,
    Json(request): Json<OwnerSessionRequest>,
) -> Result<Json<OwnerSessionResponse>, ApiError> {
    let address = parse_address(&request.email)?;
    let sessions = state.sessions();

    let token = request
        .session_token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());
    let row = match token {
        Some(token) => sessions.record_owner_session(&user, &address, token).await?,
        None => {
            if !state.is_owner(&user.user_id, &address)? {
                return Err(MailboxError::NotOwned(address.to_string()).into());
            }
            sessions.create_session(&address, None, Some(&user)).await?;
            sessions
                .owner_session(&user, &address)
                .await?
                .ok_or_else(|| ApiError::internal("Session was not stored"))?
        }
    };

    Ok(Json(OwnerSessionResponse {
        session: Some(row.into()),
    }))
}

/// Forget the caller's stored session for an address and revoke its token.
#[utoipa::path(
    delete,
    path = "/v1/user/sessions",
    tag = "Account",
    security(("bearer" = [])),
    params(EmailQuery),
    responses(
        (status = 200, description = "Session removed", body = RemovedResponse)
    )
)]
pub async fn delete_owner_session(
    State(state): State<AppState>,
    Auth(user): Auth,
    Query(query): Query<EmailQuery>,
) -> Result<Json<RemovedResponse>, ApiError> {
    let address = parse_address(&query.email)?;
    let removed = state.sessions().end_owner_session(&user, &address).await?;
    Ok(Json(RemovedResponse {
        success: true,
        removed: usize::from(removed),
    }))
}

// =============================================================================
// Guest migration
// =============================================================================

/// Import guest state kept by the client.
///
/// Every recovery token is verified; the address it resolves to is the one
/// attached. Invalid tokens are counted as rejected rather than failing the
/// whole import. Unparseable history entries are skipped.
#[utoipa::path(
    post,
    path = "/v1/user/migrate",
    tag = "Account",
    security(("bearer" = [])),
    request_body = MigrateRequest,
    responses(
        (status = 200, description = "Migration summary", body = MigrateResponse)
    )
)]
pub async fn migrate(
    State(state): State<AppState>,
    Auth(user): Auth,
    Json(request): Json<MigrateRequest>,
) -> Result<Json<MigrateResponse>, ApiError> {
    let history = request
        .history
        .iter()
        .filter_map(|raw| match parse_address(raw) {
            Ok(address) => Some(address),
            Err(_) => {
                tracing::debug!(entry = %raw, "Skipping unparseable history entry");
                None
            }
        })
        .collect();
    let current_address = match request.current_address.as_deref() {
        Some(raw) if !raw.trim().is_empty() => Some(parse_address(raw)?),
        _ => None,
    };

    let data = GuestData {
        tokens: request.tokens.into_values().collect(),
        history,
        default_retention: parse_retention(request.default_retention)?,
        current_address,
    };
    let report = state.accounts().migrate_guest_data(&user, data).await?;

    Ok(Json(MigrateResponse {
        success: true,
        migrated: report.migrated.iter().map(ToString::to_string).collect(),
        rejected: report.rejected,
        history_imported: report.history_imported,
        preferences_updated: report.preferences_updated,
    }))
}

// =============================================================================
// History
// =============================================================================

/// Recently used addresses, newest first.
#[utoipa::path(
    get,
    path = "/v1/user/history",
    tag = "Account",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "History", body = HistoryResponse)
    )
)]
pub async fn get_history(
    State(state): State<AppState>,
    Auth(user): Auth,
) -> Result<Json<HistoryResponse>, ApiError> {
    let entries = state.accounts().history(&user)?;
    Ok(Json(HistoryResponse {
        history: entries.into_iter().map(HistoryItem::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/v1/user/history",
    tag = "Account",
    security(("bearer" = [])),
    request_body = AddHistoryRequest,
    responses(
        (status = 200, description = "Updated history", body = HistoryResponse)
    )
)]
pub async fn add_history(
    State(state): State<AppState>,
    Auth(user): Auth,
    Json(request): Json<AddHistoryRequest>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let address = parse_address(&request.email)?;
    let accounts = state.accounts();
    accounts.add_history(&user, &address)?;
    let entries = accounts.history(&user)?;
    Ok(Json(HistoryResponse {
        history: entries.into_iter().map(HistoryItem::from).collect(),
    }))
}

/// Remove one history entry, or all of them when `email` is omitted.
#[utoipa::path(
    delete,
    path = "/v1/user/history",
    tag = "Account",
    security(("bearer" = [])),
    params(OptionalEmailQuery),
    responses(
        (status = 200, description = "Entries removed", body = RemovedResponse)
    )
)]
pub async fn remove_history(
    State(state): State<AppState>,
    Auth(user): Auth,
    Query(query): Query<OptionalEmailQuery>,
) -> Result<Json<RemovedResponse>, ApiError> {
    let address = match query.email.as_deref() {
        Some(raw) if !raw.trim().is_empty() => Some(parse_address(raw)?),
        _ => None,
    };
    let removed = state.accounts().remove_history(&user, address.as_ref())?;
    Ok(Json(RemovedResponse {
        success: true,
        removed,
    }))
}

// =============================================================================
// Preferences
// =============================================================================

#[utoipa::path(
    get,
    path = "/v1/user/preferences",
    tag = "Account",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Stored preferences", body = PreferencesBody)
    )
)]
pub async fn get_preferences(
    State(state): State<AppState>,
    Auth(user): Auth,
) -> Result<Json<PreferencesBody>, ApiError> {
    Ok(Json(state.accounts().preferences(&user)?.into()))
}

/// Replace the caller's preferences.
#[utoipa::path(
    put,
    path = "/v1/user/preferences",
    tag = "Account",
    security(("bearer" = [])),
    request_body = PreferencesBody,
    responses(
        (status = 200, description = "Stored preferences", body = PreferencesBody),
        (status = 400, description = "Invalid retention or address")
    )
)]
pub async fn put_preferences(
    State(state): State<AppState>,
    Auth(user): Auth,
    Json(body): Json<PreferencesBody>,
) -> Result<Json<PreferencesBody>, ApiError> {
    let default_retention = parse_retention(body.default_retention)?;
    let current_address = match body.current_address.as_deref() {
        Some(raw) if !raw.trim().is_empty() => Some(parse_address(raw)?),
        _ => None,
    };

    let prefs = state
        .accounts()
        .put_preferences(&user, default_retention, current_address)?;
    Ok(Json(prefs.into()))
}
