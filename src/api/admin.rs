// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Admin-only API endpoints for mailbox maintenance.
//!
//! These endpoints require the Admin role and provide:
//! - A combined view of owned and guest addresses
//! - Inbox inspection without sessions
//! - Cascade deletion of an address
//! - Persisting owned addresses that predate their registry retention
//!
//! Every call is logged with the acting admin's id.

use std::collections::BTreeSet;

use axum::{
    extract::{Query, State},
    Json,
};

use super::parse_address;
use crate::{
    auth::AdminOnly,
    error::ApiError,
    mailbox::{BatchPersistReport, CleanupReport, PersistReport},
    models::{
        AddressBody, AddressQuery, AddressSource, AdminAddressItem, AdminAddressList,
        InboxResponse,
    },
    state::AppState,
};

/// List every known address.
///
/// Registry rows are reported as `user`; addresses that only exist in the
/// ephemeral store are reported as `guest`. A failed store scan still returns
/// the registry rows.
#[utoipa::path(
    get,
    path = "/v1/admin/addresses",
    tag = "Admin",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "All addresses", body = AdminAddressList),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (admin required)")
    )
)]
pub async fn list_addresses(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
) -> Result<Json<AdminAddressList>, ApiError> {
    let records = state.registry.list_all()?;
    let known: BTreeSet<String> = records.iter().map(|r| r.email.to_string()).collect();

    let mut emails: Vec<AdminAddressItem> = records
        .into_iter()
        .map(|record| AdminAddressItem {
            address: record.email.to_string(),
            source: AddressSource::User,
            user_id: Some(record.owner_user_id),
            created_at: Some(record.created_at.to_rfc3339()),
        })
        .collect();

    match state.inbox.inbox_addresses().await {
        Ok(guests) => {
            let guests: BTreeSet<String> = guests
                .into_iter()
                .map(|a| a.to_string())
                .filter(|a| !known.contains(a))
                .collect();
            emails.extend(guests.into_iter().map(|address| AdminAddressItem {
                address,
                source: AddressSource::Guest,
                user_id: None,
                created_at: None,
            }));
        }
        Err(e) => tracing::warn!(error = %e, "Inbox scan failed, listing registry only"),
    }

    emails.sort_by(|a, b| a.address.cmp(&b.address));
    let total = emails.len();
    tracing::info!(admin_id = %admin.user_id, total, "Admin listed addresses");
    Ok(Json(AdminAddressList { emails, total }))
}

/// Delete an address everywhere: registry rows, inbox, settings, tokens
/// and sessions.
#[utoipa::path(
    delete,
    path = "/v1/admin/addresses",
    tag = "Admin",
    security(("bearer" = [])),
    params(AddressQuery),
    responses(
        (status = 200, description = "Cleanup report", body = CleanupReport),
        (status = 403, description = "Not authorized (admin required)")
    )
)]
pub async fn delete_address(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Query(query): Query<AddressQuery>,
) -> Result<Json<CleanupReport>, ApiError> {
    let address = parse_address(&query.address)?;
    let report = state.cascade().delete_address(&address).await?;
    tracing::info!(
        admin_id = %admin.user_id,
        address = %address,
        deleted = report.deleted_keys.len(),
        failed = report.failed_keys.len(),
        "Admin deleted address"
    );
    Ok(Json(report))
}

/// Read any inbox. Store failures return an empty list.
#[utoipa::path(
    get,
    path = "/v1/admin/inbox",
    tag = "Admin",
    security(("bearer" = [])),
    params(AddressQuery),
    responses(
        (status = 200, description = "Messages", body = InboxResponse),
        (status = 403, description = "Not authorized (admin required)")
    )
)]
pub async fn read_inbox(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Query(query): Query<AddressQuery>,
) -> Result<Json<InboxResponse>, ApiError> {
    let address = parse_address(&query.address)?;
    let emails = state.inbox.messages(&address).await.unwrap_or_else(|e| {
        tracing::warn!(address = %address, error = %e, "Admin inbox read failed");
        Vec::new()
    });
    tracing::info!(admin_id = %admin.user_id, address = %address, "Admin read inbox");
    Ok(Json(InboxResponse::Emails { emails }))
}

/// Make one owned address permanent, including every key it owns.
#[utoipa::path(
    post,
    path = "/v1/admin/persist",
    tag = "Admin",
    security(("bearer" = [])),
    request_body = AddressBody,
    responses(
        (status = 200, description = "Persist report", body = PersistReport),
        (status = 403, description = "Not an admin, or the address is a guest address")
    )
)]
pub async fn persist_address(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Json(body): Json<AddressBody>,
) -> Result<Json<PersistReport>, ApiError> {
    let address = parse_address(&body.address)?;
    let report = state.cascade().make_permanent(&address).await?;
    tracing::info!(
        admin_id = %admin.user_id,
        address = %address,
        persisted = report.persisted_keys.len(),
        "Admin persisted address"
    );
    Ok(Json(report))
}

/// Persist every address whose settings mark it as account owned.
#[utoipa::path(
    patch,
    path = "/v1/admin/persist",
    tag = "Admin",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Batch report", body = BatchPersistReport),
        (status = 403, description = "Not authorized (admin required)")
    )
)]
pub async fn persist_all(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
) -> Result<Json<BatchPersistReport>, ApiError> {
    let report = state.cascade().make_all_permanent().await?;
    tracing::info!(
        admin_id = %admin.user_id,
        scanned = report.scanned,
        persisted = report.persisted_count,
        "Admin persisted owned addresses"
    );
    Ok(Json(report))
}
