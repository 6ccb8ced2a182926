// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # HTTP API
//!
//! Axum handlers for the mailbox, account and admin endpoints, plus the
//! OpenAPI document served at `/docs`. Handlers parse and validate input,
//! then hand off to the request-scoped services on [`AppState`].

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{AuthenticatedUser, Role},
    error::ApiError,
    mailbox::{
        BatchPersistReport, CleanupReport, EmailAddress, InboundPayload, MailboxError,
        PersistReport, Retention, SessionCheck, VerificationReason,
    },
    models::{
        AddHistoryRequest, AddressBody, AddressSource, AdminAddressItem, AdminAddressList,
        AssociateAddressRequest, CreateAddressRequest, CreateAddressResponse,
        CreateSessionRequest, CreateSessionResponse, HistoryItem, HistoryResponse, InboxResponse,
        IssueRecoveryRequest, IssueRecoveryResponse, MigrateRequest, MigrateResponse,
        OwnedAddress, OwnedAddressList, OwnerSessionRequest, OwnerSessionResponse,
        OwnerSessionView, PreferencesBody, RecoveryLookupResponse, RemovedResponse,
        ResolveRecoveryResponse, RevokeSessionResponse, SessionFailure, SettingsResponse,
        UpdateSettingsRequest, VerifySessionResponse, WebhookResponse,
    },
    state::AppState,
    storage::InboxMessage,
};

pub mod access;
pub mod account;
pub mod addresses;
pub mod admin;
pub mod health;
pub mod inbox;
pub mod recovery;
pub mod settings;
pub mod users;
pub mod webhook;

/// Build the full application router.
///
/// Public mailbox routes live under `/v1`, account routes under `/v1/user`
/// and admin routes under `/v1/admin`. Health checks stay at the root so
/// load balancers need no version prefix.
pub fn router(state: AppState) -> Router {
    let user_routes = Router::new()
        .route(
            "/addresses",
            get(account::list_addresses)
                .post(account::associate_address)
                .delete(account::remove_address),
        )
        .route(
            "/sessions",
            get(account::get_owner_session)
                .post(account::store_owner_session)
                .delete(account::delete_owner_session),
        )
        .route("/migrate", post(account::migrate))
        .route(
            "/history",
            get(account::get_history)
                .post(account::add_history)
                .delete(account::remove_history),
        )
        .route(
            "/preferences",
            get(account::get_preferences).put(account::put_preferences),
        );

    let admin_routes = Router::new()
        .route(
            "/addresses",
            get(admin::list_addresses).delete(admin::delete_address),
        )
        .route("/inbox", get(admin::read_inbox))
        .route(
            "/persist",
            post(admin::persist_address).patch(admin::persist_all),
        );

    let v1_routes = Router::new()
        .route("/addresses", post(addresses::create_address))
        .route(
            "/recovery",
            get(recovery::resolve_token).post(recovery::issue_token),
        )
        .route("/recovery/lookup", get(recovery::lookup_token))
        .route(
            "/verify-access",
            get(access::verify_session)
                .post(access::create_session)
                .delete(access::revoke_session),
        )
        .route("/inbox", get(inbox::get_inbox))
        .route(
            "/settings",
            get(settings::get_settings).post(settings::update_settings),
        )
        .route("/webhook", post(webhook::receive))
        .route("/users/me", get(users::get_current_user))
        .nest("/user", user_routes)
        .nest("/admin", admin_routes);

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

// =============================================================================
// Shared handler helpers
// =============================================================================

/// Parse and normalize an address from a request, as a 400 on failure.
pub(crate) fn parse_address(raw: &str) -> Result<EmailAddress, ApiError> {
    EmailAddress::parse(raw).map_err(|e| MailboxError::InvalidAddress(e).into())
}

/// Wire retention (`-1` or positive seconds) to the domain type.
pub(crate) fn parse_retention(seconds: Option<i64>) -> Result<Option<Retention>, ApiError> {
    seconds
        .map(Retention::from_seconds)
        .transpose()
        .map_err(|e| MailboxError::InvalidRetention(e).into())
}

/// Proof of access to a mailbox: account ownership or a live session for it.
pub(crate) async fn require_mailbox_access(
    state: &AppState,
    address: &EmailAddress,
    session: Option<&str>,
    caller: Option<&AuthenticatedUser>,
) -> Result<(), ApiError> {
    if let Some(user) = caller {
        if state.is_owner(&user.user_id, address)? {
            return Ok(());
        }
    }
    if let Some(token) = session.map(str::trim).filter(|t| !t.is_empty()) {
        if let SessionCheck::Verified(_) = state.sessions().verify_session(address, token).await? {
            return Ok(());
        }
    }
    Err(MailboxError::Unauthorized.into())
}

// =============================================================================
// OpenAPI
// =============================================================================

struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        addresses::create_address,
        recovery::issue_token,
        recovery::resolve_token,
        recovery::lookup_token,
        access::create_session,
        access::verify_session,
        access::revoke_session,
        inbox::get_inbox,
        settings::update_settings,
        settings::get_settings,
        webhook::receive,
        users::get_current_user,
        account::list_addresses,
        account::associate_address,
        account::remove_address,
        account::get_owner_session,
        account::store_owner_session,
        account::delete_owner_session,
        account::migrate,
        account::get_history,
        account::add_history,
        account::remove_history,
        account::get_preferences,
        account::put_preferences,
        admin::list_addresses,
        admin::delete_address,
        admin::read_inbox,
        admin::persist_address,
        admin::persist_all
    ),
    components(
        schemas(
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            users::UserMeResponse,
            Role,
            CreateAddressRequest,
            CreateAddressResponse,
            IssueRecoveryRequest,
            IssueRecoveryResponse,
            ResolveRecoveryResponse,
            RecoveryLookupResponse,
            CreateSessionRequest,
            CreateSessionResponse,
            VerifySessionResponse,
            RevokeSessionResponse,
            SessionFailure,
            InboxResponse,
            InboxMessage,
            VerificationReason,
            UpdateSettingsRequest,
            SettingsResponse,
            InboundPayload,
            WebhookResponse,
            AssociateAddressRequest,
            OwnedAddress,
            OwnedAddressList,
            OwnerSessionRequest,
            OwnerSessionResponse,
            OwnerSessionView,
            MigrateRequest,
            MigrateResponse,
            HistoryItem,
            HistoryResponse,
            AddHistoryRequest,
            RemovedResponse,
            PreferencesBody,
            AddressSource,
            AdminAddressItem,
            AdminAddressList,
            AddressBody,
            CleanupReport,
            PersistReport,
            BatchPersistReport
        )
    ),
    modifiers(&BearerSecurity),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Addresses", description = "Disposable address creation"),
        (name = "Recovery", description = "Recovery tokens"),
        (name = "Access", description = "Mailbox sessions"),
        (name = "Inbox", description = "Reading messages"),
        (name = "Settings", description = "Retention settings"),
        (name = "Webhook", description = "Inbound mail from the provider"),
        (name = "Users", description = "Signed-in identity"),
        (name = "Account", description = "Owned addresses, sessions, history and preferences"),
        (name = "Admin", description = "Operator maintenance")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::extractor::tests::create_test_jwt;
    use crate::state::AuthConfig;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_app() -> Router {
        let state = AppState::in_memory().unwrap().with_auth_config(AuthConfig {
            jwks: None,
            issuer: Some("test".to_string()),
            audience: None,
        });
        router(state)
    }

    async fn send_raw(
        app: &Router,
        method: Method,
        uri: &str,
        bearer: Option<&str>,
        content_type: Option<&str>,
        body: Body,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        let response = app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        match body {
            Some(body) => {
                send_raw(
                    app,
                    method,
                    uri,
                    bearer,
                    Some("application/json"),
                    Body::from(body.to_string()),
                )
                .await
            }
            None => send_raw(app, method, uri, bearer, None, Body::empty()).await,
        }
    }

    async fn create_guest(app: &Router, local_part: &str) -> Value {
        let (status, body) = send(
            app,
            Method::POST,
            "/v1/addresses",
            None,
            Some(json!({ "localPart": local_part, "domain": "example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body
    }

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let app = test_app();
        let _ = app.into_make_service();
    }

    #[test]
    fn openapi_document_lists_bearer_scheme() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer"));
        assert!(doc.paths.paths.contains_key("/v1/webhook"));
    }

    #[tokio::test]
    async fn health_is_served_at_root() {
        let app = test_app();
        let (status, body) = send(&app, Method::GET, "/health/live", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn guest_inbox_is_gated_until_a_session_is_presented() {
        let app = test_app();
        let created = create_guest(&app, "alice").await;
        assert_eq!(created["address"], "alice@example.com");
        assert_eq!(created["retentionSeconds"], 3600);
        assert_eq!(created["ownedByAccount"], false);
        let session = created["sessionToken"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            Method::GET,
            "/v1/inbox?address=alice@example.com",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["requiresVerification"], true);
        assert_eq!(body["reason"], "protected_mailbox");

        let (status, _) = send(
            &app,
            Method::POST,
            "/v1/webhook",
            None,
            Some(json!({
                "from": "Sender <sender@other.org>",
                "to": "Alice <alice@example.com>",
                "subject": "Welcome",
                "text": "hello"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let uri = format!("/v1/inbox?address=alice@example.com&session={session}");
        let (status, body) = send(&app, Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        let emails = body["emails"].as_array().unwrap();
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0]["subject"], "Welcome");

        let (_, body) = send(
            &app,
            Method::GET,
            "/v1/inbox?address=alice@example.com&session=bogus",
            None,
            None,
        )
        .await;
        assert_eq!(body["reason"], "session_invalid");
    }

    #[tokio::test]
    async fn recovery_key_opens_a_new_session() {
        let app = test_app();
        let created = create_guest(&app, "bob").await;
        let token = created["recoveryToken"].as_str().unwrap();

        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/verify-access",
            None,
            Some(json!({ "email": "bob@example.com", "recoveryKey": token })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isPermanent"], false);
        let session = body["sessionToken"].as_str().unwrap();

        let uri = format!("/v1/verify-access?email=bob@example.com&session={session}");
        let (_, body) = send(&app, Method::GET, &uri, None, None).await;
        assert_eq!(body["verified"], true);

        create_guest(&app, "carol").await;
        let (status, _) = send(
            &app,
            Method::POST,
            "/v1/verify-access",
            None,
            Some(json!({ "email": "carol@example.com", "recoveryKey": token })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn webhook_accepts_form_bodies() {
        let app = test_app();
        let (status, body) = send_raw(
            &app,
            Method::POST,
            "/v1/webhook",
            None,
            Some("application/x-www-form-urlencoded"),
            Body::from("from=s%40other.org&recipient=dave%40example.com&subject=Hi&body-plain=plain"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["address"], "dave@example.com");

        // Never protected, so readable without a session.
        let (_, body) = send(&app, Method::GET, "/v1/inbox?address=dave@example.com", None, None).await;
        let emails = body["emails"].as_array().unwrap();
        assert_eq!(emails[0]["text"], "plain");
    }

    #[tokio::test]
    async fn webhook_accepts_multipart_and_skips_attachments() {
        let app = test_app();
        let body = concat!(
            "--XYZ\r\n",
            "Content-Disposition: form-data; name=\"from\"\r\n\r\n",
            "s@other.org\r\n",
            "--XYZ\r\n",
            "Content-Disposition: form-data; name=\"attachment-1\"; filename=\"a.bin\"\r\n",
            "Content-Type: application/octet-stream\r\n\r\n",
            "binarydata\r\n",
            "--XYZ\r\n",
            "Content-Disposition: form-data; name=\"to\"\r\n\r\n",
            "erin@example.com\r\n",
            "--XYZ--\r\n"
        );
        let (status, body) = send_raw(
            &app,
            Method::POST,
            "/v1/webhook",
            None,
            Some("multipart/form-data; boundary=XYZ"),
            Body::from(body),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["address"], "erin@example.com");
    }

    #[tokio::test]
    async fn webhook_rejects_unknown_content_and_missing_fields() {
        let app = test_app();
        let (status, _) = send_raw(
            &app,
            Method::POST,
            "/v1/webhook",
            None,
            Some("text/plain"),
            Body::from("hello"),
        )
        .await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/webhook",
            None,
            Some(json!({ "from": "s@other.org" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn guests_cannot_raise_retention() {
        let app = test_app();
        let created = create_guest(&app, "frank").await;
        let session = created["sessionToken"].as_str().unwrap();
        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/settings",
            None,
            Some(json!({
                "address": "frank@example.com",
                "retentionSeconds": -1,
                "session": session,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["retentionSeconds"], 3600);
        assert_eq!(body["ownedByAccount"], false);
    }

    #[tokio::test]
    async fn protected_guest_settings_need_a_session() {
        let app = test_app();
        create_guest(&app, "heidi").await;
        for body in [
            json!({ "address": "heidi@example.com", "retentionSeconds": 60 }),
            json!({ "address": "heidi@example.com", "session": "bogus" }),
        ] {
            let (status, _) = send(&app, Method::POST, "/v1/settings", None, Some(body)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }

        // Never protected, so no session is needed.
        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/settings",
            None,
            Some(json!({ "address": "open@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["retentionSeconds"], 3600);
    }

    #[tokio::test]
    async fn owners_bypass_sessions_and_keep_settings() {
        let app = test_app();
        let owner = create_test_jwt("user_1", None);
        let stranger = create_test_jwt("user_2", None);

        let (status, created) = send(
            &app,
            Method::POST,
            "/v1/addresses",
            Some(&owner),
            Some(json!({ "localPart": "grace", "domain": "example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["ownedByAccount"], true);
        assert_eq!(created["retentionSeconds"], -1);
        assert_eq!(created["sessionExpiresIn"], -1);

        let uri = "/v1/inbox?address=grace@example.com";
        let (_, body) = send(&app, Method::GET, uri, Some(&owner), None).await;
        assert!(body["emails"].is_array());
        let (_, body) = send(&app, Method::GET, uri, Some(&stranger), None).await;
        assert_eq!(body["requiresVerification"], true);

        let (status, _) = send(
            &app,
            Method::POST,
            "/v1/settings",
            None,
            Some(json!({ "address": "grace@example.com", "retentionSeconds": 60 })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(&app, Method::GET, "/v1/user/addresses", Some(&owner), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["emails"][0]["email"], "grace@example.com");
    }

    #[tokio::test]
    async fn account_routes_require_a_bearer_token() {
        let app = test_app();
        let (status, _) = send(&app, Method::GET, "/v1/users/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(&app, Method::GET, "/v1/user/history", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let token = create_test_jwt("user_9", None);
        let (status, body) = send(&app, Method::GET, "/v1/users/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["userId"], "user_9");
    }

    #[tokio::test]
    async fn admin_routes_reject_non_admins() {
        let app = test_app();
        let user = create_test_jwt("user_1", None);
        let (status, _) = send(&app, Method::GET, "/v1/admin/addresses", Some(&user), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn admin_delete_revokes_tokens_and_sessions() {
        let app = test_app();
        let admin = create_test_jwt("admin_1", Some("admin"));
        let created = create_guest(&app, "heidi").await;
        let recovery = created["recoveryToken"].as_str().unwrap().to_string();
        let session = created["sessionToken"].as_str().unwrap().to_string();

        let (status, body) = send(&app, Method::GET, "/v1/admin/addresses", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["total"].as_u64().is_some());

        let (status, report) = send(
            &app,
            Method::DELETE,
            "/v1/admin/addresses?address=heidi@example.com",
            Some(&admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(!report["deletedKeys"].as_array().unwrap().is_empty());

        let uri = format!("/v1/recovery?token={recovery}");
        let (status, _) = send(&app, Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let uri = format!("/v1/verify-access?email=heidi@example.com&session={session}");
        let (_, body) = send(&app, Method::GET, &uri, None, None).await;
        assert_eq!(body["verified"], false);
        assert_eq!(body["reason"], "expired");
    }
}
