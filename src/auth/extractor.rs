// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for account authentication.
//!
//! ```rust,ignore
//! async fn list_addresses(Auth(user): Auth) -> impl IntoResponse { .. }
//! async fn inbox(OptionalAuth(user): OptionalAuth) -> impl IntoResponse { .. }
//! async fn delete_address(AdminOnly(admin): AdminOnly) -> impl IntoResponse { .. }
//! ```
//!
//! Mailbox access itself never depends on an account; accounts only add the
//! owner bypass and the owner-facing endpoints.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, decode_header, Validation};

use super::claims::IdentityClaims;
use super::{AuthError, AuthenticatedUser, JwksManager};
use crate::state::{AppState, AuthConfig};

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Requires a valid account token.
///
/// - **Production mode** (`AUTH_JWKS_URL` set): signature, expiry, issuer and
///   audience are verified against the JWKS.
/// - **Development mode**: structure and expiry only, no signature check.
pub struct Auth(pub AuthenticatedUser);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>().cloned() {
            return Ok(Auth(user));
        }

        let token = bearer_token(parts)?.ok_or(AuthError::MissingAuthHeader)?;
        let user = verify_jwt(token, &state.auth_config).await?;
        Ok(Auth(user))
    }
}

fn bearer_token(parts: &Parts) -> Result<Option<&str>, AuthError> {
    let Some(header) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = header.to_str().map_err(|_| AuthError::InvalidAuthHeader)?;
    let token = value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::InvalidAuthHeader)?;
    Ok(Some(token))
}

async fn verify_jwt(token: &str, auth_config: &AuthConfig) -> Result<AuthenticatedUser, AuthError> {
    match &auth_config.jwks {
        Some(jwks) => verify_jwt_production(token, jwks, auth_config).await,
        None => verify_jwt_development(token),
    }
}

async fn verify_jwt_production(
    token: &str,
    jwks: &JwksManager,
    auth_config: &AuthConfig,
) -> Result<AuthenticatedUser, AuthError> {
    let header = decode_header(token).map_err(|_| AuthError::MalformedToken)?;

    let (decoding_key, algorithm) = match &header.kid {
        Some(kid) => jwks.get_decoding_key(kid).await?,
        None => jwks.get_any_decoding_key().await?,
    };

    let mut validation = Validation::new(algorithm);
    validation.leeway = CLOCK_SKEW_LEEWAY;
    if let Some(issuer) = &auth_config.issuer {
        validation.set_issuer(&[issuer]);
    }
    match &auth_config.audience {
        Some(audience) => validation.set_audience(&[audience]),
        None => validation.validate_aud = false,
    }

    let token_data = decode::<IdentityClaims>(token, &decoding_key, &validation)?;
    Ok(AuthenticatedUser::from_claims(token_data.claims))
}

/// WARNING: development only, the signature is not checked.
fn verify_jwt_development(token: &str) -> Result<AuthenticatedUser, AuthError> {
    let token_data = jsonwebtoken::dangerous::insecure_decode::<IdentityClaims>(token)
        .map_err(|_| AuthError::MalformedToken)?;
    let claims = token_data.claims;

    let now = chrono::Utc::now().timestamp();
    if claims.exp > 0 && claims.exp < now - CLOCK_SKEW_LEEWAY as i64 {
        return Err(AuthError::TokenExpired);
    }
    if claims.sub.is_empty() {
        return Err(AuthError::MalformedToken);
    }

    Ok(AuthenticatedUser::from_claims(claims))
}

/// Requires the admin role.
pub struct AdminOnly(pub AuthenticatedUser);

impl FromRequestParts<AppState> for AdminOnly {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Auth(user) = Auth::from_request_parts(parts, state).await?;

        if !user.is_admin() {
            tracing::warn!(user_id = %user.user_id, "Non-admin attempted admin operation");
            return Err(AuthError::InsufficientPermissions);
        }

        Ok(AdminOnly(user))
    }
}

/// Account if one is presented.
///
/// No header means `None`. A header that is present but invalid is still
/// rejected, so a broken token never silently downgrades to guest access.
pub struct OptionalAuth(pub Option<AuthenticatedUser>);

impl FromRequestParts<AppState> for OptionalAuth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>().cloned() {
            return Ok(OptionalAuth(Some(user)));
        }
        match bearer_token(parts)? {
            Some(token) => Ok(OptionalAuth(Some(verify_jwt(token, &state.auth_config).await?))),
            None => Ok(OptionalAuth(None)),
        }
    }
}
