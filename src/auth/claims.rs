// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity token claims and the authenticated account.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::roles::Role;

/// Claims read from an account identity token.
///
/// Only `sub` is required. The role comes from a top-level `role` claim,
/// `publicMetadata.role`, or a boolean `isAdmin`, in that order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityClaims {
    pub sub: String,
    #[serde(default)]
    pub exp: i64,
    #[serde(default)]
    pub iss: String,
    #[serde(default)]
    pub sid: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, rename = "isAdmin")]
    pub is_admin: Option<bool>,
    #[serde(default, rename = "publicMetadata")]
    pub public_metadata: Option<PublicMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublicMetadata {
    #[serde(default)]
    pub role: Option<String>,
}

impl IdentityClaims {
    pub fn role(&self) -> Role {
        self.role
            .as_deref()
            .or_else(|| self.public_metadata.as_ref()?.role.as_deref())
            .and_then(Role::parse)
            .or_else(|| self.is_admin.filter(|admin| *admin).map(|_| Role::Admin))
            .unwrap_or_default()
    }
}

/// The signed-in account making a request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedUser {
    /// Stable account id (`sub`)
    pub user_id: String,

    pub role: Role,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(skip)]
    pub issuer: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Token expiry (Unix seconds)
    #[serde(skip)]
    pub expires_at: i64,
}

impl AuthenticatedUser {
    pub fn from_claims(claims: IdentityClaims) -> Self {
        let role = claims.role();
        Self {
            user_id: claims.sub,
            role,
            session_id: claims.sid,
            issuer: claims.iss,
            email: claims.email,
            expires_at: claims.exp,
        }
    }

    pub fn has_role(&self, required: Role) -> bool {
        self.role.has_privilege(required)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(json: &str) -> IdentityClaims {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn from_claims_extracts_identity() {
        let user = AuthenticatedUser::from_claims(claims(
            r#"{"sub":"user_123","exp":1700003600,"iss":"https://id.example.com","sid":"sess_abc","email":"a@b.com"}"#,
        ));
        assert_eq!(user.user_id, "user_123");
        assert_eq!(user.session_id.as_deref(), Some("sess_abc"));
        assert_eq!(user.email.as_deref(), Some("a@b.com"));
        assert_eq!(user.role, Role::User);
    }

    #[test]
    fn role_claim_sources() {
        assert_eq!(claims(r#"{"sub":"u","role":"admin"}"#).role(), Role::Admin);
        assert_eq!(
            claims(r#"{"sub":"u","publicMetadata":{"role":"admin"}}"#).role(),
            Role::Admin
        );
        assert_eq!(claims(r#"{"sub":"u","isAdmin":true}"#).role(), Role::Admin);
        assert_eq!(claims(r#"{"sub":"u","isAdmin":false}"#).role(), Role::User);
        assert_eq!(claims(r#"{"sub":"u","role":"wizard"}"#).role(), Role::User);
    }

    #[test]
    fn serialized_user_hides_token_details() {
        let user = AuthenticatedUser::from_claims(claims(r#"{"sub":"u","iss":"x","exp":5}"#));
        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(value["userId"], "u");
        assert!(value.get("issuer").is_none());
        assert!(value.get("expiresAt").is_none());
    }
}
