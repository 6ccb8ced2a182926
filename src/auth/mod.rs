// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Account Authentication
//!
//! Accounts are optional in VaultMail: a guest reaches a mailbox with a
//! recovery key or mailbox session alone. An account token adds ownership
//! (owner bypass, permanent retention) and the admin role.
//!
//! ## Auth Flow
//!
//! 1. The web client signs the user in with the identity provider
//! 2. It sends `Authorization: Bearer <identity JWT>`
//! 3. The server verifies the token against the provider JWKS (cached, 60s
//!    clock skew) and extracts `sub` as the account id plus the role claim

pub mod claims;
pub mod error;
pub mod extractor;
pub mod jwks;
pub mod roles;

pub use claims::AuthenticatedUser;
pub use error::AuthError;
pub use extractor::{AdminOnly, Auth, OptionalAuth};
pub use jwks::JwksManager;
pub use roles::Role;
