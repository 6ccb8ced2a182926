// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! VaultMail - Disposable Mailbox Service
//!
//! Throwaway addresses whose inboxes expire on their own. Inbound mail
//! arrives through a provider webhook; reading a protected inbox takes a
//! mailbox session obtained with the address's recovery token, or an account
//! that owns the address.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum) and the OpenAPI document
//! - `auth` - Bearer token identity (JWKS-verified JWT)
//! - `mailbox` - Retention policy, recovery tokens, sessions, ingestion and
//!   cascading deletion
//! - `storage` - Ephemeral store backends (Redis or in-process) and the
//!   durable address registry (redb)

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod mailbox;
pub mod models;
pub mod state;
pub mod storage;
