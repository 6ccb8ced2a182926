// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::mailbox::MailboxError;
use crate::storage::{RegistryError, StoreError};

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn unsupported_media_type(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNSUPPORTED_MEDIA_TYPE, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<MailboxError> for ApiError {
    fn from(err: MailboxError) -> Self {
        use MailboxError::*;

        let status = match &err {
            InvalidAddress(_) | InvalidRecipient(_) | MissingParameters(_) | InvalidRetention(_)
            | MalformedToken => StatusCode::BAD_REQUEST,
            UnsupportedContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            TokenExpiredOrInvalid => StatusCode::NOT_FOUND,
            RecoveryKeyMismatch | SessionExpired | SessionMismatch | Unauthorized => {
                StatusCode::UNAUTHORIZED
            }
            NotOwned(_) | Registry(RegistryError::PermissionDenied { .. }) => StatusCode::FORBIDDEN,
            Registry(RegistryError::NotFound(_)) => StatusCode::NOT_FOUND,
            AddressTaken(_) => StatusCode::CONFLICT,
            Entropy | Store(_) | Registry(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %err, "Request failed");
            // Store details stay in the log.
            return Self::new(status, "Internal server error");
        }
        Self::new(status, err.to_string())
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        MailboxError::from(err).into()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        MailboxError::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}
