// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for the gateway API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    AuthInvalid,
    NotFound,
    QuotaExceeded,
    TicketExpired,
    TicketMalformed,
    TicketRevoked,
    UploadDirNotAllowed,
    OpNotAllowed,
    OpNotImplemented,
    BadRequest,
    Conflict,
    UpstreamUnavailable,
    UpstreamRejected,
    Internal,
}

impl ErrorCode {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::AuthInvalid => 401,
            Self::NotFound => 404,
            Self::QuotaExceeded => 429,
            Self::TicketExpired => 401,
            Self::TicketMalformed => 400,
            Self::TicketRevoked => 401,
            Self::UploadDirNotAllowed => 400,
            Self::OpNotAllowed => 400,
            Self::OpNotImplemented => 400,
            Self::BadRequest => 400,
            Self::Conflict => 409,
            Self::UpstreamUnavailable => 502,
            Self::UpstreamRejected => 502,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthInvalid => "auth_invalid",
            Self::NotFound => "not_found",
            Self::QuotaExceeded => "quota_exceeded",
            Self::TicketExpired => "ticket_expired",
            Self::TicketMalformed => "ticket_malformed",
            Self::TicketRevoked => "ticket_revoked",
            Self::UploadDirNotAllowed => "upload_dir_not_allowed",
            Self::OpNotAllowed => "op_not_allowed",
            Self::OpNotImplemented => "op_not_implemented",
            Self::BadRequest => "bad_request",
            Self::Conflict => "conflict",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::UpstreamRejected => "upstream_rejected",
            Self::Internal => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let body = ErrorResponse { error: self.to_error_body(message) };
        (self.status_code(), Json(body))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Handler-level error: an [`ErrorCode`] plus a message, rendered as the
/// standard error envelope.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        tracing::error!(err = %err, "internal error");
        Self::new(ErrorCode::Internal, "internal error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.code.to_http_response(self.message).into_response()
    }
}

impl From<crate::db::DbError> for ApiError {
    fn from(err: crate::db::DbError) -> Self {
        Self::internal(err)
    }
}

impl From<crate::signing::SignError> for ApiError {
    fn from(err: crate::signing::SignError) -> Self {
        Self::new(ErrorCode::AuthInvalid, err.to_string())
    }
}

impl From<crate::session::users::UserError> for ApiError {
    fn from(err: crate::session::users::UserError) -> Self {
        use crate::session::users::UserError;
        match err {
            UserError::Duplicate => Self::new(ErrorCode::Conflict, "username already exists"),
            UserError::NotFound => Self::new(ErrorCode::NotFound, "user not found"),
            other => Self::internal(other),
        }
    }
}

impl From<crate::credential::CredentialError> for ApiError {
    fn from(err: crate::credential::CredentialError) -> Self {
        use crate::credential::CredentialError;
        match err {
            CredentialError::Unavailable(e) => Self::new(ErrorCode::UpstreamUnavailable, e.to_string()),
            CredentialError::Provider { error, description, .. } => {
                Self::new(ErrorCode::UpstreamRejected, format!("{error}: {description}"))
            }
            CredentialError::Decode(msg) => Self::new(ErrorCode::UpstreamRejected, msg),
            other => Self::internal(other),
        }
    }
}

impl From<crate::quota::QuotaError> for ApiError {
    fn from(err: crate::quota::QuotaError) -> Self {
        use crate::quota::QuotaError;
        match err {
            QuotaError::Exceeded { used, limit } => {
                Self::new(ErrorCode::QuotaExceeded, format!("daily quota exhausted ({used}/{limit})"))
            }
            other => Self::internal(other),
        }
    }
}

impl From<crate::upstream::UpstreamError> for ApiError {
    fn from(err: crate::upstream::UpstreamError) -> Self {
        use crate::upstream::UpstreamError;
        match err {
            UpstreamError::Unavailable(e) => Self::new(ErrorCode::UpstreamUnavailable, e.to_string()),
            UpstreamError::Rejected { code, message, .. } => {
                Self::new(ErrorCode::UpstreamRejected, format!("errno {code}: {message}"))
            }
            UpstreamError::Local(msg) => Self::new(ErrorCode::BadRequest, msg),
        }
    }
}

impl From<crate::ticket::TicketError> for ApiError {
    fn from(err: crate::ticket::TicketError) -> Self {
        use crate::ticket::TicketError;
        match err {
            TicketError::Expired => Self::new(ErrorCode::TicketExpired, "ticket expired"),
            TicketError::Malformed => Self::new(ErrorCode::TicketMalformed, "ticket malformed"),
            TicketError::Revoked => Self::new(ErrorCode::TicketRevoked, "ticket revoked"),
            TicketError::TokenMissing(scope) => {
                Self::new(ErrorCode::BadRequest, format!("no upstream credential for {scope}"))
            }
            TicketError::Resolve(e) => e.into(),
            TicketError::Credential(e) => e.into(),
            TicketError::Db(e) => e.into(),
        }
    }
}

impl From<crate::proxy::ProxyError> for ApiError {
    fn from(err: crate::proxy::ProxyError) -> Self {
        Self::new(ErrorCode::UpstreamUnavailable, err.to_string())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
