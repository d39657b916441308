// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use serde::Deserialize;

use crate::error::{ApiError, ErrorCode};
use crate::session::users::User;
use crate::session::SessionKind;
use crate::state::AppState;

/// Constant-time string comparison to prevent timing side-channel attacks.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Extract the token from an `Authorization: Bearer` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get("authorization")?.to_str().ok()?;
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Resolve an access session token to its user.
pub async fn authenticate(state: &AppState, token: &str) -> Result<User, ApiError> {
    let user_id = state.sessions.verify(token, SessionKind::Access)?;
    state
        .users
        .by_id(user_id)
        .await?
        .ok_or_else(|| ApiError::new(ErrorCode::AuthInvalid, "user not found"))
}

/// The user behind the request's access token.
pub struct CurrentUser(pub User);

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ApiError::new(ErrorCode::AuthInvalid, "not authenticated"))?;
        Ok(Self(authenticate(state, token).await?))
    }
}

#[derive(Debug, Default, Deserialize)]
struct AdminSecretQuery {
    admin_secret: Option<String>,
}

/// Guard for administrative routes. The secret arrives in the
/// `x-admin-secret` header or the `admin_secret` query parameter.
pub struct AdminAuth;

impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let header = parts.headers.get("x-admin-secret").and_then(|v| v.to_str().ok()).map(str::to_owned);
        let supplied = match header {
            Some(h) => Some(h),
            None => Query::<AdminSecretQuery>::try_from_uri(&parts.uri).ok().and_then(|q| q.0.admin_secret),
        };
        match supplied {
            Some(secret) if constant_time_eq(&secret, &state.config.admin_secret) => Ok(Self),
            _ => Err(ApiError::new(ErrorCode::AuthInvalid, "invalid admin secret")),
        }
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
