// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `{op, args}` exec endpoints.
//!
//! Rejections decided locally (unknown op, confinement, bad arguments) are
//! 400s and quota exhaustion is a 429. Everything the provider side reports
//! is a 200 with `{status: "error"}` so thin clients always get JSON.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::dispatch::{DispatchError, ExecRequest, Surface};
use crate::error::ApiError;
use crate::session::users::User;
use crate::state::AppState;
use crate::transport::auth::CurrentUser;

/// Render a dispatcher failure as the exec envelope.
pub fn error_response(err: DispatchError) -> Response {
    let code = err.code();
    match err {
        DispatchError::NotAllowed(op) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "status": "error", "error": code, "op": op }))).into_response()
        }
        DispatchError::NotImplemented(op) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "status": "error", "error": code, "op": op.as_str() })),
        )
            .into_response(),
        DispatchError::DirNotAllowed(dir) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "status": "error", "error": code, "dir": dir }))).into_response()
        }
        DispatchError::BadArgs(message) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "status": "error", "error": code, "message": message })),
        )
            .into_response(),
        DispatchError::Quota(e) => ApiError::from(e).into_response(),
        DispatchError::TokenMissing(_) => Json(json!({ "status": "error", "error": code })).into_response(),
        DispatchError::Credential(e) => {
            tracing::warn!(err = %e, "credential lookup failed during exec");
            Json(json!({ "status": "error", "error": code, "message": e.to_string() })).into_response()
        }
        DispatchError::Upstream(e) => {
            Json(json!({ "status": "error", "error": code, "message": e.to_string(), "data": e.data() }))
                .into_response()
        }
    }
}

async fn run(s: &AppState, surface: Surface, user: &User, body: Value) -> Response {
    // Malformed bodies read as an empty op, which the allowlist rejects.
    let req: ExecRequest = serde_json::from_value(body).unwrap_or_default();
    let op = req.op.clone();
    match s.dispatcher.exec(surface, user, req).await {
        Ok(data) => Json(json!({ "status": "ok", "data": data })).into_response(),
        Err(e) => {
            tracing::info!(op = %op, user_id = user.id, err = %e, "exec failed");
            error_response(e)
        }
    }
}

/// `POST /mcp/user/exec`
pub async fn user_exec(
    State(s): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<Value>,
) -> Response {
    run(&s, Surface::User, &user, body).await
}

/// `POST /mcp/public/exec`
pub async fn public_exec(
    State(s): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<Value>,
) -> Response {
    run(&s, Surface::Public, &user, body).await
}
