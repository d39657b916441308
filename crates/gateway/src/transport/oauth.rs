// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Upstream account linking: device flow, authorization-code callbacks,
//! masked token views and direct token upsert.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::credential::device_code::{initiate_device_auth, poll_device_token, DevicePoll};
use crate::credential::refresh::exchange_code;
use crate::credential::Scope;
use crate::error::{ApiError, ErrorCode};
use crate::notify::{DevicePhase, Notice};
use crate::session::SessionKind;
use crate::state::AppState;
use crate::transport::auth::{AdminAuth, CurrentUser};

#[derive(Debug, Deserialize)]
pub struct DevicePollQuery {
    pub device_code: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: String,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenUpsert {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

async fn notify(s: &AppState, user_id: i64, phase: DevicePhase, data: Value) {
    let delivered = s.notifier.send_to_user(user_id, &Notice::OauthDevice { phase, data }).await;
    tracing::debug!(user_id, ?phase, delivered, "oauth progress pushed");
}

async fn start(s: &AppState, user_id: i64, phase: DevicePhase) -> Result<Response, ApiError> {
    let device = initiate_device_auth(s.tokens.oauth()).await?;
    let data = json!({
        "user_code": device.user_code,
        "device_code": device.device_code,
        "verification_url": device.verification_url,
        "qrcode_url": device.qrcode_url,
        "interval": device.interval,
        "expires_in": device.expires_in,
    });
    notify(s, user_id, phase, data).await;
    Ok(Json(device).into_response())
}

/// One poll round. Grants are stored under `scope`; pending and terminal
/// outcomes are reported in the body.
async fn poll(
    s: &AppState,
    user_id: i64,
    scope: Scope,
    device_code: &str,
    phase: DevicePhase,
) -> Result<Response, ApiError> {
    let outcome = poll_device_token(s.tokens.oauth(), device_code).await?;
    let body = match outcome {
        DevicePoll::Granted { token } => {
            s.tokens.save_grant(scope, &token, None).await?;
            tracing::info!(scope = %scope, "device flow linked account");
            json!({ "status": "ok", "data": s.tokens.masked(scope).await? })
        }
        DevicePoll::Pending => json!({ "status": "pending" }),
        DevicePoll::SlowDown => json!({ "status": "slow_down" }),
        DevicePoll::Failed { error, description } => {
            json!({ "status": "error", "error": error, "error_description": description })
        }
    };
    let status = body.get("status").cloned().unwrap_or(Value::Null);
    let has_access = status == "ok";
    notify(s, user_id, phase, json!({ "status": status, "has_access": has_access })).await;
    Ok(Json(body).into_response())
}

/// `POST /oauth/device/start`
pub async fn device_start(
    State(s): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Response, ApiError> {
    start(&s, user.id, DevicePhase::Start).await
}

/// `POST /oauth/device/poll`
pub async fn device_poll(
    State(s): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Query(q): Query<DevicePollQuery>,
) -> Result<Response, ApiError> {
    poll(&s, user.id, Scope::User(user.id), &q.device_code, DevicePhase::Result).await
}

/// `POST /oauth/service/device/start`
pub async fn service_device_start(
    State(s): State<Arc<AppState>>,
    _admin: AdminAuth,
    CurrentUser(user): CurrentUser,
) -> Result<Response, ApiError> {
    start(&s, user.id, DevicePhase::ServiceStart).await
}

/// `POST /oauth/service/device/poll`
pub async fn service_device_poll(
    State(s): State<Arc<AppState>>,
    _admin: AdminAuth,
    CurrentUser(user): CurrentUser,
    Query(q): Query<DevicePollQuery>,
) -> Result<Response, ApiError> {
    poll(&s, user.id, Scope::Service, &q.device_code, DevicePhase::ServiceResult).await
}

/// `GET /oauth/token`
pub async fn user_token(
    State(s): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(s.tokens.masked(Scope::User(user.id)).await?))
}

/// `GET /oauth/service/token`
pub async fn service_token(
    State(s): State<Arc<AppState>>,
    _user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(s.tokens.masked(Scope::Service).await?))
}

/// `POST /oauth/user/token/upsert`
pub async fn user_token_upsert(
    State(s): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<TokenUpsert>,
) -> Result<impl IntoResponse, ApiError> {
    if req.access_token.trim().is_empty() {
        return Err(ApiError::new(ErrorCode::BadRequest, "access_token is required"));
    }
    let refresh = req.refresh_token.as_deref().filter(|t| !t.is_empty());
    s.tokens.save(Scope::User(user.id), req.access_token.trim(), refresh, req.expires_in).await?;
    Ok(Json(json!({ "status": "ok" })))
}

fn callback_page(ok: bool, message: &str) -> Response {
    let (title, class, status) =
        if ok { ("Authorized", "ok", StatusCode::OK) } else { ("Authorization failed", "err", StatusCode::BAD_REQUEST) };
    let html = format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><meta name=\"viewport\" \
         content=\"width=device-width, initial-scale=1\"><title>{title}</title></head>\
         <body><h1 class=\"{class}\">{title}</h1><p>{message}</p>\
         <script>setTimeout(function(){{window.close()}},2200)</script></body></html>"
    );
    (status, Html(html)).into_response()
}

/// Exchange `code` and store the grant under `scope`, rendering the result
/// as a page for the browser that followed the redirect.
async fn complete(s: &AppState, scope: Scope, code: &str, redirect_uri: &str) -> Response {
    match exchange_code(s.tokens.oauth(), code, redirect_uri).await {
        Ok(token) => match s.tokens.save_grant(scope, &token, None).await {
            Ok(()) => {
                tracing::info!(scope = %scope, "authorization code linked account");
                if let Some(user_id) = scope.user_id() {
                    notify(s, user_id, DevicePhase::Result, json!({ "status": "ok", "has_access": true })).await;
                }
                callback_page(true, "The account is linked. You can close this page.")
            }
            Err(e) => {
                tracing::warn!(scope = %scope, err = %e, "storing exchanged token failed");
                callback_page(false, "The token could not be stored. Please retry.")
            }
        },
        Err(e) => {
            tracing::warn!(scope = %scope, err = %e, "authorization code exchange failed");
            callback_page(false, "No access token was issued. Please retry.")
        }
    }
}

/// `GET /oauth/callback`
///
/// `state=service` links the service account. Otherwise `state` must carry
/// the caller's access session token, which selects the user to link.
pub async fn callback(State(s): State<Arc<AppState>>, Query(q): Query<CallbackQuery>) -> Response {
    let state = q.state.as_deref().unwrap_or_default();
    if state == "service" {
        return complete(&s, Scope::Service, &q.code, &s.config.service_redirect()).await;
    }
    match s.sessions.verify(state, SessionKind::Access) {
        Ok(user_id) => complete(&s, Scope::User(user_id), &q.code, &s.config.redirect_uri).await,
        Err(_) => callback_page(false, "The authorization state is missing or expired. Start again from the app."),
    }
}

/// `GET /oauth/service/callback`
pub async fn service_callback(State(s): State<Arc<AppState>>, Query(q): Query<CallbackQuery>) -> Response {
    complete(&s, Scope::Service, &q.code, &s.config.service_redirect()).await
}
