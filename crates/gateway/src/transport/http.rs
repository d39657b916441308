// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for accounts, quota and administration.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ApiError, ErrorCode};
use crate::notify::Notice;
use crate::quota::day_key;
use crate::session::users::{Tier, User};
use crate::session::SessionKind;
use crate::state::AppState;
use crate::ticket::TicketFilter;
use crate::transport::auth::{AdminAuth, CurrentUser};

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub connections: usize,
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct SetTierQuery {
    pub username: String,
    #[serde(alias = "role")]
    pub tier: String,
}

#[derive(Debug, Deserialize)]
pub struct UsernameQuery {
    pub username: String,
    #[serde(default)]
    pub day: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TicketListQuery {
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub consumed: Option<bool>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    100
}

#[derive(Debug, Deserialize)]
pub struct JtiQuery {
    pub jti: String,
}

#[derive(Debug, Deserialize)]
pub struct GcQuery {
    #[serde(default)]
    pub keep_days: Option<u64>,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /health`
pub async fn health(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse { status: "ok".to_owned(), connections: s.notifier.connection_count().await })
}

/// `POST /auth/register`
pub async fn register(
    State(s): State<Arc<AppState>>,
    Json(req): Json<Credentials>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let username = req.username.trim();
    if !(3..=64).contains(&username.chars().count()) {
        return Err(ApiError::new(ErrorCode::BadRequest, "username must be 3 to 64 characters"));
    }
    if !(6..=128).contains(&req.password.chars().count()) {
        return Err(ApiError::new(ErrorCode::BadRequest, "password must be 6 to 128 characters"));
    }
    let user = s.users.register(username, &req.password).await?;
    tracing::info!(user_id = user.id, "user registered");
    Ok((StatusCode::CREATED, Json(user)))
}

/// `POST /auth/login`
pub async fn login(
    State(s): State<Arc<AppState>>,
    Json(req): Json<Credentials>,
) -> Result<impl IntoResponse, ApiError> {
    let user = s
        .users
        .authenticate(req.username.trim(), &req.password)
        .await?
        .ok_or_else(|| ApiError::new(ErrorCode::AuthInvalid, "invalid username or password"))?;
    Ok(Json(s.sessions.issue_pair(user.id)?))
}

/// `POST /auth/refresh`
pub async fn refresh(
    State(s): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = s
        .sessions
        .verify(&req.refresh_token, SessionKind::Refresh)
        .map_err(|_| ApiError::new(ErrorCode::AuthInvalid, "invalid refresh token"))?;
    if s.users.by_id(user_id).await?.is_none() {
        return Err(ApiError::new(ErrorCode::AuthInvalid, "user not found"));
    }
    Ok(Json(s.sessions.issue_pair(user_id)?))
}

/// `GET /auth/me`
pub async fn me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

/// `POST /auth/set_tier`
pub async fn set_tier(
    State(s): State<Arc<AppState>>,
    _admin: AdminAuth,
    Query(q): Query<SetTierQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let tier =
        Tier::parse(&q.tier).ok_or_else(|| ApiError::new(ErrorCode::BadRequest, format!("invalid tier: {}", q.tier)))?;
    s.users.set_tier(&q.username, tier).await?;
    tracing::info!(username = %q.username, tier = tier.as_str(), "tier changed");
    Ok(Json(json!({ "status": "ok", "username": q.username, "tier": tier.as_str() })))
}

/// `GET /quota/today`
pub async fn quota_today(
    State(s): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let usage = s.quota.peek(user.id, user.tier).await?;
    Ok(Json(json!({
        "status": "ok",
        "data": {
            "day": usage.day,
            "tier": user.tier.as_str(),
            "used": usage.used,
            "total": usage.total,
            "left": usage.left,
        }
    })))
}

async fn user_by_name(s: &AppState, username: &str) -> Result<User, ApiError> {
    s.users.by_username(username).await?.ok_or_else(|| ApiError::new(ErrorCode::NotFound, "user not found"))
}

/// `GET /admin/quota`
pub async fn admin_quota(
    State(s): State<Arc<AppState>>,
    _admin: AdminAuth,
    Query(q): Query<UsernameQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user = user_by_name(&s, &q.username).await?;
    let history = s.quota.history(user.id).await?;
    Ok(Json(json!({ "status": "ok", "username": user.username, "data": history })))
}

/// `POST /admin/quota/reset`
pub async fn admin_quota_reset(
    State(s): State<Arc<AppState>>,
    _admin: AdminAuth,
    Query(q): Query<UsernameQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user = user_by_name(&s, &q.username).await?;
    let day = match q.day.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        Some(d) => {
            let date = chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d")
                .map_err(|_| ApiError::new(ErrorCode::BadRequest, format!("invalid day: {d}")))?;
            Some(day_key(date))
        }
        None => None,
    };
    let removed = s.quota.reset(user.id, day.as_deref()).await?;
    tracing::info!(user_id = user.id, removed, "quota reset");
    Ok(Json(json!({ "status": "ok", "removed": removed })))
}

/// `GET /admin/tickets`
pub async fn admin_tickets(
    State(s): State<Arc<AppState>>,
    _admin: AdminAuth,
    Query(q): Query<TicketListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = TicketFilter { scope: q.scope.filter(|v| !v.is_empty()), consumed: q.consumed };
    let page = s.tickets.list(filter, q.page, q.page_size).await?;
    Ok(Json(json!({
        "status": "ok",
        "total": page.total,
        "page": page.page,
        "page_size": page.page_size,
        "items": page.items,
    })))
}

/// `POST /admin/tickets/revoke`
pub async fn admin_ticket_revoke(
    State(s): State<Arc<AppState>>,
    _admin: AdminAuth,
    Query(q): Query<JtiQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if !s.tickets.revoke(&q.jti).await? {
        return Err(ApiError::new(ErrorCode::NotFound, "ticket not found"));
    }
    Ok(Json(json!({ "status": "ok", "jti": q.jti })))
}

/// `POST /admin/tickets/gc`
pub async fn admin_ticket_gc(
    State(s): State<Arc<AppState>>,
    _admin: AdminAuth,
    Query(q): Query<GcQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let retention = q.keep_days.map(|d| Duration::from_secs(d.saturating_mul(86_400))).unwrap_or(s.config.ticket_retention());
    let removed = s.tickets.gc(retention).await?;
    tracing::info!(removed, "manual ticket gc");
    Ok(Json(json!({ "status": "ok", "removed": removed })))
}

/// `POST /ws/broadcast`
pub async fn ws_broadcast(
    State(s): State<Arc<AppState>>,
    _admin: AdminAuth,
    Json(message): Json<serde_json::Value>,
) -> impl IntoResponse {
    let delivered = s.notifier.broadcast(&Notice::Broadcast { data: message }).await;
    Json(json!({ "status": "ok", "delivered": delivered }))
}
