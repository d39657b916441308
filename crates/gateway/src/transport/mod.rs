// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the gateway.

pub mod auth;
pub mod exec;
pub mod files;
pub mod http;
pub mod oauth;
pub mod ws;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Largest multipart body accepted by `/upload`.
const UPLOAD_BODY_LIMIT: usize = 1024 * 1024 * 1024;

/// Build the axum `Router` with all gateway routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(http::health))
        // Local accounts
        .route("/auth/register", post(http::register))
        .route("/auth/login", post(http::login))
        .route("/auth/refresh", post(http::refresh))
        .route("/auth/me", get(http::me))
        .route("/auth/set_tier", post(http::set_tier))
        // Upstream account linking
        .route("/oauth/device/start", post(oauth::device_start))
        .route("/oauth/device/poll", post(oauth::device_poll))
        .route("/oauth/token", get(oauth::user_token))
        .route("/oauth/user/token/upsert", post(oauth::user_token_upsert))
        .route("/oauth/service/device/start", post(oauth::service_device_start))
        .route("/oauth/service/device/poll", post(oauth::service_device_poll))
        .route("/oauth/service/token", get(oauth::service_token))
        .route("/oauth/callback", get(oauth::callback))
        .route("/oauth/service/callback", get(oauth::service_callback))
        // Quota and operations
        .route("/quota/today", get(http::quota_today))
        .route("/mcp/user/exec", post(exec::user_exec))
        .route("/mcp/public/exec", post(exec::public_exec))
        // Files
        .route("/files/download_ticket", post(files::download_ticket))
        .route("/files/proxy_download", get(files::proxy_download))
        .route("/files/dedup/md5", get(files::dedup_md5))
        .route("/upload", post(files::upload).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)))
        // Realtime
        .route("/ws", get(ws::ws_handler))
        .route("/ws/broadcast", post(http::ws_broadcast))
        // Administration
        .route("/admin/quota", get(http::admin_quota))
        .route("/admin/quota/reset", post(http::admin_quota_reset))
        .route("/admin/tickets", get(http::admin_tickets))
        .route("/admin/tickets/revoke", post(http::admin_ticket_revoke))
        .route("/admin/tickets/gc", post(http::admin_ticket_gc))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
