// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures: a fake provider (REST API, OAuth endpoint and CDN) bound
//! to a loopback port, and gateway state wired against it.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use clap::Parser;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use pangate::config::GatewayConfig;
use pangate::db::Db;
use pangate::state::AppState;

pub const ADMIN: &str = "test-admin";
pub const FILE_LEN: usize = 1000;

pub fn payload() -> Vec<u8> {
    (0..FILE_LEN).map(|i| (i % 251) as u8).collect()
}

fn serve_file(headers: &HeaderMap) -> Response {
    let data = payload();
    let range = headers
        .get("range")
        .and_then(|v| v.to_str().ok())
        .and_then(|r| r.strip_prefix("bytes="))
        .and_then(|r| r.split_once('-'))
        .and_then(|(a, b)| {
            let start: usize = a.parse().ok()?;
            let end: usize = if b.is_empty() { FILE_LEN - 1 } else { b.parse().ok()? };
            Some((start, end.min(FILE_LEN - 1)))
        });
    match range {
        Some((start, end)) => (
            StatusCode::PARTIAL_CONTENT,
            [
                ("content-type", "application/octet-stream".to_owned()),
                ("content-range", format!("bytes {start}-{end}/{FILE_LEN}")),
                ("accept-ranges", "bytes".to_owned()),
            ],
            data[start..=end].to_vec(),
        )
            .into_response(),
        None => (
            StatusCode::OK,
            [("content-type", "application/octet-stream"), ("accept-ranges", "bytes")],
            data,
        )
            .into_response(),
    }
}

async fn oauth_token(Query(q): Query<HashMap<String, String>>) -> Response {
    let grant = q.get("grant_type").map(String::as_str).unwrap_or_default();
    let code = q.get("code").map(String::as_str).unwrap_or_default();
    match (grant, code) {
        ("device_token", "dev-wait") => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "authorization_pending", "error_description": "user has not authorized"})),
        )
            .into_response(),
        ("device_token", _) | ("authorization_code", _) => Json(json!({
            "access_token": "linked-access-0123456789",
            "refresh_token": "linked-refresh-0123456789",
            "expires_in": 2_592_000,
        }))
        .into_response(),
        _ => (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_grant", "error_description": "bad grant"})))
            .into_response(),
    }
}

async fn device_code() -> Json<serde_json::Value> {
    Json(json!({
        "device_code": "dev-ok",
        "user_code": "ABCD-EFGH",
        "verification_url": "https://openapi.example/device",
        "expires_in": 300,
        "interval": 5,
    }))
}

/// REST fallback; counts every request it answers.
async fn rest(
    State(hits): State<Arc<AtomicUsize>>,
    uri: Uri,
    Query(q): Query<HashMap<String, String>>,
    _body: Bytes,
) -> Json<serde_json::Value> {
    hits.fetch_add(1, Ordering::SeqCst);
    let method = q.get("method").map(String::as_str).unwrap_or_default();
    Json(match (uri.path(), method) {
        ("/api/quota", _) => json!({"errno": 0, "total": 2048, "used": 7}),
        (_, "precreate") => json!({"errno": 0, "uploadid": "up-1", "block_list": [0]}),
        (_, "create") => json!({"errno": 0, "fs_id": 42, "size": 5, "category": 4}),
        ("/rest/2.0/pcs/superfile2", _) => json!({"md5": "x"}),
        (_, "filemetas") => json!({"errno": 0, "list": [{"fs_id": 3, "dlink": "https://d.example/3"}]}),
        (_, "search") => json!({"errno": 31066, "errmsg": "file does not exist"}),
        _ => json!({"errno": 0, "list": []}),
    })
}

pub struct FakeProvider {
    pub base: String,
    pub hits: Arc<AtomicUsize>,
}

impl FakeProvider {
    pub async fn spawn() -> anyhow::Result<Self> {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/file", get(|h: HeaderMap| async move { serve_file(&h) }))
            .route("/oauth/2.0/token", get(oauth_token))
            .route("/oauth/2.0/device/code", get(device_code))
            .fallback(rest)
            .with_state(Arc::clone(&hits));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let base = format!("http://{}", listener.local_addr()?);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(Self { base, hits })
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn file_url(&self) -> String {
        format!("{}/file", self.base)
    }
}

/// Gateway config pointed at `provider`, with `extra` flags appended.
pub fn config(provider: &FakeProvider, extra: &[&str]) -> anyhow::Result<GatewayConfig> {
    let mut args = vec![
        "pangate",
        "--api-base-url",
        provider.base.as_str(),
        "--pcs-base-url",
        provider.base.as_str(),
        "--oauth-base-url",
        provider.base.as_str(),
        "--client-id",
        "cid",
        "--client-secret",
        "csecret",
        "--app-id",
        "app",
        "--admin-secret",
        ADMIN,
        "--quota-basic",
        "2",
    ];
    args.extend_from_slice(extra);
    Ok(GatewayConfig::try_parse_from(args)?)
}

pub fn state(config: GatewayConfig) -> anyhow::Result<Arc<AppState>> {
    Ok(Arc::new(AppState::with_db(config, Db::open_in_memory()?, CancellationToken::new())))
}
