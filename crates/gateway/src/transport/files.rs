// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Download tickets, ticket redemption, MD5 dedup lookup and direct upload.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Multipart, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;

use crate::credential::Scope;
use crate::dispatch::confine::{confine_dir, confine_name};
use crate::error::{ApiError, ErrorCode};
use crate::index::FileEntry;
use crate::state::AppState;
use crate::ticket::{IssueRequest, TicketTarget};
use crate::transport::auth::CurrentUser;
use crate::upstream::upload::{join_remote, md5_hex};

/// Shortest string accepted as an MD5 digest.
const MIN_MD5_LEN: usize = 16;

#[derive(Debug, Deserialize)]
pub struct TicketRequest {
    #[serde(default)]
    pub dlink: Option<String>,
    #[serde(default, alias = "fs_id")]
    pub fsid: Option<u64>,
    #[serde(default)]
    pub ttl: Option<u64>,
    /// `service` (default) or `user`.
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub ticket: String,
    #[serde(default)]
    pub range: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DedupQuery {
    pub md5: String,
    #[serde(default = "default_sample_limit")]
    pub sample_limit: u32,
}

fn default_sample_limit() -> u32 {
    5
}

/// `POST /files/download_ticket`
///
/// Charged: one quota unit is spent before the ticket is issued.
pub async fn download_ticket(
    State(s): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<TicketRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let target = match (req.dlink.filter(|d| !d.trim().is_empty()), req.fsid) {
        (Some(dlink), _) => TicketTarget::DirectLink(dlink.trim().to_owned()),
        (None, Some(fsid)) => TicketTarget::FileId(fsid),
        (None, None) => return Err(ApiError::new(ErrorCode::BadRequest, "dlink or fsid is required")),
    };
    let scope = match req.scope.as_deref().map(str::trim) {
        None | Some("") | Some("service") | Some("public") => Scope::Service,
        Some("user") => Scope::User(user.id),
        Some(other) => return Err(ApiError::new(ErrorCode::BadRequest, format!("invalid scope: {other}"))),
    };

    s.quota.consume(user.id, user.tier).await?;
    let issued = s
        .tickets
        .issue(IssueRequest { scope, target, ttl: req.ttl.filter(|t| *t > 0).map(Duration::from_secs) })
        .await?;
    tracing::info!(user_id = user.id, jti = %issued.jti, "download ticket issued");

    let url = format!("/files/proxy_download?ticket={}", issued.ticket);
    Ok(Json(json!({
        "status": "ok",
        "ticket": issued.ticket,
        "jti": issued.jti,
        "expires_at": issued.expires_at,
        "ttl": issued.ttl,
        "url": url,
    })))
}

/// `GET /files/proxy_download`
///
/// Authenticated by the ticket alone so that download managers and media
/// players can follow the link. The `Range` header wins over `?range=`.
pub async fn proxy_download(
    State(s): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<ProxyQuery>,
) -> Result<Response, ApiError> {
    let claims = s.tickets.redeem(&q.ticket).await?;
    let range = headers
        .get(axum::http::header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .or(q.range)
        .filter(|r| !r.trim().is_empty());
    tracing::debug!(jti = %claims.jti, range = ?range, "proxying download");
    Ok(s.proxy.stream(&claims.dlink, range.as_deref()).await?)
}

/// `GET /files/dedup/md5`
pub async fn dedup_md5(
    State(s): State<Arc<AppState>>,
    _user: CurrentUser,
    Query(q): Query<DedupQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let md5 = q.md5.trim();
    if !(MIN_MD5_LEN..=64).contains(&md5.len()) {
        return Err(ApiError::new(ErrorCode::BadRequest, "md5 must be 16 to 64 characters"));
    }
    let limit = q.sample_limit.clamp(1, 20);
    let count = s.index.count_by_md5(md5).await?;
    let samples = s.index.find_by_md5(md5, limit).await?;
    Ok(Json(json!({ "exists": count > 0, "count": count, "samples": samples })))
}

#[derive(Default)]
struct UploadForm {
    dir: Option<String>,
    filename: Option<String>,
    md5: Option<String>,
    file_name: Option<String>,
    data: Option<Bytes>,
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let bad = |e: axum::extract::multipart::MultipartError| ApiError::new(ErrorCode::BadRequest, e.body_text());
    let mut form = UploadForm::default();
    while let Some(field) = multipart.next_field().await.map_err(bad)? {
        match field.name().unwrap_or_default() {
            "dir" => form.dir = Some(field.text().await.map_err(bad)?),
            "filename" => form.filename = Some(field.text().await.map_err(bad)?),
            "md5" => form.md5 = Some(field.text().await.map_err(bad)?),
            "file" => {
                form.file_name = field.file_name().map(str::to_owned);
                form.data = Some(field.bytes().await.map_err(bad)?);
            }
            _ => {}
        }
    }
    Ok(form)
}

fn duplicate(md5: &str, count: i64) -> Response {
    tracing::info!(md5, count, "upload skipped, content already indexed");
    Json(json!({ "status": "duplicate", "reason": "md5_exists", "md5": md5, "count": count })).into_response()
}

/// `POST /upload`
///
/// Multipart fields: `dir` (inside the upload root), `file`, optional
/// `filename` and `md5`. Content already present in the index is not sent
/// upstream again. Uploads go to the service account.
pub async fn upload(
    State(s): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let form = read_form(multipart).await?;
    let dir = form.dir.as_deref().map(str::trim).unwrap_or_default().to_owned();
    confine_dir(s.dispatcher.upload_root(), &dir)
        .map_err(|e| ApiError::new(ErrorCode::UploadDirNotAllowed, e.to_string()))?;
    let data = form.data.ok_or_else(|| ApiError::new(ErrorCode::BadRequest, "file field is required"))?;

    let name = match form.filename.or(form.file_name).map(|n| n.trim().to_owned()).filter(|n| !n.is_empty()) {
        Some(n) => {
            confine_name(&n).map_err(|e| ApiError::new(ErrorCode::UploadDirNotAllowed, e.to_string()))?;
            n
        }
        None => "upload.bin".to_owned(),
    };

    let claimed = form.md5.map(|m| m.trim().to_lowercase()).filter(|m| m.len() >= MIN_MD5_LEN);
    if let Some(ref md5) = claimed {
        match s.index.count_by_md5(md5).await {
            Ok(n) if n > 0 => return Ok(duplicate(md5, n)),
            Ok(_) => {}
            Err(e) => tracing::warn!(err = %e, "md5 precheck failed"),
        }
    }
    let md5 = match claimed {
        Some(m) => m,
        None => {
            let computed = md5_hex(&data);
            match s.index.count_by_md5(&computed).await {
                Ok(n) if n > 0 => return Ok(duplicate(&computed, n)),
                Ok(_) => {}
                Err(e) => tracing::warn!(err = %e, "md5 precheck failed"),
            }
            computed
        }
    };

    let token = s
        .tokens
        .ensure_fresh(Scope::Service)
        .await?
        .ok_or_else(|| ApiError::new(ErrorCode::BadRequest, "service token missing"))?;
    let remote_path = join_remote(&dir, &name);
    let size = data.len();
    let created = s.pan.session(token).upload_bytes(&remote_path, data).await?;
    tracing::info!(user_id = user.id, remote_path = %remote_path, size, "upload complete");

    let mut entry = FileEntry::from_created(&created, &remote_path, &md5);
    entry.file_size = entry.file_size.or(Some(size as i64));
    if let Err(e) = s.index.upsert(entry).await {
        tracing::warn!(remote_path = %remote_path, err = %e, "index upsert failed");
    }

    Ok(Json(json!({ "status": "ok", "data": created, "remote_path": remote_path })).into_response())
}
