// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Streams a provider direct link to the client.
//!
//! One upstream GET with client-like headers. A 403 whose body is empty,
//! unparseable, or carries one of the known anti-leech codes is retried
//! exactly once with browser-like headers; anything else is forwarded as-is.

use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, StreamExt};
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, ORIGIN, RANGE, REFERER, USER_AGENT};
use tracing::{debug, warn};

use crate::credential::store::TokenStore;
use crate::credential::Scope;
use crate::upstream::streaming_client;

/// Largest body slice handed to the client in one frame.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Bytes of a 403 body inspected to decide on a retry.
const HEAD_LEN: usize = 512;

/// Anti-leech: request looks like it lost its auth context.
pub const ERR_TOKEN_MISMATCH: i64 = 31045;
/// Anti-leech: client must send a Range header.
pub const ERR_RANGE_REQUIRED: i64 = 31326;

const CLIENT_UA: &str = "netdisk;7.2.8;PC";
const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/124.0 Safari/537.36 NetDisk/7.2.8";

/// Response headers passed through to the client.
const FORWARDED: [&str; 5] =
    ["content-type", "content-length", "content-range", "accept-ranges", "content-disposition"];

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("upstream connect failed: {0}")]
    Unavailable(#[from] reqwest::Error),
}

/// Outcome of inspecting a 403 body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Forbidden {
    /// Worth one retry; carries the provider code when there was one.
    Retry(Option<i64>),
    /// Forward the 403 as-is.
    Final,
}

/// Classify the first bytes of a 403 body.
pub fn classify_forbidden(head: &[u8]) -> Forbidden {
    if head.iter().all(u8::is_ascii_whitespace) {
        return Forbidden::Retry(None);
    }
    let Ok(body) = serde_json::from_slice::<serde_json::Value>(head) else {
        return Forbidden::Retry(None);
    };
    let code = body
        .get("error_code")
        .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())));
    match code {
        Some(c) if c == ERR_TOKEN_MISMATCH || c == ERR_RANGE_REQUIRED => Forbidden::Retry(Some(c)),
        _ => Forbidden::Final,
    }
}

/// Append `access_token` to `url` unless it already carries one.
pub fn with_access_token(url: &str, token: &str) -> String {
    if url.contains("access_token=") {
        return url.to_owned();
    }
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{url}{sep}access_token={token}")
}

/// Split a chunk into `CHUNK_SIZE` slices without copying.
fn rechunk(chunk: Bytes) -> Vec<Bytes> {
    let mut out = Vec::with_capacity(chunk.len() / CHUNK_SIZE + 1);
    let mut offset = 0;
    while offset < chunk.len() {
        let end = (offset + CHUNK_SIZE).min(chunk.len());
        out.push(chunk.slice(offset..end));
        offset = end;
    }
    out
}

#[derive(Clone)]
pub struct DownloadProxy {
    http: reqwest::Client,
    tokens: TokenStore,
}

impl DownloadProxy {
    pub fn new(tokens: TokenStore) -> Self {
        Self { http: streaming_client(Duration::from_secs(30)), tokens }
    }

    /// Fetch `dlink` (optionally a byte range) and build the streaming response.
    pub async fn stream(&self, dlink: &str, range: Option<&str>) -> Result<Response, ProxyError> {
        let mut req = self
            .http
            .get(dlink)
            .header(USER_AGENT, CLIENT_UA)
            .header(ACCEPT, "*/*")
            .header(REFERER, "https://pan.baidu.com/");
        if let Some(r) = range {
            req = req.header(RANGE, r);
        }
        let mut upstream = req.send().await?;

        if upstream.status() == reqwest::StatusCode::FORBIDDEN {
            let headers = upstream.headers().clone();
            let head = read_head(&mut upstream).await;
            match classify_forbidden(&head) {
                Forbidden::Final => {
                    debug!("upstream 403 not retryable, forwarding");
                    let len = HeaderValue::from(head.len());
                    let mut resp = build_response(StatusCode::FORBIDDEN, &headers, Body::from(head));
                    resp.headers_mut().insert(axum::http::header::CONTENT_LENGTH, len);
                    resp.headers_mut().remove(axum::http::header::CONTENT_RANGE);
                    return Ok(resp);
                }
                Forbidden::Retry(code) => {
                    warn!(code, "upstream 403, retrying with browser headers");
                    upstream = self.retry(dlink, range, code).await?;
                }
            }
        }

        let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let headers = upstream.headers().clone();
        let body = upstream.bytes_stream().flat_map(|res| match res {
            Ok(chunk) => stream::iter(rechunk(chunk).into_iter().map(Ok).collect::<Vec<_>>()),
            Err(e) => stream::iter(vec![Err(e)]),
        });
        Ok(build_response(status, &headers, Body::from_stream(body)))
    }

    async fn retry(&self, dlink: &str, range: Option<&str>, code: Option<i64>) -> Result<reqwest::Response, ProxyError> {
        let mut url = dlink.to_owned();
        if code == Some(ERR_TOKEN_MISMATCH) {
            match self.tokens.ensure_fresh(Scope::Service).await {
                Ok(Some(token)) => url = with_access_token(&url, &token),
                Ok(None) => debug!("no service token to append"),
                Err(e) => warn!(err = %e, "service token lookup failed"),
            }
        }

        let range = match (range, code) {
            (Some(r), _) => Some(r),
            (None, Some(ERR_RANGE_REQUIRED)) => Some("bytes=0-"),
            (None, _) => None,
        };

        let mut req = self
            .http
            .get(url)
            .header(USER_AGENT, BROWSER_UA)
            .header(ACCEPT, "*/*")
            .header(REFERER, "https://pan.baidu.com/disk/home")
            .header(ORIGIN, "https://pan.baidu.com")
            .header(ACCEPT_LANGUAGE, "zh-CN,zh;q=0.9")
            .header(ACCEPT_ENCODING, "identity")
            .header("Sec-Fetch-Mode", "navigate")
            .header("Sec-Fetch-Site", "same-site")
            .header("Sec-Fetch-Dest", "document");
        if let Some(r) = range {
            req = req.header(RANGE, r);
        }
        Ok(req.send().await?)
    }
}

/// Read up to `HEAD_LEN` bytes of the body, stopping early on a read error.
async fn read_head(resp: &mut reqwest::Response) -> Bytes {
    let mut buf = BytesMut::new();
    while buf.len() < HEAD_LEN {
        match resp.chunk().await {
            Ok(Some(chunk)) => buf.extend_from_slice(&chunk),
            _ => break,
        }
    }
    buf.truncate(HEAD_LEN);
    buf.freeze()
}

fn build_response(status: StatusCode, upstream: &reqwest::header::HeaderMap, body: Body) -> Response {
    let mut headers = HeaderMap::new();
    for name in FORWARDED {
        if let Some(v) = upstream.get(name).and_then(|v| HeaderValue::from_bytes(v.as_bytes()).ok()) {
            headers.insert(name, v);
        }
    }
    let mut resp = Response::new(body);
    *resp.status_mut() = status;
    *resp.headers_mut() = headers;
    resp
}

#[cfg(test)]
#[path = "proxy_tests.rs"]
mod tests;
