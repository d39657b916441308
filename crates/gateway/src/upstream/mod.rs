// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage provider REST API: typed client and chunked upload.

pub mod client;
pub mod upload;

use std::sync::Once;
use std::time::Duration;

use serde::Serialize;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls. Only the first call
/// has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Shared reqwest client builder for every outbound call.
pub fn http_client(timeout: Duration) -> reqwest::Client {
    ensure_crypto();
    reqwest::Client::builder().timeout(timeout).build().unwrap_or_default()
}

/// Client for long-lived byte streams: bounded connect, unbounded transfer.
pub fn streaming_client(connect_timeout: Duration) -> reqwest::Client {
    ensure_crypto();
    reqwest::Client::builder().connect_timeout(connect_timeout).build().unwrap_or_default()
}

/// Failure talking to the provider.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Connect, timeout or body-read failure.
    #[error("provider unavailable: {0}")]
    Unavailable(#[from] reqwest::Error),
    /// Provider answered with a non-zero `errno` (or an HTTP error status).
    #[error("provider error {code}: {message}")]
    Rejected { code: i64, message: String, body: serde_json::Value },
    /// Local precondition failed before any provider call.
    #[error("{0}")]
    Local(String),
}

impl UpstreamError {
    /// Machine-readable code for soft-fail payloads.
    pub fn code(&self) -> String {
        match self {
            Self::Unavailable(_) => "upstream_unavailable".to_owned(),
            Self::Rejected { code, .. } => format!("errno_{code}"),
            Self::Local(msg) => msg.clone(),
        }
    }

    /// Provider payload to echo back to clients, if any.
    pub fn data(&self) -> serde_json::Value {
        match self {
            Self::Rejected { body, .. } => body.clone(),
            _ => serde_json::Value::Null,
        }
    }
}

/// Per-item outcome of a batch upload.
#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub item: serde_json::Value,
    pub result: serde_json::Value,
}

/// Aggregate of a batch upload.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub status: &'static str,
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub results: Vec<BatchItem>,
    pub errors: Vec<BatchItem>,
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
