// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Upstream credential lifecycle: encrypted token store, refresh-on-demand,
//! and the OAuth device/authorization-code exchanges against the provider.
//!
//! Two scopes exist. Each local user may link one upstream account
//! (`Scope::User`), and one shared account (`Scope::Service`) backs anonymous
//! "public" operations.

pub mod device_code;
pub mod lock;
pub mod oauth;
pub mod refresh;
pub mod store;

use std::fmt;

use serde::Serialize;

use crate::crypto::CryptoError;
use crate::db::DbError;

/// Owner of an upstream credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Service,
    User(i64),
}

impl Scope {
    /// Primary key in `upstream_credentials`.
    pub fn key(&self) -> String {
        match self {
            Self::Service => "service".to_owned(),
            Self::User(id) => format!("user:{id}"),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::User(_) => "user",
        }
    }

    pub fn user_id(&self) -> Option<i64> {
        match self {
            Self::Service => None,
            Self::User(id) => Some(*id),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Decrypted upstream credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Epoch seconds; `None` means unknown, never proactively refreshed.
    pub expires_at: Option<u64>,
    pub updated_at: u64,
}

impl Credential {
    /// True when the expiry is known and falls within `window_secs` of `now`.
    pub fn due_for_refresh(&self, now: u64, window_secs: u64) -> bool {
        match self.expires_at {
            None => false,
            Some(at) => at.saturating_sub(now) <= window_secs,
        }
    }

    /// View safe to return to clients.
    pub fn masked(&self) -> MaskedCredential {
        MaskedCredential {
            has_token: true,
            access_token: Some(mask(&self.access_token)),
            refresh_token: self.refresh_token.as_deref().map(mask),
            expires_at: self.expires_at.map(crate::state::rfc3339),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MaskedCredential {
    pub has_token: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

impl MaskedCredential {
    pub fn absent() -> Self {
        Self { has_token: false, access_token: None, refresh_token: None, expires_at: None }
    }
}

/// `abcd***wxyz` for long secrets, `***` otherwise.
pub fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "***".to_owned();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}***{tail}")
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Stored blob failed to decrypt. Treated as absent by callers, but
    /// always reported.
    #[error("stored credential unreadable: {0}")]
    Integrity(#[from] CryptoError),
    #[error(transparent)]
    Db(#[from] DbError),
    /// Could not reach the auth endpoint.
    #[error("auth endpoint unavailable: {0}")]
    Unavailable(#[from] reqwest::Error),
    /// The provider answered with an error payload.
    #[error("provider error {error}: {description}")]
    Provider { status: u16, error: String, description: String },
    #[error("unexpected auth response: {0}")]
    Decode(String),
}

#[cfg(test)]
#[path = "credential_tests.rs"]
mod tests;
