// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local session authentication: users, password verifiers, and the
//! access/refresh token pair handed to clients.

pub mod password;
pub mod users;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::signing::{SignError, Signer};
use crate::state::epoch_secs;

/// Which half of the session pair a token is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    #[serde(rename = "type")]
    pub kind: SessionKind,
    pub iat: u64,
    pub exp: u64,
}

impl SessionClaims {
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }
}

/// Bearer pair returned by login and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

/// Issues and validates session tokens.
#[derive(Clone)]
pub struct SessionIssuer {
    signer: Signer,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl SessionIssuer {
    pub fn new(signer: Signer, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self { signer, access_ttl, refresh_ttl }
    }

    fn issue(&self, user_id: i64, kind: SessionKind, ttl: Duration) -> Result<String, SignError> {
        let now = epoch_secs();
        let claims = SessionClaims {
            sub: user_id.to_string(),
            kind,
            iat: now,
            exp: now + ttl.as_secs(),
        };
        self.signer.sign(&claims)
    }

    pub fn issue_pair(&self, user_id: i64) -> Result<TokenPair, SignError> {
        Ok(TokenPair {
            access_token: self.issue(user_id, SessionKind::Access, self.access_ttl)?,
            refresh_token: self.issue(user_id, SessionKind::Refresh, self.refresh_ttl)?,
            token_type: "bearer".to_owned(),
        })
    }

    /// Validate a token of the expected kind and return the user id.
    pub fn verify(&self, token: &str, kind: SessionKind) -> Result<i64, SignError> {
        let claims: SessionClaims = self.signer.verify(token, epoch_secs())?;
        if claims.kind != kind {
            return Err(SignError::Malformed);
        }
        claims.user_id().ok_or(SignError::Malformed)
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
