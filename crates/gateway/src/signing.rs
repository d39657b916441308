// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compact HS256 signed tokens (`header.payload.signature`, base64url).
//!
//! Used for local sessions and download tickets. Claims must carry an `exp`
//! (epoch seconds). The signature is checked before expiry, so a forged
//! token is always reported as malformed, never as expired.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignError {
    #[error("token expired")]
    Expired,
    #[error("token malformed")]
    Malformed,
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

#[derive(Deserialize)]
struct Expiry {
    exp: u64,
}

/// HMAC-SHA256 signer/verifier for compact tokens.
#[derive(Clone)]
pub struct Signer {
    secret: Vec<u8>,
}

impl Signer {
    pub fn new(secret: &str) -> Self {
        Self { secret: secret.as_bytes().to_vec() }
    }

    fn mac(&self) -> Result<HmacSha256, SignError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|_| SignError::Malformed)
    }

    pub fn sign<C: Serialize>(&self, claims: &C) -> Result<String, SignError> {
        let payload = serde_json::to_vec(claims).map_err(|_| SignError::Malformed)?;
        let signing_input =
            format!("{}.{}", URL_SAFE_NO_PAD.encode(HEADER), URL_SAFE_NO_PAD.encode(payload));
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let sig = mac.finalize().into_bytes();
        Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(sig)))
    }

    /// Verify signature, algorithm and expiry (against `now`, epoch seconds)
    /// and decode the claims.
    pub fn verify<C: DeserializeOwned>(&self, token: &str, now: u64) -> Result<C, SignError> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(sig), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(SignError::Malformed);
        };

        let sig = URL_SAFE_NO_PAD.decode(sig).map_err(|_| SignError::Malformed)?;
        let mut mac = self.mac()?;
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        mac.verify_slice(&sig).map_err(|_| SignError::Malformed)?;

        let header = URL_SAFE_NO_PAD.decode(header).map_err(|_| SignError::Malformed)?;
        let header: Header = serde_json::from_slice(&header).map_err(|_| SignError::Malformed)?;
        if header.alg != "HS256" {
            return Err(SignError::Malformed);
        }

        let payload = URL_SAFE_NO_PAD.decode(payload).map_err(|_| SignError::Malformed)?;
        let expiry: Expiry = serde_json::from_slice(&payload).map_err(|_| SignError::Malformed)?;
        if expiry.exp <= now {
            return Err(SignError::Expired);
        }
        serde_json::from_slice(&payload).map_err(|_| SignError::Malformed)
    }
}

#[cfg(test)]
#[path = "signing_tests.rs"]
mod tests;
