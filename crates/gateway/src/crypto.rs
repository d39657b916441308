// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Encryption of upstream tokens at rest.
//!
//! Blobs are lowercase hex of `nonce(12) ‖ tag(16) ‖ ciphertext`, sealed with
//! ChaCha20-Poly1305 under a key derived from the configured master secret.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::Rng;
use sha2::{Digest, Sha256};

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Tampered blob, wrong key, or not a blob at all.
    #[error("integrity check failed: {0}")]
    Integrity(&'static str),
    #[error("encryption failed")]
    Encryption,
}

/// Symmetric codec for opaque credential strings.
#[derive(Clone)]
pub struct TokenCipher {
    key: [u8; KEY_SIZE],
}

impl TokenCipher {
    /// Derive the key: the first 32 bytes of the secret when long enough,
    /// otherwise its SHA-256 digest.
    pub fn new(master_key: &str) -> Self {
        let src = master_key.as_bytes();
        let mut key = [0u8; KEY_SIZE];
        if src.len() >= KEY_SIZE {
            key.copy_from_slice(&src[..KEY_SIZE]);
        } else {
            key.copy_from_slice(&Sha256::digest(src));
        }
        Self { key }
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.key))
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::rng().fill(&mut nonce);

        // The AEAD appends the tag; the stored layout puts it before the body.
        let sealed = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| CryptoError::Encryption)?;
        let (body, tag) = sealed.split_at(sealed.len() - TAG_SIZE);

        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(tag);
        out.extend_from_slice(body);
        Ok(hex::encode(out))
    }

    pub fn decrypt(&self, blob: &str) -> Result<String, CryptoError> {
        let raw = hex::decode(blob).map_err(|_| CryptoError::Integrity("not hex"))?;
        if raw.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Integrity("blob too short"));
        }
        let (nonce, rest) = raw.split_at(NONCE_SIZE);
        let (tag, body) = rest.split_at(TAG_SIZE);

        let mut sealed = Vec::with_capacity(rest.len());
        sealed.extend_from_slice(body);
        sealed.extend_from_slice(tag);

        let plain = self
            .cipher()
            .decrypt(Nonce::from_slice(nonce), sealed.as_slice())
            .map_err(|_| CryptoError::Integrity("authentication failed"))?;
        String::from_utf8(plain).map_err(|_| CryptoError::Integrity("plaintext is not utf-8"))
    }
}

#[cfg(test)]
#[path = "crypto_tests.rs"]
mod tests;
