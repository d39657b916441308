// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Encrypted credential store with refresh-on-demand.

use std::sync::Arc;

use rusqlite::{params, OptionalExtension};
use tracing::{debug, info, warn};

use crate::credential::lock::ScopeLocks;
use crate::credential::oauth::{OAuthEndpoint, TokenResponse};
use crate::credential::refresh::do_refresh;
use crate::credential::{Credential, CredentialError, MaskedCredential, Scope};
use crate::crypto::TokenCipher;
use crate::db::Db;
use crate::state::epoch_secs;

/// Row as stored: both token columns still encrypted.
struct StoredRow {
    access_enc: String,
    refresh_enc: Option<String>,
    expires_at: Option<i64>,
    updated_at: i64,
}

#[derive(Clone)]
pub struct TokenStore {
    db: Db,
    cipher: Arc<TokenCipher>,
    oauth: OAuthEndpoint,
    locks: ScopeLocks,
    refresh_window_secs: u64,
}

impl TokenStore {
    pub fn new(db: Db, cipher: TokenCipher, oauth: OAuthEndpoint, refresh_window_secs: u64) -> Self {
        Self {
            db,
            cipher: Arc::new(cipher),
            oauth,
            locks: ScopeLocks::new(),
            refresh_window_secs,
        }
    }

    pub fn oauth(&self) -> &OAuthEndpoint {
        &self.oauth
    }

    pub fn locks(&self) -> &ScopeLocks {
        &self.locks
    }

    /// Load and decrypt the credential for `scope`.
    ///
    /// A row that fails to decrypt yields [`CredentialError::Integrity`];
    /// callers that only need "is there a usable token" go through
    /// [`TokenStore::ensure_fresh`], which logs and treats it as absent.
    pub async fn get(&self, scope: Scope) -> Result<Option<Credential>, CredentialError> {
        let key = scope.key();
        let row = self
            .db
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT access_token_enc, refresh_token_enc, expires_at, updated_at
                         FROM upstream_credentials WHERE scope_key = ?1",
                        params![key],
                        |r| {
                            Ok(StoredRow {
                                access_enc: r.get(0)?,
                                refresh_enc: r.get(1)?,
                                expires_at: r.get(2)?,
                                updated_at: r.get(3)?,
                            })
                        },
                    )
                    .optional()?)
            })
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let access_token = self.cipher.decrypt(&row.access_enc)?;
        let refresh_token = match row.refresh_enc.as_deref() {
            Some(enc) if !enc.is_empty() => Some(self.cipher.decrypt(enc)?),
            _ => None,
        };
        Ok(Some(Credential {
            access_token,
            refresh_token,
            expires_at: row.expires_at.map(|v| v.max(0) as u64),
            updated_at: row.updated_at.max(0) as u64,
        }))
    }

    /// Insert or replace the credential for `scope`. At most one row per scope.
    ///
    /// `expires_in` is relative to now; `None` stores an unknown expiry, which
    /// is never proactively refreshed.
    pub async fn save(
        &self,
        scope: Scope,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_in: Option<u64>,
    ) -> Result<(), CredentialError> {
        let now = epoch_secs();
        let expires_at = expires_in.map(|secs| (now + secs) as i64);
        let now = now as i64;
        let access_enc = self.cipher.encrypt(access_token)?;
        let refresh_enc = refresh_token.map(|t| self.cipher.encrypt(t)).transpose()?;
        let key = scope.key();
        let kind = scope.kind();
        let user_id = scope.user_id();

        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO upstream_credentials
                         (scope_key, scope, user_id, access_token_enc, refresh_token_enc, expires_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(scope_key) DO UPDATE SET
                         access_token_enc = excluded.access_token_enc,
                         refresh_token_enc = excluded.refresh_token_enc,
                         expires_at = excluded.expires_at,
                         updated_at = excluded.updated_at",
                    params![key, kind, user_id, access_enc, refresh_enc, expires_at, now],
                )?;
                Ok(())
            })
            .await?;
        debug!(scope = %scope, "credential saved");
        Ok(())
    }

    /// Persist a fresh token response for `scope`, keeping the previous
    /// refresh token when the provider omits one.
    pub async fn save_grant(
        &self,
        scope: Scope,
        token: &TokenResponse,
        previous_refresh: Option<&str>,
    ) -> Result<(), CredentialError> {
        let refresh = token.refresh_token.as_deref().filter(|t| !t.is_empty()).or(previous_refresh);
        self.save(scope, &token.access_token, refresh, token.expires_in).await
    }

    pub async fn delete(&self, scope: Scope) -> Result<bool, CredentialError> {
        let key = scope.key();
        let changed = self
            .db
            .call(move |conn| {
                Ok(conn.execute("DELETE FROM upstream_credentials WHERE scope_key = ?1", params![key])?)
            })
            .await?;
        Ok(changed > 0)
    }

    /// Current access token for `scope`, refreshed first when close to expiry.
    ///
    /// Never fails because of the refresh itself: on a lost lock race or a
    /// provider failure the stored token is returned as-is. `Ok(None)` means
    /// no usable credential (including an unreadable row).
    pub async fn ensure_fresh(&self, scope: Scope) -> Result<Option<String>, CredentialError> {
        let cred = match self.get(scope).await {
            Ok(Some(c)) => c,
            Ok(None) => return Ok(None),
            Err(CredentialError::Integrity(e)) => {
                warn!(scope = %scope, err = %e, "stored credential failed integrity check");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let Some(refresh_token) = cred.refresh_token.clone() else {
            return Ok(Some(cred.access_token));
        };
        if !cred.due_for_refresh(epoch_secs(), self.refresh_window_secs) {
            return Ok(Some(cred.access_token));
        }

        let Some(_guard) = self.locks.try_acquire(scope) else {
            debug!(scope = %scope, "refresh already in flight, using stored token");
            return Ok(Some(cred.access_token));
        };

        // Another task may have finished a refresh between our read and the lock.
        if let Ok(Some(current)) = self.get(scope).await {
            if current.updated_at != cred.updated_at
                || !current.due_for_refresh(epoch_secs(), self.refresh_window_secs)
            {
                return Ok(Some(current.access_token));
            }
        }

        match do_refresh(&self.oauth, &refresh_token).await {
            Ok(token) => {
                // The used refresh token may already be spent upstream.
                match self.save_grant(scope, &token, Some(&refresh_token)).await {
                    Ok(()) => info!(scope = %scope, "credential refreshed"),
                    Err(e) => warn!(scope = %scope, err = %e, "refreshed credential not persisted"),
                }
                Ok(Some(token.access_token))
            }
            Err(e) => {
                warn!(scope = %scope, err = %e, "refresh failed, using stored token");
                Ok(Some(cred.access_token))
            }
        }
    }

    /// Masked view for status endpoints; unreadable rows read as absent.
    pub async fn masked(&self, scope: Scope) -> Result<MaskedCredential, CredentialError> {
        match self.get(scope).await {
            Ok(Some(c)) => Ok(c.masked()),
            Ok(None) | Err(CredentialError::Integrity(_)) => Ok(MaskedCredential::absent()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
