// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signed download tickets.
//!
//! A ticket is a self-contained HS256 token carrying the provider direct link.
//! Verification needs no database, but every ticket also has a row used for
//! audit, admin revocation and GC. Tickets are multi-use until expiry: the
//! first redemption stamps `consumed_at`, and redemption refuses tickets an
//! admin has revoked.

pub mod gc;

use std::time::Duration;

use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::credential::store::TokenStore;
use crate::credential::{CredentialError, Scope};
use crate::db::{Db, DbError};
use crate::signing::{SignError, Signer};
use crate::state::epoch_secs;
use crate::upstream::client::PanClient;
use crate::upstream::UpstreamError;

/// Type tag embedded in every download ticket.
pub const TICKET_TYPE: &str = "dl";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketClaims {
    pub typ: String,
    pub jti: String,
    /// `user` or `service`.
    pub scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<i64>,
    pub dlink: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fsid: Option<String>,
    pub iat: u64,
    pub exp: u64,
}

/// What the ticket should point at.
#[derive(Debug, Clone)]
pub enum TicketTarget {
    DirectLink(String),
    /// Resolved to a direct link through the metadata API at issuance.
    FileId(u64),
}

#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub scope: Scope,
    pub target: TicketTarget,
    pub ttl: Option<Duration>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedTicket {
    pub ticket: String,
    pub jti: String,
    pub expires_at: u64,
    pub ttl: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum TicketError {
    #[error("ticket expired")]
    Expired,
    #[error("ticket malformed")]
    Malformed,
    #[error("ticket revoked")]
    Revoked,
    #[error("no upstream credential for {0}")]
    TokenMissing(Scope),
    #[error("could not resolve direct link: {0}")]
    Resolve(#[from] UpstreamError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<SignError> for TicketError {
    fn from(e: SignError) -> Self {
        match e {
            SignError::Expired => Self::Expired,
            SignError::Malformed => Self::Malformed,
        }
    }
}

/// Persisted ticket row (admin view; the direct link is not exposed).
#[derive(Debug, Clone, Serialize)]
pub struct TicketRow {
    pub jti: String,
    pub scope: String,
    pub user_id: Option<i64>,
    pub fsid: Option<String>,
    pub issued_at: i64,
    pub expires_at: i64,
    pub consumed_at: Option<i64>,
    pub revoked: bool,
}

impl TicketRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            jti: row.get("jti")?,
            scope: row.get("scope")?,
            user_id: row.get("user_id")?,
            fsid: row.get("fsid")?,
            issued_at: row.get("issued_at")?,
            expires_at: row.get("expires_at")?,
            consumed_at: row.get("consumed_at")?,
            revoked: row.get::<_, i64>("revoked")? != 0,
        })
    }
}

/// Admin listing filter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketFilter {
    pub scope: Option<String>,
    pub consumed: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketPage {
    pub items: Vec<TicketRow>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Clone)]
pub struct TicketService {
    db: Db,
    signer: Signer,
    tokens: TokenStore,
    pan: PanClient,
    default_ttl: Duration,
}

impl TicketService {
    pub fn new(db: Db, signer: Signer, tokens: TokenStore, pan: PanClient, default_ttl: Duration) -> Self {
        Self { db, signer, tokens, pan, default_ttl }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Sign a ticket and persist its row. File ids are resolved first; a
    /// resolution failure issues nothing.
    pub async fn issue(&self, req: IssueRequest) -> Result<IssuedTicket, TicketError> {
        let (dlink, fsid) = match req.target {
            TicketTarget::DirectLink(url) => (url, None),
            TicketTarget::FileId(fsid) => {
                let token =
                    self.tokens.ensure_fresh(req.scope).await?.ok_or(TicketError::TokenMissing(req.scope))?;
                let dlink = self.pan.session(token).resolve_dlink(fsid).await?;
                (dlink, Some(fsid.to_string()))
            }
        };
        if dlink.is_empty() {
            return Err(TicketError::Malformed);
        }

        let ttl = req.ttl.unwrap_or(self.default_ttl).as_secs().max(1);
        let iat = epoch_secs();
        let claims = TicketClaims {
            typ: TICKET_TYPE.to_owned(),
            jti: uuid::Uuid::new_v4().simple().to_string(),
            scope: req.scope.kind().to_owned(),
            sub: req.scope.user_id(),
            dlink,
            fsid,
            iat,
            exp: iat + ttl,
        };
        let ticket = self.signer.sign(&claims)?;

        let row = claims.clone();
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO tickets (jti, scope, user_id, dlink, fsid, issued_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![row.jti, row.scope, row.sub, row.dlink, row.fsid, row.iat as i64, row.exp as i64],
                )?;
                Ok(())
            })
            .await?;
        debug!(jti = %claims.jti, scope = %claims.scope, ttl, "ticket issued");

        Ok(IssuedTicket { ticket, jti: claims.jti, expires_at: claims.exp, ttl })
    }

    /// Check signature, type tag and expiry. No database access.
    pub fn verify(&self, token: &str) -> Result<TicketClaims, TicketError> {
        self.verify_at(token, epoch_secs())
    }

    pub fn verify_at(&self, token: &str, now: u64) -> Result<TicketClaims, TicketError> {
        let claims: TicketClaims = self.signer.verify(token, now)?;
        if claims.typ != TICKET_TYPE {
            return Err(TicketError::Malformed);
        }
        Ok(claims)
    }

    /// Verify, then check the row: revoked tickets are refused and the first
    /// redemption is stamped.
    pub async fn redeem(&self, token: &str) -> Result<TicketClaims, TicketError> {
        let claims = self.verify(token)?;
        let jti = claims.jti.clone();
        let revoked = self
            .db
            .call(move |conn| {
                let revoked: Option<i64> = conn
                    .query_row("SELECT revoked FROM tickets WHERE jti = ?1", params![jti], |r| r.get(0))
                    .optional()?;
                if revoked == Some(0) {
                    conn.execute(
                        "UPDATE tickets SET consumed_at = ?1 WHERE jti = ?2 AND consumed_at IS NULL",
                        params![epoch_secs() as i64, jti],
                    )?;
                }
                Ok(revoked)
            })
            .await?;

        match revoked {
            Some(0) => Ok(claims),
            Some(_) => Err(TicketError::Revoked),
            // Every issued ticket has a row; none means it was not issued here.
            None => Err(TicketError::Malformed),
        }
    }

    /// Mark a ticket revoked. `false` when the jti is unknown.
    pub async fn revoke(&self, jti: &str) -> Result<bool, TicketError> {
        let jti = jti.to_owned();
        let changed = self
            .db
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE tickets SET revoked = 1, consumed_at = COALESCE(consumed_at, ?1)
                     WHERE jti = ?2",
                    params![epoch_secs() as i64, jti],
                )?)
            })
            .await?;
        if changed > 0 {
            info!("ticket revoked");
        }
        Ok(changed > 0)
    }

    pub async fn list(&self, filter: TicketFilter, page: u32, page_size: u32) -> Result<TicketPage, TicketError> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 200);
        let offset = i64::from(page - 1) * i64::from(page_size);

        let (items, total) = self
            .db
            .call(move |conn| {
                let mut clauses: Vec<&str> = Vec::new();
                let mut args: Vec<rusqlite::types::Value> = Vec::new();
                if let Some(scope) = filter.scope {
                    clauses.push("scope = ?");
                    args.push(scope.into());
                }
                match filter.consumed {
                    Some(true) => clauses.push("consumed_at IS NOT NULL"),
                    Some(false) => clauses.push("consumed_at IS NULL"),
                    None => {}
                }
                let where_sql =
                    if clauses.is_empty() { String::new() } else { format!(" WHERE {}", clauses.join(" AND ")) };

                let total: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM tickets{where_sql}"),
                    rusqlite::params_from_iter(args.iter()),
                    |r| r.get(0),
                )?;

                let mut page_args = args.clone();
                page_args.push(i64::from(page_size).into());
                page_args.push(offset.into());
                let mut stmt = conn.prepare(&format!(
                    "SELECT jti, scope, user_id, fsid, issued_at, expires_at, consumed_at, revoked
                     FROM tickets{where_sql} ORDER BY id DESC LIMIT ? OFFSET ?"
                ))?;
                let items = stmt
                    .query_map(rusqlite::params_from_iter(page_args.iter()), TicketRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((items, total))
            })
            .await?;

        Ok(TicketPage { items, total, page, page_size })
    }

    /// Delete rows expired before `now` or consumed more than `retention` ago.
    pub async fn gc_at(&self, now: u64, retention: Duration) -> Result<usize, TicketError> {
        let now = i64::try_from(now).unwrap_or(i64::MAX);
        let cutoff = now.saturating_sub(i64::try_from(retention.as_secs()).unwrap_or(i64::MAX));
        let removed = self
            .db
            .call(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM tickets
                     WHERE expires_at < ?1 OR (consumed_at IS NOT NULL AND consumed_at < ?2)",
                    params![now, cutoff],
                )?)
            })
            .await?;
        Ok(removed)
    }

    pub async fn gc(&self, retention: Duration) -> Result<usize, TicketError> {
        self.gc_at(epoch_secs(), retention).await
    }
}

#[cfg(test)]
#[path = "ticket_tests.rs"]
mod tests;
