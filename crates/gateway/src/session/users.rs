// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local user accounts.

use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::db::{Db, DbError};
use crate::session::password::{hash_password, verify_password, PasswordError};
use crate::state::epoch_secs;

/// Account tier; selects the daily quota ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Basic,
    Premium,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Premium => "premium",
        }
    }

    /// Case-insensitive parse; `None` for anything but the two tiers.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Some(Self::Basic),
            "premium" => Some(Self::Premium),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub tier: Tier,
    #[serde(skip)]
    password_hash: String,
}

impl User {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let tier: String = row.get("tier")?;
        Ok(Self {
            id: row.get("id")?,
            username: row.get("username")?,
            // Unknown tiers in the table degrade to the smallest ceiling.
            tier: Tier::parse(&tier).unwrap_or(Tier::Basic),
            password_hash: row.get("password_hash")?,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("username already exists")]
    Duplicate,
    #[error("user not found")]
    NotFound,
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error(transparent)]
    Db(#[from] DbError),
}

const SELECT_USER: &str = "SELECT id, username, password_hash, tier FROM users";

#[derive(Clone)]
pub struct UserStore {
    db: Db,
}

impl UserStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<User, UserError> {
        let plain = password.to_owned();
        let hash = tokio::task::spawn_blocking(move || hash_password(&plain))
            .await
            .map_err(|e| DbError::Task(e.to_string()))??;

        let username = username.to_owned();
        let inserted = self
            .db
            .call(move |conn| {
                let changed = conn.execute(
                    "INSERT INTO users (username, password_hash, tier, created_at)
                     VALUES (?1, ?2, 'basic', ?3) ON CONFLICT(username) DO NOTHING",
                    params![username, hash, epoch_secs() as i64],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                let id = conn.last_insert_rowid();
                let user = conn.query_row(
                    &format!("{SELECT_USER} WHERE id = ?1"),
                    params![id],
                    User::from_row,
                )?;
                Ok(Some(user))
            })
            .await?;
        inserted.ok_or(UserError::Duplicate)
    }

    /// Look up `username` and check `password`. `None` on either mismatch.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Option<User>, UserError> {
        let Some(user) = self.by_username(username).await? else {
            return Ok(None);
        };
        let plain = password.to_owned();
        let stored = user.password_hash.clone();
        let ok = tokio::task::spawn_blocking(move || verify_password(&plain, &stored))
            .await
            .map_err(|e| DbError::Task(e.to_string()))?;
        Ok(ok.then_some(user))
    }

    pub async fn by_id(&self, id: i64) -> Result<Option<User>, UserError> {
        let user = self
            .db
            .call(move |conn| {
                Ok(conn
                    .query_row(&format!("{SELECT_USER} WHERE id = ?1"), params![id], User::from_row)
                    .optional()?)
            })
            .await?;
        Ok(user)
    }

    pub async fn by_username(&self, username: &str) -> Result<Option<User>, UserError> {
        let username = username.to_owned();
        let user = self
            .db
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("{SELECT_USER} WHERE username = ?1"),
                        params![username],
                        User::from_row,
                    )
                    .optional()?)
            })
            .await?;
        Ok(user)
    }

    pub async fn set_tier(&self, username: &str, tier: Tier) -> Result<(), UserError> {
        let username = username.to_owned();
        let changed = self
            .db
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE users SET tier = ?1 WHERE username = ?2",
                    params![tier.as_str(), username],
                )?)
            })
            .await?;
        if changed == 0 {
            return Err(UserError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "users_tests.rs"]
mod tests;
