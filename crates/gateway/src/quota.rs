// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-user daily operation quota.
//!
//! Days are UTC calendar dates (`YYYY-MM-DD`). Consumption is a single
//! conditional upsert, so concurrent callers for the same (user, day) can
//! never push the counter past the ceiling.

use chrono::{NaiveDate, Utc};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use crate::db::{Db, DbError};
use crate::session::users::Tier;
use crate::state::epoch_secs;

#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    #[error("daily quota exceeded ({used}/{limit})")]
    Exceeded { used: u32, limit: u32 },
    #[error(transparent)]
    Db(#[from] DbError),
}

/// Usage of one user on one day, as counted by `consume` or `peek`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaUsage {
    pub day: String,
    pub used: u32,
    pub total: u32,
    pub left: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayCount {
    pub day: String,
    pub count: u32,
    pub updated_at: i64,
}

/// Current UTC day key.
pub fn today() -> String {
    day_key(Utc::now().date_naive())
}

pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[derive(Clone)]
pub struct QuotaLedger {
    db: Db,
    basic: u32,
    premium: u32,
}

impl QuotaLedger {
    pub fn new(db: Db, basic: u32, premium: u32) -> Self {
        Self { db, basic, premium }
    }

    pub fn limit_for(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Basic => self.basic,
            Tier::Premium => self.premium,
        }
    }

    /// Charge one unit for today.
    pub async fn consume(&self, user_id: i64, tier: Tier) -> Result<QuotaUsage, QuotaError> {
        self.consume_on(user_id, tier, &today()).await
    }

    /// Charge one unit against `day`. Fails without mutating once the
    /// counter has reached the tier ceiling.
    pub async fn consume_on(&self, user_id: i64, tier: Tier, day: &str) -> Result<QuotaUsage, QuotaError> {
        let limit = self.limit_for(tier);
        let key = day.to_owned();
        let (changed, used) = self
            .db
            .call(move |conn| {
                let now = epoch_secs() as i64;
                let changed = conn.execute(
                    "INSERT INTO quota_counters (user_id, day, count, updated_at)
                     SELECT ?1, ?2, 1, ?4 WHERE ?3 > 0
                     ON CONFLICT(user_id, day) DO UPDATE
                         SET count = count + 1, updated_at = excluded.updated_at
                         WHERE count < ?3",
                    params![user_id, key, limit, now],
                )?;
                let used: Option<u32> = conn
                    .query_row(
                        "SELECT count FROM quota_counters WHERE user_id = ?1 AND day = ?2",
                        params![user_id, key],
                        |r| r.get(0),
                    )
                    .optional()?;
                Ok((changed, used.unwrap_or(0)))
            })
            .await?;

        if changed == 0 {
            tracing::debug!(user_id, used, limit, "quota exceeded");
            return Err(QuotaError::Exceeded { used, limit });
        }
        Ok(QuotaUsage { day: day.to_owned(), used, total: limit, left: limit.saturating_sub(used) })
    }

    /// Read today's usage without creating a row.
    pub async fn peek(&self, user_id: i64, tier: Tier) -> Result<QuotaUsage, QuotaError> {
        self.peek_on(user_id, tier, &today()).await
    }

    pub async fn peek_on(&self, user_id: i64, tier: Tier, day: &str) -> Result<QuotaUsage, QuotaError> {
        let limit = self.limit_for(tier);
        let key = day.to_owned();
        let used = self
            .db
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT count FROM quota_counters WHERE user_id = ?1 AND day = ?2",
                        params![user_id, key],
                        |r| r.get::<_, u32>(0),
                    )
                    .optional()?)
            })
            .await?
            .unwrap_or(0);
        Ok(QuotaUsage { day: day.to_owned(), used, total: limit, left: limit.saturating_sub(used) })
    }

    /// Every recorded day for the user, newest first.
    pub async fn history(&self, user_id: i64) -> Result<Vec<DayCount>, QuotaError> {
        let rows = self
            .db
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT day, count, updated_at FROM quota_counters
                     WHERE user_id = ?1 ORDER BY day DESC",
                )?;
                let rows = stmt
                    .query_map(params![user_id], |r| {
                        Ok(DayCount { day: r.get(0)?, count: r.get(1)?, updated_at: r.get(2)? })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    /// Delete one day's counter, or every counter for the user when `day`
    /// is `None`. Returns the number of rows removed.
    pub async fn reset(&self, user_id: i64, day: Option<&str>) -> Result<usize, QuotaError> {
        let day = day.map(str::to_owned);
        let removed = self
            .db
            .call(move |conn| {
                let n = match day {
                    Some(d) => conn.execute(
                        "DELETE FROM quota_counters WHERE user_id = ?1 AND day = ?2",
                        params![user_id, d],
                    )?,
                    None => conn.execute("DELETE FROM quota_counters WHERE user_id = ?1", params![user_id])?,
                };
                Ok(n)
            })
            .await?;
        Ok(removed)
    }
}

#[cfg(test)]
#[path = "quota_tests.rs"]
mod tests;
