// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Realtime notifier: per-user WebSocket connection registry.
//!
//! Each connection owns a bounded outbox; the socket task drains it. Pushes
//! never block on a slow client: a full outbox drops the message, a closed one
//! is pruned from the registry.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};

/// Messages buffered per connection before pushes start dropping.
pub const OUTBOX_CAPACITY: usize = 64;

/// Server-to-client messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    Welcome { user_id: i64 },
    Pong,
    Echo { data: serde_json::Value },
    Error { reason: String },
    /// OAuth device/code-flow progress.
    OauthDevice { phase: DevicePhase, data: serde_json::Value },
    /// Admin broadcast payload.
    Broadcast { data: serde_json::Value },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevicePhase {
    Start,
    Result,
    ServiceStart,
    ServiceResult,
}

impl Notice {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Registry handle returned to the socket task.
pub struct Connection {
    pub id: u64,
    pub user_id: i64,
    pub outbox: mpsc::Receiver<String>,
}

type Registry = HashMap<i64, HashMap<u64, mpsc::Sender<String>>>;

#[derive(Clone, Default)]
pub struct Notifier {
    conns: Arc<RwLock<Registry>>,
    next_id: Arc<AtomicU64>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn connect(&self, user_id: i64) -> Connection {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);
        self.conns.write().await.entry(user_id).or_default().insert(id, tx);
        tracing::debug!(user_id, conn = id, "ws connected");
        Connection { id, user_id, outbox: rx }
    }

    /// Remove one connection. Returns whether it was registered.
    pub async fn disconnect(&self, user_id: i64, conn_id: u64) -> bool {
        let mut conns = self.conns.write().await;
        let Some(user) = conns.get_mut(&user_id) else {
            return false;
        };
        let removed = user.remove(&conn_id).is_some();
        if user.is_empty() {
            conns.remove(&user_id);
        }
        if removed {
            tracing::debug!(user_id, conn = conn_id, "ws disconnected");
        }
        removed
    }

    /// Push to every connection of one user. Returns the delivery count.
    pub async fn send_to_user(&self, user_id: i64, notice: &Notice) -> usize {
        let text = notice.to_json();
        let (delivered, dead) = {
            let conns = self.conns.read().await;
            match conns.get(&user_id) {
                Some(user) => push_all(user.iter().map(|(id, tx)| (user_id, *id, tx)), &text),
                None => (0, Vec::new()),
            }
        };
        self.prune(dead).await;
        delivered
    }

    /// Push to every live connection. Returns the delivery count.
    pub async fn broadcast(&self, notice: &Notice) -> usize {
        let text = notice.to_json();
        let (delivered, dead) = {
            let conns = self.conns.read().await;
            push_all(
                conns.iter().flat_map(|(uid, user)| user.iter().map(move |(id, tx)| (*uid, *id, tx))),
                &text,
            )
        };
        self.prune(dead).await;
        delivered
    }

    pub async fn connection_count(&self) -> usize {
        self.conns.read().await.values().map(HashMap::len).sum()
    }

    async fn prune(&self, dead: Vec<(i64, u64)>) {
        for (user_id, conn_id) in dead {
            self.disconnect(user_id, conn_id).await;
        }
    }
}

fn push_all<'a>(
    targets: impl Iterator<Item = (i64, u64, &'a mpsc::Sender<String>)>,
    text: &str,
) -> (usize, Vec<(i64, u64)>) {
    let mut delivered = 0;
    let mut dead = Vec::new();
    for (user_id, conn_id, tx) in targets {
        match tx.try_send(text.to_owned()) {
            Ok(()) => delivered += 1,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(user_id, conn = conn_id, "ws outbox full, dropping message");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => dead.push((user_id, conn_id)),
        }
    }
    (delivered, dead)
}

/// Sliding-window message counter for one connection.
#[derive(Debug)]
pub struct RateWindow {
    limit: usize,
    window: Duration,
    hits: VecDeque<Instant>,
}

impl RateWindow {
    pub fn per_minute(limit: usize) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    pub fn new(limit: usize, window: Duration) -> Self {
        Self { limit, window, hits: VecDeque::new() }
    }

    /// Record a message at `now`; false when the cap is already reached.
    pub fn allow_at(&mut self, now: Instant) -> bool {
        while let Some(front) = self.hits.front() {
            if now.duration_since(*front) >= self.window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
        if self.hits.len() >= self.limit {
            return false;
        }
        self.hits.push_back(now);
        true
    }

    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }
}

#[cfg(test)]
#[path = "notify_tests.rs"]
mod tests;
