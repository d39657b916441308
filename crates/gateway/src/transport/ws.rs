// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Realtime notification WebSocket.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::time::MissedTickBehavior;

use crate::notify::{Notice, RateWindow};
use crate::session::users::User;
use crate::state::AppState;
use crate::transport::auth::{authenticate, bearer_token};

/// Close code sent when the token is missing or invalid.
pub const CLOSE_UNAUTHORIZED: u16 = 4401;
/// Close code sent when no ping arrived within the heartbeat timeout.
pub const CLOSE_HEARTBEAT_TIMEOUT: u16 = 4408;
const CLOSE_GOING_AWAY: u16 = 1001;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// `GET /ws`. The token comes from `?token=` or a bearer header; failures
/// are reported with a close frame after the upgrade.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let token = query.token.filter(|t| !t.is_empty()).or_else(|| bearer_token(&headers).map(str::to_owned));
    let user = match token {
        Some(t) => authenticate(&state, &t).await.ok(),
        None => None,
    };
    ws.on_upgrade(move |socket| async move {
        match user {
            Some(user) => handle_ws(socket, state, user).await,
            None => {
                let mut socket = socket;
                let _ = socket.send(close(CLOSE_UNAUTHORIZED, "unauthorized")).await;
            }
        }
    })
}

fn close(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame { code, reason: reason.into() }))
}

async fn send_notice(tx: &mut SplitSink<WebSocket, Message>, notice: &Notice) -> bool {
    tx.send(Message::Text(notice.to_json().into())).await.is_ok()
}

/// Per-connection loop: drains the outbox, answers client messages and
/// enforces the heartbeat.
async fn handle_ws(socket: WebSocket, state: Arc<AppState>, user: User) {
    let mut conn = state.notifier.connect(user.id).await;
    state.notifier.send_to_user(user.id, &Notice::Welcome { user_id: user.id }).await;

    let (mut ws_tx, mut ws_rx) = socket.split();
    let timeout = state.config.ws_heartbeat_timeout();
    let mut rate = RateWindow::per_minute(state.config.ws_max_messages_per_minute as usize);
    let mut last_ping = Instant::now();
    let mut check = tokio::time::interval(state.heartbeat_check_interval());
    check.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                let _ = ws_tx.send(close(CLOSE_GOING_AWAY, "shutting down")).await;
                break;
            }

            pushed = conn.outbox.recv() => {
                let Some(text) = pushed else { break };
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }

            _ = check.tick() => {
                if last_ping.elapsed() > timeout {
                    tracing::debug!(user_id = user.id, conn = conn.id, "ws heartbeat timeout");
                    let _ = ws_tx.send(close(CLOSE_HEARTBEAT_TIMEOUT, "heartbeat timeout")).await;
                    break;
                }
            }

            msg = ws_rx.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => continue,
                };
                if !rate.allow() {
                    if !send_notice(&mut ws_tx, &Notice::Error { reason: "rate_limit".to_owned() }).await {
                        break;
                    }
                    continue;
                }
                let data = serde_json::from_str::<serde_json::Value>(text.as_str())
                    .unwrap_or_else(|_| serde_json::Value::String(text.to_string()));
                let reply = if data.get("type").and_then(|t| t.as_str()) == Some("ping") {
                    last_ping = Instant::now();
                    Notice::Pong
                } else {
                    Notice::Echo { data }
                };
                if !send_notice(&mut ws_tx, &reply).await {
                    break;
                }
            }
        }
    }

    state.notifier.disconnect(user.id, conn.id).await;
}
