// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pangate: backend-for-frontend for a cloud-drive account.
//!
//! Brokers upstream OAuth credentials, meters charged operations against a
//! daily quota, signs short-lived download tickets and streams downloads,
//! and exposes a closed set of provider operations over HTTP.

pub mod config;
pub mod credential;
pub mod crypto;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod index;
pub mod notify;
pub mod proxy;
pub mod quota;
pub mod session;
pub mod signing;
pub mod state;
pub mod ticket;
pub mod transport;
pub mod upstream;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::state::AppState;
use crate::ticket::gc::spawn_ticket_gc;
use crate::transport::build_router;

/// Run the gateway until shutdown.
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    config.validate()?;
    upstream::ensure_crypto();

    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();
    let state = Arc::new(AppState::open(config, shutdown.clone())?);

    spawn_ticket_gc(
        state.tickets.clone(),
        state.config.ticket_gc_interval(),
        state.config.ticket_retention(),
        shutdown.clone(),
    );

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, shutting down");
            }
            shutdown.cancel();
        });
    }

    tracing::info!("pangate listening on {addr}");
    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
