// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::credential::oauth::OAuthEndpoint;
use crate::credential::store::TokenStore;
use crate::crypto::TokenCipher;
use crate::db::{Db, DbError};
use crate::dispatch::Dispatcher;
use crate::index::FileIndex;
use crate::notify::Notifier;
use crate::proxy::DownloadProxy;
use crate::quota::QuotaLedger;
use crate::session::users::UserStore;
use crate::session::SessionIssuer;
use crate::signing::Signer;
use crate::ticket::TicketService;
use crate::upstream::client::PanClient;

/// Shared gateway state.
pub struct AppState {
    pub config: GatewayConfig,
    pub db: Db,
    pub users: UserStore,
    pub sessions: SessionIssuer,
    pub tokens: TokenStore,
    pub quota: QuotaLedger,
    pub tickets: TicketService,
    pub proxy: DownloadProxy,
    pub notifier: Notifier,
    pub pan: PanClient,
    pub dispatcher: Dispatcher,
    pub index: FileIndex,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Open the configured database and wire every service to it.
    pub fn open(config: GatewayConfig, shutdown: CancellationToken) -> Result<Self, DbError> {
        let db = Db::open(&config.database_path)?;
        Ok(Self::with_db(config, db, shutdown))
    }

    pub fn with_db(config: GatewayConfig, db: Db, shutdown: CancellationToken) -> Self {
        let signer = Signer::new(&config.session_secret);
        let oauth = OAuthEndpoint::new(
            &config.oauth_base_url,
            config.client_id.as_deref(),
            config.client_secret.as_deref(),
        );
        let tokens = TokenStore::new(
            db.clone(),
            TokenCipher::new(&config.master_key),
            oauth,
            config.refresh_window().as_secs(),
        );
        let pan = PanClient::new(&config.api_base_url, &config.pcs_base_url, config.app_id.clone());
        let quota = QuotaLedger::new(db.clone(), config.quota_basic, config.quota_premium);
        let tickets =
            TicketService::new(db.clone(), signer.clone(), tokens.clone(), pan.clone(), config.ticket_ttl());
        let dispatcher = Dispatcher::new(
            pan.clone(),
            tokens.clone(),
            quota.clone(),
            &config.upload_root,
            config.data_dir.clone(),
        );

        Self {
            users: UserStore::new(db.clone()),
            sessions: SessionIssuer::new(signer, config.access_ttl(), config.refresh_ttl()),
            proxy: DownloadProxy::new(tokens.clone()),
            index: FileIndex::new(db.clone()),
            notifier: Notifier::new(),
            tokens,
            quota,
            tickets,
            pan,
            dispatcher,
            db,
            config,
            shutdown,
        }
    }

    pub fn heartbeat_check_interval(&self) -> Duration {
        (self.config.ws_heartbeat_timeout() / 5).max(Duration::from_millis(50))
    }
}

/// Return current epoch seconds.
pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Render epoch seconds as RFC 3339 (UTC).
pub fn rfc3339(secs: u64) -> String {
    chrono::DateTime::from_timestamp(secs as i64, 0)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .unwrap_or_default()
}
