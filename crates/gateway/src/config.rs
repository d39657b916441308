// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the pangate server.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "pangate", about = "Backend-for-frontend for a shared cloud-storage account")]
pub struct GatewayConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "PANGATE_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8000, env = "PANGATE_PORT")]
    pub port: u16,

    /// SQLite database file.
    #[arg(long, default_value = "data/pangate.sqlite3", env = "PANGATE_DATABASE_PATH")]
    pub database_path: PathBuf,

    /// Local directory that `upload_local` is allowed to read from.
    #[arg(long, default_value = "data/staging", env = "PANGATE_DATA_DIR")]
    pub data_dir: PathBuf,

    /// HMAC secret for session tokens and download tickets.
    #[arg(long, default_value = "change-me-in-prod", env = "PANGATE_SESSION_SECRET")]
    pub session_secret: String,

    /// Session token algorithm. Only `HS256` is supported.
    #[arg(long, default_value = "HS256", env = "PANGATE_SESSION_ALGORITHM")]
    pub session_algorithm: String,

    /// Access session lifetime in minutes.
    #[arg(long, default_value_t = 60 * 24, env = "PANGATE_ACCESS_TTL_MINUTES")]
    pub access_ttl_minutes: u64,

    /// Refresh session lifetime in minutes.
    #[arg(long, default_value_t = 7 * 24 * 60, env = "PANGATE_REFRESH_TTL_MINUTES")]
    pub refresh_ttl_minutes: u64,

    /// Upstream OAuth client id.
    #[arg(long, env = "PANGATE_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Upstream OAuth client secret.
    #[arg(long, env = "PANGATE_CLIENT_SECRET")]
    pub client_secret: Option<String>,

    /// Redirect URI registered for the user authorization-code flow.
    #[arg(long, default_value = "http://127.0.0.1:8000/oauth/callback", env = "PANGATE_REDIRECT_URI")]
    pub redirect_uri: String,

    /// Redirect URI for the service authorization-code flow.
    /// Defaults to `/oauth/service/callback` on the user redirect's origin.
    #[arg(long, env = "PANGATE_SERVICE_REDIRECT_URI")]
    pub service_redirect_uri: Option<String>,

    /// Upstream application id (required by share creation).
    #[arg(long, env = "PANGATE_APP_ID")]
    pub app_id: Option<String>,

    /// Upstream OAuth endpoint base URL.
    #[arg(long, default_value = "https://openapi.baidu.com", env = "PANGATE_OAUTH_BASE_URL")]
    pub oauth_base_url: String,

    /// Upstream REST API base URL.
    #[arg(long, default_value = "https://pan.baidu.com", env = "PANGATE_API_BASE_URL")]
    pub api_base_url: String,

    /// Upstream block-upload base URL.
    #[arg(long, default_value = "https://d.pcs.baidu.com", env = "PANGATE_PCS_BASE_URL")]
    pub pcs_base_url: String,

    /// Master secret for credential-at-rest encryption.
    #[arg(long, default_value = "dev-master-key-32-bytes-please-change!!!", env = "PANGATE_MASTER_KEY")]
    pub master_key: String,

    /// Shared secret for administrative endpoints.
    #[arg(long, default_value = "change-admin", env = "PANGATE_ADMIN_SECRET")]
    pub admin_secret: String,

    /// Daily charged-operation ceiling for `basic` users.
    #[arg(long, default_value_t = 20, env = "PANGATE_QUOTA_BASIC")]
    pub quota_basic: u32,

    /// Daily charged-operation ceiling for `premium` users.
    #[arg(long, default_value_t = 200, env = "PANGATE_QUOTA_PREMIUM")]
    pub quota_premium: u32,

    /// Seconds without a client ping before a WebSocket is closed.
    #[arg(long, default_value_t = 35, env = "PANGATE_WS_HEARTBEAT_TIMEOUT_SECS")]
    pub ws_heartbeat_timeout_secs: u64,

    /// Inbound WebSocket messages allowed per connection per minute.
    #[arg(long, default_value_t = 240, env = "PANGATE_WS_MAX_MESSAGES_PER_MINUTE")]
    pub ws_max_messages_per_minute: u32,

    /// Default download ticket lifetime in seconds.
    #[arg(long, default_value_t = 300, env = "PANGATE_TICKET_TTL_SECS")]
    pub ticket_ttl_secs: u64,

    /// Ticket garbage collection interval in seconds.
    #[arg(long, default_value_t = 6 * 3600, env = "PANGATE_TICKET_GC_INTERVAL_SECS")]
    pub ticket_gc_interval_secs: u64,

    /// Days a consumed ticket row is retained before collection.
    #[arg(long, default_value_t = 7, env = "PANGATE_TICKET_RETENTION_DAYS")]
    pub ticket_retention_days: u64,

    /// Refresh upstream credentials expiring within this many days.
    #[arg(long, default_value_t = 30, env = "PANGATE_REFRESH_WINDOW_DAYS")]
    pub refresh_window_days: u64,

    /// Remote directory that upload operations are confined to.
    #[arg(long, default_value = "/用户上传", env = "PANGATE_UPLOAD_ROOT")]
    pub upload_root: String,

    /// Emit logs as JSON lines.
    #[arg(long, env = "PANGATE_LOG_JSON")]
    pub log_json: bool,
}

impl GatewayConfig {
    pub fn access_ttl(&self) -> Duration {
        Duration::from_secs(self.access_ttl_minutes * 60)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_ttl_minutes * 60)
    }

    pub fn ws_heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.ws_heartbeat_timeout_secs)
    }

    pub fn ticket_ttl(&self) -> Duration {
        Duration::from_secs(self.ticket_ttl_secs)
    }

    pub fn ticket_gc_interval(&self) -> Duration {
        Duration::from_secs(self.ticket_gc_interval_secs.max(1))
    }

    pub fn ticket_retention(&self) -> Duration {
        Duration::from_secs(self.ticket_retention_days * 86_400)
    }

    pub fn refresh_window(&self) -> Duration {
        Duration::from_secs(self.refresh_window_days * 86_400)
    }

    /// Redirect URI for the service authorization-code flow.
    pub fn service_redirect(&self) -> String {
        if let Some(ref uri) = self.service_redirect_uri {
            return uri.clone();
        }
        let origin = match self.redirect_uri.find("://") {
            Some(scheme_end) => {
                let rest = &self.redirect_uri[scheme_end + 3..];
                let host_end = rest.find('/').map(|i| scheme_end + 3 + i);
                &self.redirect_uri[..host_end.unwrap_or(self.redirect_uri.len())]
            }
            None => "",
        };
        format!("{origin}/oauth/service/callback")
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.session_algorithm.eq_ignore_ascii_case("HS256") {
            anyhow::bail!("unsupported session algorithm: {}", self.session_algorithm);
        }
        if !self.upload_root.starts_with('/') || self.upload_root.len() < 2 {
            anyhow::bail!("upload root must be an absolute, non-root remote path");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
