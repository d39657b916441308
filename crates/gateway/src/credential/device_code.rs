// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OAuth device authorization grant.
//!
//! Single-shot calls only: the client drives the poll loop and its backoff.

use serde::Serialize;

use crate::credential::oauth::{
    read_auth_body, DeviceCodeResponse, OAuthEndpoint, TokenResponse, OAUTH_SCOPE,
};
use crate::credential::CredentialError;

/// Outcome of one device-token poll.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DevicePoll {
    /// User has not finished authorizing yet.
    Pending,
    /// Polling too fast; the client should widen its interval.
    SlowDown,
    Granted { token: TokenResponse },
    /// Terminal failure (denied, expired code, bad client).
    Failed { error: String, description: String },
}

/// Start the device authorization flow. No local state changes.
pub async fn initiate_device_auth(
    oauth: &OAuthEndpoint,
) -> Result<DeviceCodeResponse, CredentialError> {
    let resp = oauth
        .http
        .get(oauth.url("/oauth/2.0/device/code"))
        .query(&[
            ("response_type", "device_code"),
            ("client_id", oauth.client_id.as_str()),
            ("scope", OAUTH_SCOPE),
        ])
        .send()
        .await?;

    let body = read_auth_body(resp).await?;
    serde_json::from_value(body).map_err(|e| CredentialError::Decode(e.to_string()))
}

/// Poll the token endpoint once for `device_code`.
///
/// Pending and slow-down are ordinary outcomes, not errors. Transport
/// failures are errors so the caller can tell "retry later" from "denied".
pub async fn poll_device_token(
    oauth: &OAuthEndpoint,
    device_code: &str,
) -> Result<DevicePoll, CredentialError> {
    let result = oauth
        .token_request(&[("grant_type", "device_token"), ("code", device_code)])
        .await;

    match result {
        Ok(body) => {
            let token: TokenResponse =
                serde_json::from_value(body).map_err(|e| CredentialError::Decode(e.to_string()))?;
            if token.access_token.is_empty() {
                return Ok(DevicePoll::Pending);
            }
            Ok(DevicePoll::Granted { token })
        }
        Err(CredentialError::Provider { error, description, .. }) => Ok(match error.as_str() {
            "authorization_pending" => DevicePoll::Pending,
            "slow_down" => DevicePoll::SlowDown,
            _ => DevicePoll::Failed { error, description },
        }),
        Err(e) => Err(e),
    }
}
