// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OAuth wire types and the provider's auth endpoint.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::credential::CredentialError;

/// Scope requested for linked accounts.
pub const OAUTH_SCOPE: &str = "basic,netdisk";

/// OAuth2 token response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Device authorization response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    #[serde(alias = "verification_uri")]
    pub verification_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qrcode_url: Option<String>,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default = "default_interval")]
    pub interval: u64,
}

fn default_interval() -> u64 {
    5
}

/// Error payload returned by the auth endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderErrorBody {
    pub error: String,
    #[serde(default)]
    pub error_description: String,
}

/// Connection details for the provider's OAuth endpoint.
#[derive(Clone)]
pub struct OAuthEndpoint {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub http: reqwest::Client,
}

impl OAuthEndpoint {
    pub fn new(base_url: &str, client_id: Option<&str>, client_secret: Option<&str>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            client_id: client_id.unwrap_or_default().to_owned(),
            client_secret: client_secret.unwrap_or_default().to_owned(),
            http: crate::upstream::http_client(Duration::from_secs(30)),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET the token endpoint with `params` (client credentials appended).
    ///
    /// Returns the raw JSON body on success; a body carrying `error`, whatever
    /// the status, becomes [`CredentialError::Provider`].
    pub async fn token_request(
        &self,
        params: &[(&str, &str)],
    ) -> Result<serde_json::Value, CredentialError> {
        let mut query: Vec<(&str, &str)> = params.to_vec();
        query.push(("client_id", &self.client_id));
        query.push(("client_secret", &self.client_secret));

        let resp = self.http.get(self.url("/oauth/2.0/token")).query(&query).send().await?;
        read_auth_body(resp).await
    }
}

/// Split an auth endpoint response into JSON or a structured provider error.
pub async fn read_auth_body(resp: reqwest::Response) -> Result<serde_json::Value, CredentialError> {
    let status = resp.status();
    let text = resp.text().await?;
    let body: serde_json::Value = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(_) if status.is_success() => {
            return Err(CredentialError::Decode(truncate(&text, 200)));
        }
        Err(_) => {
            return Err(CredentialError::Provider {
                status: status.as_u16(),
                error: format!("http_{}", status.as_u16()),
                description: truncate(&text, 200),
            });
        }
    };

    if let Ok(err) = serde_json::from_value::<ProviderErrorBody>(body.clone()) {
        return Err(CredentialError::Provider {
            status: status.as_u16(),
            error: err.error,
            description: err.error_description,
        });
    }
    if !status.is_success() {
        return Err(CredentialError::Provider {
            status: status.as_u16(),
            error: format!("http_{}", status.as_u16()),
            description: truncate(&text, 200),
        });
    }
    Ok(body)
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
