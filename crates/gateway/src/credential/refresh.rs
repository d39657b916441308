// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token endpoint grants: refresh and authorization-code exchange.

use crate::credential::oauth::{OAuthEndpoint, TokenResponse};
use crate::credential::CredentialError;

fn into_token(body: serde_json::Value) -> Result<TokenResponse, CredentialError> {
    let token: TokenResponse =
        serde_json::from_value(body).map_err(|e| CredentialError::Decode(e.to_string()))?;
    if token.access_token.is_empty() {
        return Err(CredentialError::Decode("response has no access_token".to_owned()));
    }
    Ok(token)
}

/// Perform a single refresh request. Never retried: the provider may treat
/// refresh tokens as one-time-use.
pub async fn do_refresh(
    oauth: &OAuthEndpoint,
    refresh_token: &str,
) -> Result<TokenResponse, CredentialError> {
    let body = oauth
        .token_request(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)])
        .await?;
    into_token(body)
}

/// Exchange an authorization code. The caller decides which scope the
/// resulting tokens belong to.
pub async fn exchange_code(
    oauth: &OAuthEndpoint,
    code: &str,
    redirect_uri: &str,
) -> Result<TokenResponse, CredentialError> {
    let body = oauth
        .token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ])
        .await?;
    into_token(body)
}
