// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;

fn issuer() -> SessionIssuer {
    SessionIssuer::new(
        Signer::new("session-secret"),
        Duration::from_secs(60),
        Duration::from_secs(600),
    )
}

#[test]
fn pair_round_trips_by_kind() -> anyhow::Result<()> {
    let issuer = issuer();
    let pair = issuer.issue_pair(42)?;
    assert_eq!(pair.token_type, "bearer");
    assert_eq!(issuer.verify(&pair.access_token, SessionKind::Access)?, 42);
    assert_eq!(issuer.verify(&pair.refresh_token, SessionKind::Refresh)?, 42);
    Ok(())
}

#[test]
fn kinds_are_not_interchangeable() -> anyhow::Result<()> {
    let issuer = issuer();
    let pair = issuer.issue_pair(42)?;
    assert_eq!(issuer.verify(&pair.refresh_token, SessionKind::Access), Err(SignError::Malformed));
    assert_eq!(issuer.verify(&pair.access_token, SessionKind::Refresh), Err(SignError::Malformed));
    Ok(())
}

#[test]
fn zero_ttl_token_is_expired() -> anyhow::Result<()> {
    let issuer =
        SessionIssuer::new(Signer::new("s"), Duration::from_secs(0), Duration::from_secs(0));
    let pair = issuer.issue_pair(1)?;
    assert_eq!(issuer.verify(&pair.access_token, SessionKind::Access), Err(SignError::Expired));
    Ok(())
}
