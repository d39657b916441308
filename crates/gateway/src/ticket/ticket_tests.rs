// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;

use axum::extract::Query;
use axum::routing::get;
use axum::{Json, Router};
use proptest::prelude::*;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::credential::oauth::OAuthEndpoint;
use crate::crypto::TokenCipher;

const DAY: u64 = 86_400;

async fn fake_pan() -> anyhow::Result<String> {
    let app = Router::new().route(
        "/rest/2.0/xpan/multimedia",
        get(|Query(q): Query<HashMap<String, String>>| async move {
            match q.get("fsids").map(String::as_str) {
                Some("[5]") => Json(json!({"errno": 0, "list": [{"fs_id": 5, "dlink": "https://d.example/5"}]})),
                _ => Json(json!({"errno": 42213, "errmsg": "file not found"})),
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let base = format!("http://{}", listener.local_addr()?);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(base)
}

fn service_with(base: &str) -> anyhow::Result<(TicketService, TokenStore)> {
    let db = Db::open_in_memory()?;
    let tokens = TokenStore::new(
        db.clone(),
        TokenCipher::new("k"),
        OAuthEndpoint::new(base, None, None),
        30 * DAY,
    );
    let pan = PanClient::new(base, base, None);
    let svc = TicketService::new(db, Signer::new("ticket-secret"), tokens.clone(), pan, Duration::from_secs(300));
    Ok((svc, tokens))
}

fn service() -> anyhow::Result<TicketService> {
    Ok(service_with("http://127.0.0.1:9")?.0)
}

fn link(url: &str) -> IssueRequest {
    IssueRequest { scope: Scope::Service, target: TicketTarget::DirectLink(url.to_owned()), ttl: None }
}

#[tokio::test]
async fn issue_and_redeem_direct_link() -> anyhow::Result<()> {
    let svc = service()?;
    let issued = svc.issue(link("https://d.example/a")).await?;
    assert_eq!(issued.ttl, 300);

    let claims = svc.redeem(&issued.ticket).await?;
    assert_eq!(claims.dlink, "https://d.example/a");
    assert_eq!(claims.typ, "dl");
    assert_eq!(claims.scope, "service");

    // Multi-use within ttl.
    assert!(svc.redeem(&issued.ticket).await.is_ok());

    let page = svc.list(TicketFilter { scope: None, consumed: Some(true) }, 1, 50).await?;
    assert_eq!(page.total, 1);
    assert!(page.items[0].consumed_at.is_some());
    Ok(())
}

#[tokio::test]
async fn expiry_is_reported_distinctly() -> anyhow::Result<()> {
    let svc = service()?;
    let issued = svc
        .issue(IssueRequest { ttl: Some(Duration::from_secs(1)), ..link("https://d.example/b") })
        .await?;
    let claims = svc.verify_at(&issued.ticket, issued.expires_at - 1)?;
    assert_eq!(claims.exp, issued.expires_at);
    assert!(matches!(svc.verify_at(&issued.ticket, issued.expires_at + 1), Err(TicketError::Expired)));
    Ok(())
}

#[tokio::test]
async fn expired_ticket_rejected_after_wait() -> anyhow::Result<()> {
    let svc = service()?;
    let issued = svc
        .issue(IssueRequest { ttl: Some(Duration::from_secs(1)), ..link("https://d.example/c") })
        .await?;
    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert!(matches!(svc.redeem(&issued.ticket).await, Err(TicketError::Expired)));
    Ok(())
}

#[tokio::test]
async fn revoked_ticket_is_refused() -> anyhow::Result<()> {
    let svc = service()?;
    let issued = svc.issue(link("https://d.example/d")).await?;
    assert!(svc.revoke(&issued.jti).await?);
    assert!(matches!(svc.redeem(&issued.ticket).await, Err(TicketError::Revoked)));
    assert!(!svc.revoke("missing").await?);
    Ok(())
}

#[tokio::test]
async fn session_token_is_not_a_ticket() -> anyhow::Result<()> {
    let svc = service()?;
    let other = Signer::new("ticket-secret").sign(&json!({"typ": "access", "exp": epoch_secs() + 60}))?;
    assert!(matches!(svc.verify(&other), Err(TicketError::Malformed)));
    Ok(())
}

#[tokio::test]
async fn file_id_is_resolved_with_scope_token() -> anyhow::Result<()> {
    let base = fake_pan().await?;
    let (svc, tokens) = service_with(&base)?;

    let missing = svc
        .issue(IssueRequest { scope: Scope::Service, target: TicketTarget::FileId(5), ttl: None })
        .await;
    assert!(matches!(missing, Err(TicketError::TokenMissing(Scope::Service))));

    tokens.save(Scope::Service, "svc-token", None, None).await?;
    let issued = svc
        .issue(IssueRequest { scope: Scope::Service, target: TicketTarget::FileId(5), ttl: None })
        .await?;
    let claims = svc.verify(&issued.ticket)?;
    assert_eq!(claims.dlink, "https://d.example/5");
    assert_eq!(claims.fsid.as_deref(), Some("5"));

    let unresolved = svc
        .issue(IssueRequest { scope: Scope::Service, target: TicketTarget::FileId(6), ttl: None })
        .await;
    assert!(matches!(unresolved, Err(TicketError::Resolve(_))));
    assert_eq!(svc.list(TicketFilter::default(), 1, 50).await?.total, 1);
    Ok(())
}

#[tokio::test]
async fn gc_removes_expired_and_old_consumed() -> anyhow::Result<()> {
    let svc = service()?;
    let now = epoch_secs() as i64;
    let day = DAY as i64;
    svc.db
        .call(move |conn| {
            let insert = "INSERT INTO tickets (jti, scope, dlink, issued_at, expires_at, consumed_at)
                          VALUES (?1, 'service', 'https://d.example', ?2, ?3, ?4)";
            conn.execute(insert, params!["expired", now - 600, now - 300, Option::<i64>::None])?;
            conn.execute(insert, params!["old", now - 10 * day, now + 600, now - 10 * day])?;
            conn.execute(insert, params!["recent", now - day, now + 600, now - day])?;
            Ok(())
        })
        .await?;

    let removed = svc.gc_at(now as u64, Duration::from_secs(7 * DAY)).await?;
    assert_eq!(removed, 2);
    let left: Vec<String> = svc.list(TicketFilter::default(), 1, 50).await?.items.into_iter().map(|t| t.jti).collect();
    assert_eq!(left, vec!["recent"]);
    Ok(())
}

#[tokio::test]
async fn gc_clamps_extreme_inputs() -> anyhow::Result<()> {
    let svc = service()?;
    let now = epoch_secs() as i64;
    svc.db
        .call(move |conn| {
            conn.execute(
                "INSERT INTO tickets (jti, scope, dlink, issued_at, expires_at, consumed_at)
                 VALUES ('used', 'service', 'https://d.example', ?1, ?2, ?3)",
                params![now - 60, now + 600, now - 60],
            )?;
            Ok(())
        })
        .await?;

    // Unbounded retention keeps every consumed ticket that has not expired.
    assert_eq!(svc.gc_at(now as u64, Duration::MAX).await?, 0);
    // A clock past i64 range clamps and sweeps everything.
    assert_eq!(svc.gc_at(u64::MAX, Duration::ZERO).await?, 1);
    Ok(())
}

proptest! {
    #[test]
    fn flipped_ticket_never_verifies(idx in 0usize..512, replacement in proptest::char::range('A', 'z')) {
        let svc = Signer::new("ticket-secret");
        let claims = TicketClaims {
            typ: TICKET_TYPE.into(),
            jti: "abc".into(),
            scope: "service".into(),
            sub: None,
            dlink: "https://d.example/x".into(),
            fsid: None,
            iat: 1,
            exp: u64::MAX / 2,
        };
        let token = svc.sign(&claims).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let i = idx % token.len();
        let mut bytes = token.clone().into_bytes();
        prop_assume!(bytes[i] != b'.' && bytes[i] != replacement as u8);
        bytes[i] = replacement as u8;
        let forged = String::from_utf8_lossy(&bytes).into_owned();
        let result: Result<TicketClaims, SignError> = svc.verify(&forged, 2);
        prop_assert_eq!(result, Err(SignError::Malformed));
    }
}

#[tokio::test]
async fn gc_task_sweeps_and_stops_on_shutdown() -> anyhow::Result<()> {
    let svc = service()?;
    let now = epoch_secs() as i64;
    svc.db
        .call(move |conn| {
            conn.execute(
                "INSERT INTO tickets (jti, scope, dlink, issued_at, expires_at)
                 VALUES ('stale', 'service', 'https://d.example', ?1, ?2)",
                params![now - 100, now - 50],
            )?;
            Ok(())
        })
        .await?;

    let shutdown = CancellationToken::new();
    let handle = gc::spawn_ticket_gc(
        svc.clone(),
        Duration::from_millis(20),
        Duration::from_secs(7 * DAY),
        shutdown.clone(),
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(svc.list(TicketFilter::default(), 1, 50).await?.total, 0);

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle).await??;
    Ok(())
}
