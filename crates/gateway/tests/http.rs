// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the gateway HTTP API.
//!
//! Uses `axum_test::TestServer` over the real router; the provider is a fake
//! bound to a loopback port.

mod common;

use std::sync::Arc;

use axum::http::header::RANGE;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use serde_json::{json, Value};

use common::{FakeProvider, ADMIN, FILE_LEN};
use pangate::credential::Scope;
use pangate::state::AppState;
use pangate::transport::build_router;

struct Harness {
    server: TestServer,
    state: Arc<AppState>,
    provider: FakeProvider,
}

async fn harness() -> anyhow::Result<Harness> {
    let provider = FakeProvider::spawn().await?;
    let state = common::state(common::config(&provider, &[])?)?;
    let server = TestServer::new(build_router(Arc::clone(&state)))?;
    Ok(Harness { server, state, provider })
}

/// Register and log in; returns the access token.
async fn login(h: &Harness, username: &str) -> anyhow::Result<String> {
    let password = "Secret123";
    h.server.post("/auth/register").json(&json!({ "username": username, "password": password })).await;
    let resp = h.server.post("/auth/login").json(&json!({ "username": username, "password": password })).await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    body["access_token"].as_str().map(str::to_owned).ok_or_else(|| anyhow::anyhow!("no access token: {body}"))
}

async fn issue_ticket(h: &Harness, token: &str) -> anyhow::Result<String> {
    let resp = h
        .server
        .post("/files/download_ticket")
        .authorization_bearer(token)
        .json(&json!({ "dlink": h.provider.file_url(), "ttl": 300 }))
        .await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    body["ticket"].as_str().map(str::to_owned).ok_or_else(|| anyhow::anyhow!("no ticket: {body}"))
}

// -- Health and accounts ------------------------------------------------------

#[tokio::test]
async fn health_reports_ok() -> anyhow::Result<()> {
    let h = harness().await?;
    let resp = h.server.get("/health").await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 0);
    Ok(())
}

#[tokio::test]
async fn register_login_then_charged_operation_moves_quota() -> anyhow::Result<()> {
    let h = harness().await?;

    let resp = h.server.post("/auth/register").json(&json!({ "username": "alice", "password": "Secret123" })).await;
    resp.assert_status(StatusCode::CREATED);
    let user: Value = resp.json();
    assert_eq!(user["username"], "alice");
    assert_eq!(user["tier"], "basic");
    assert!(user.get("password_hash").is_none());

    let dup = h.server.post("/auth/register").json(&json!({ "username": "alice", "password": "Secret123" })).await;
    dup.assert_status(StatusCode::CONFLICT);

    let resp = h.server.post("/auth/login").json(&json!({ "username": "alice", "password": "Secret123" })).await;
    resp.assert_status_ok();
    let pair: Value = resp.json();
    let access = pair["access_token"].as_str().unwrap_or_default().to_owned();
    assert!(!access.is_empty());
    assert!(pair["refresh_token"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(pair["token_type"], "bearer");

    let quota: Value = h.server.get("/quota/today").authorization_bearer(&access).await.json();
    assert_eq!(quota["data"]["used"], 0);
    assert_eq!(quota["data"]["total"], 2);
    assert_eq!(quota["data"]["left"], 2);
    assert_eq!(quota["data"]["day"].as_str().map(str::len), Some(10));

    issue_ticket(&h, &access).await?;

    let quota: Value = h.server.get("/quota/today").authorization_bearer(&access).await.json();
    assert_eq!(quota["data"]["used"], 1);
    assert_eq!(quota["data"]["left"], 1);
    Ok(())
}

#[tokio::test]
async fn bad_credentials_and_tokens_are_rejected() -> anyhow::Result<()> {
    let h = harness().await?;
    login(&h, "bob").await?;

    let resp = h.server.post("/auth/login").json(&json!({ "username": "bob", "password": "wrong-pass" })).await;
    resp.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "auth_invalid");

    let short = h.server.post("/auth/register").json(&json!({ "username": "x", "password": "Secret123" })).await;
    short.assert_status(StatusCode::BAD_REQUEST);

    h.server.get("/auth/me").await.assert_status(StatusCode::UNAUTHORIZED);
    h.server.get("/quota/today").authorization_bearer("not-a-token").await.assert_status(StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn refresh_issues_new_pair_and_kinds_do_not_mix() -> anyhow::Result<()> {
    let h = harness().await?;
    let password = "Secret123";
    h.server.post("/auth/register").json(&json!({ "username": "carol", "password": password })).await;
    let pair: Value = h.server.post("/auth/login").json(&json!({ "username": "carol", "password": password })).await.json();

    let resp = h.server.post("/auth/refresh").json(&json!({ "refresh_token": pair["refresh_token"] })).await;
    resp.assert_status_ok();
    let fresh: Value = resp.json();
    let access = fresh["access_token"].as_str().unwrap_or_default();

    let me: Value = h.server.get("/auth/me").authorization_bearer(access).await.json();
    assert_eq!(me["username"], "carol");

    // An access token is not a refresh token, and the reverse.
    h.server
        .post("/auth/refresh")
        .json(&json!({ "refresh_token": pair["access_token"] }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    let refresh = pair["refresh_token"].as_str().unwrap_or_default();
    h.server.get("/auth/me").authorization_bearer(refresh).await.assert_status(StatusCode::UNAUTHORIZED);
    Ok(())
}

// -- Tickets and the download proxy -------------------------------------------

#[tokio::test]
async fn ticket_redemption_forwards_status_and_range() -> anyhow::Result<()> {
    let h = harness().await?;
    let token = login(&h, "alice").await?;
    let ticket = issue_ticket(&h, &token).await?;

    let full = h.server.get("/files/proxy_download").add_query_param("ticket", &ticket).await;
    full.assert_status_ok();
    assert_eq!(full.header("content-length"), FILE_LEN.to_string().as_str());
    assert_eq!(full.as_bytes().len(), FILE_LEN);

    let part = h
        .server
        .get("/files/proxy_download")
        .add_query_param("ticket", &ticket)
        .add_header(RANGE, HeaderValue::from_static("bytes=0-99"))
        .await;
    part.assert_status(StatusCode::PARTIAL_CONTENT);
    assert_eq!(part.header("content-range"), format!("bytes 0-99/{FILE_LEN}").as_str());
    assert_eq!(part.as_bytes().len(), 100);

    // Clients that cannot set headers pass the range as a query parameter.
    let query = h
        .server
        .get("/files/proxy_download")
        .add_query_param("ticket", &ticket)
        .add_query_param("range", "bytes=100-199")
        .await;
    query.assert_status(StatusCode::PARTIAL_CONTENT);
    assert_eq!(query.as_bytes().as_ref(), &common::payload()[100..200]);
    Ok(())
}

#[tokio::test]
async fn forged_and_revoked_tickets_are_refused() -> anyhow::Result<()> {
    let h = harness().await?;
    let token = login(&h, "alice").await?;
    let ticket = issue_ticket(&h, &token).await?;

    let mut forged = ticket.clone().into_bytes();
    let mid = forged.len() / 2;
    forged[mid] = if forged[mid] == b'A' { b'B' } else { b'A' };
    let forged = String::from_utf8(forged)?;
    let resp = h.server.get("/files/proxy_download").add_query_param("ticket", &forged).await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "ticket_malformed");

    let listed: Value = h.server.get("/admin/tickets").add_query_param("admin_secret", ADMIN).await.json();
    assert_eq!(listed["total"], 1);
    let jti = listed["items"][0]["jti"].as_str().unwrap_or_default().to_owned();

    h.server
        .post("/admin/tickets/revoke")
        .add_query_param("admin_secret", ADMIN)
        .add_query_param("jti", &jti)
        .await
        .assert_status_ok();
    let resp = h.server.get("/files/proxy_download").add_query_param("ticket", &ticket).await;
    resp.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "ticket_revoked");

    h.server
        .post("/admin/tickets/revoke")
        .add_query_param("admin_secret", ADMIN)
        .add_query_param("jti", "unknown")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn ticket_without_target_is_bad_request_and_free() -> anyhow::Result<()> {
    let h = harness().await?;
    let token = login(&h, "alice").await?;
    h.server
        .post("/files/download_ticket")
        .authorization_bearer(&token)
        .json(&json!({ "ttl": 60 }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    let quota: Value = h.server.get("/quota/today").authorization_bearer(&token).await.json();
    assert_eq!(quota["data"]["used"], 0);
    Ok(())
}

// -- Exec envelope ------------------------------------------------------------

#[tokio::test]
async fn exec_rejections_are_local_400s() -> anyhow::Result<()> {
    let h = harness().await?;
    let token = login(&h, "alice").await?;
    h.state.tokens.save(Scope::Service, "svc-token", None, None).await?;

    let resp = h
        .server
        .post("/mcp/public/exec")
        .authorization_bearer(&token)
        .json(&json!({ "op": "drop_tables", "args": { "path": "/" } }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = resp.json();
    assert_eq!(body, json!({ "status": "error", "error": "op_not_allowed", "op": "drop_tables" }));

    let resp = h
        .server
        .post("/mcp/public/exec")
        .authorization_bearer(&token)
        .json(&json!({ "op": "upload_text", "args": { "content": "hi", "dir": "/etc" } }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = resp.json();
    assert_eq!(body["error"], "upload_dir_not_allowed");

    let resp = h.server.post("/mcp/public/exec").authorization_bearer(&token).json(&json!({ "op": "playlist" })).await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = resp.json();
    assert_eq!(body["error"], "op_not_implemented");

    assert_eq!(h.provider.hits(), 0);
    Ok(())
}

#[tokio::test]
async fn exec_provider_outcomes_are_200_envelopes() -> anyhow::Result<()> {
    let h = harness().await?;
    let token = login(&h, "alice").await?;

    let resp = h.server.post("/mcp/user/exec").authorization_bearer(&token).json(&json!({ "op": "quota" })).await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"], "user_token_missing");

    h.state.tokens.save(Scope::Service, "svc-token", None, None).await?;
    let resp = h.server.post("/mcp/public/exec").authorization_bearer(&token).json(&json!({ "op": "quota" })).await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["data"]["total"], 2048);

    let resp = h
        .server
        .post("/mcp/public/exec")
        .authorization_bearer(&token)
        .json(&json!({ "op": "search_filename", "args": { "key": "cat" } }))
        .await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"], "errno_31066");
    Ok(())
}

#[tokio::test]
async fn exec_charged_ops_stop_at_the_ceiling() -> anyhow::Result<()> {
    let h = harness().await?;
    let token = login(&h, "alice").await?;
    h.state.tokens.save(Scope::Service, "svc-token", None, None).await?;
    let call = json!({ "op": "file_metas", "args": { "fsids": [3] } });

    for _ in 0..2 {
        let resp = h.server.post("/mcp/public/exec").authorization_bearer(&token).json(&call).await;
        resp.assert_status_ok();
    }
    let hits = h.provider.hits();
    let resp = h.server.post("/mcp/public/exec").authorization_bearer(&token).json(&call).await;
    resp.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "quota_exceeded");
    assert_eq!(h.provider.hits(), hits);
    Ok(())
}

// -- Administration -----------------------------------------------------------

#[tokio::test]
async fn admin_routes_require_the_secret() -> anyhow::Result<()> {
    let h = harness().await?;
    login(&h, "alice").await?;

    h.server.get("/admin/quota").add_query_param("username", "alice").await.assert_status(StatusCode::UNAUTHORIZED);
    h.server
        .get("/admin/quota")
        .add_query_param("username", "alice")
        .add_query_param("admin_secret", "guess")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let resp = h
        .server
        .get("/admin/quota")
        .add_query_param("username", "alice")
        .add_header(HeaderName::from_static("x-admin-secret"), HeaderValue::from_static(ADMIN))
        .await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["username"], "alice");

    h.server
        .get("/admin/quota")
        .add_query_param("username", "nobody")
        .add_query_param("admin_secret", ADMIN)
        .await
        .assert_status(StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn tier_change_and_quota_reset() -> anyhow::Result<()> {
    let h = harness().await?;
    let token = login(&h, "alice").await?;
    issue_ticket(&h, &token).await?;

    let resp = h
        .server
        .post("/auth/set_tier")
        .add_query_param("admin_secret", ADMIN)
        .add_query_param("username", "alice")
        .add_query_param("tier", "premium")
        .await;
    resp.assert_status_ok();
    let quota: Value = h.server.get("/quota/today").authorization_bearer(&token).await.json();
    assert_eq!(quota["data"]["tier"], "premium");
    assert_eq!(quota["data"]["total"], 200);
    assert_eq!(quota["data"]["used"], 1);

    h.server
        .post("/auth/set_tier")
        .add_query_param("admin_secret", ADMIN)
        .add_query_param("username", "alice")
        .add_query_param("tier", "gold")
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let resp = h
        .server
        .post("/admin/quota/reset")
        .add_query_param("admin_secret", ADMIN)
        .add_query_param("username", "alice")
        .await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["removed"], 1);
    let quota: Value = h.server.get("/quota/today").authorization_bearer(&token).await.json();
    assert_eq!(quota["data"]["used"], 0);

    h.server
        .post("/admin/quota/reset")
        .add_query_param("admin_secret", ADMIN)
        .add_query_param("username", "alice")
        .add_query_param("day", "yesterday")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn manual_gc_keeps_live_tickets() -> anyhow::Result<()> {
    let h = harness().await?;
    let token = login(&h, "alice").await?;
    issue_ticket(&h, &token).await?;

    let resp = h.server.post("/admin/tickets/gc").add_query_param("admin_secret", ADMIN).await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["removed"], 0);

    // An enormous retention saturates instead of overflowing.
    let resp = h
        .server
        .post("/admin/tickets/gc")
        .add_query_param("admin_secret", ADMIN)
        .add_query_param("keep_days", u64::MAX)
        .await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["removed"], 0);

    let listed: Value = h.server.get("/admin/tickets").add_query_param("admin_secret", ADMIN).await.json();
    assert_eq!(listed["total"], 1);
    Ok(())
}

// -- Upload, dedup and account linking ----------------------------------------

#[tokio::test]
async fn upload_indexes_then_deduplicates() -> anyhow::Result<()> {
    let h = harness().await?;
    let token = login(&h, "alice").await?;
    h.state.tokens.save(Scope::Service, "svc-token", None, None).await?;

    let form = || {
        MultipartForm::new()
            .add_text("dir", "/用户上传/notes")
            .add_part("file", Part::bytes(b"hello".to_vec()).file_name("hello.txt"))
    };

    let resp = h.server.post("/upload").authorization_bearer(&token).multipart(form()).await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["remote_path"], "/用户上传/notes/hello.txt");

    let md5 = "5d41402abc4b2a76b9719d911017c592";
    let dedup: Value = h
        .server
        .get("/files/dedup/md5")
        .authorization_bearer(&token)
        .add_query_param("md5", md5)
        .await
        .json();
    assert_eq!(dedup["exists"], true);
    assert_eq!(dedup["count"], 1);
    assert_eq!(dedup["samples"][0]["file_path"], "/用户上传/notes/hello.txt");
    assert_eq!(dedup["samples"][0]["fs_id"], 42);

    let hits = h.provider.hits();
    let again: Value = h.server.post("/upload").authorization_bearer(&token).multipart(form()).await.json();
    assert_eq!(again["status"], "duplicate");
    assert_eq!(again["md5"], md5);
    assert_eq!(h.provider.hits(), hits);
    Ok(())
}

#[tokio::test]
async fn upload_outside_root_is_refused() -> anyhow::Result<()> {
    let h = harness().await?;
    let token = login(&h, "alice").await?;
    let form = MultipartForm::new()
        .add_text("dir", "/用户上传/../secret")
        .add_part("file", Part::bytes(b"x".to_vec()).file_name("x.bin"));
    let resp = h.server.post("/upload").authorization_bearer(&token).multipart(form).await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "upload_dir_not_allowed");
    assert_eq!(h.provider.hits(), 0);
    Ok(())
}

#[tokio::test]
async fn upload_name_cannot_climb_out_of_dir() -> anyhow::Result<()> {
    let h = harness().await?;
    let token = login(&h, "alice").await?;
    h.state.tokens.save(Scope::Service, "svc-token", None, None).await?;

    for name in ["..", "../../etc/evil.txt", "a\\b"] {
        let form = MultipartForm::new()
            .add_text("dir", "/用户上传")
            .add_text("filename", name)
            .add_part("file", Part::bytes(b"x".to_vec()).file_name("x.bin"));
        let resp = h.server.post("/upload").authorization_bearer(&token).multipart(form).await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = resp.json();
        assert_eq!(body["error"]["code"], "upload_dir_not_allowed", "{name}");
    }
    assert_eq!(h.provider.hits(), 0);
    Ok(())
}

#[tokio::test]
async fn token_upsert_and_masked_view() -> anyhow::Result<()> {
    let h = harness().await?;
    let token = login(&h, "alice").await?;

    let before: Value = h.server.get("/oauth/token").authorization_bearer(&token).await.json();
    assert_eq!(before, json!({ "has_token": false }));

    h.server
        .post("/oauth/user/token/upsert")
        .authorization_bearer(&token)
        .json(&json!({ "access_token": "user-access-abcdefgh", "expires_in": 3600 }))
        .await
        .assert_status_ok();

    let after: Value = h.server.get("/oauth/token").authorization_bearer(&token).await.json();
    assert_eq!(after["has_token"], true);
    assert_eq!(after["access_token"], "user***efgh");
    assert!(after.get("refresh_token").is_none());
    assert!(after["expires_at"].is_string());
    Ok(())
}

#[tokio::test]
async fn device_flow_links_the_callers_account() -> anyhow::Result<()> {
    let h = harness().await?;
    let token = login(&h, "alice").await?;

    let start: Value = h.server.post("/oauth/device/start").authorization_bearer(&token).await.json();
    assert_eq!(start["user_code"], "ABCD-EFGH");

    let pending: Value = h
        .server
        .post("/oauth/device/poll")
        .authorization_bearer(&token)
        .add_query_param("device_code", "dev-wait")
        .await
        .json();
    assert_eq!(pending["status"], "pending");

    let done: Value = h
        .server
        .post("/oauth/device/poll")
        .authorization_bearer(&token)
        .add_query_param("device_code", "dev-ok")
        .await
        .json();
    assert_eq!(done["status"], "ok");
    assert_eq!(done["data"]["has_token"], true);

    let masked: Value = h.server.get("/oauth/token").authorization_bearer(&token).await.json();
    assert_eq!(masked["access_token"], "link***6789");
    let service: Value = h.server.get("/oauth/service/token").authorization_bearer(&token).await.json();
    assert_eq!(service["has_token"], false);
    Ok(())
}

#[tokio::test]
async fn service_device_flow_needs_admin_and_stores_service_scope() -> anyhow::Result<()> {
    let h = harness().await?;
    let token = login(&h, "alice").await?;

    h.server
        .post("/oauth/service/device/poll")
        .authorization_bearer(&token)
        .add_query_param("device_code", "dev-ok")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let done: Value = h
        .server
        .post("/oauth/service/device/poll")
        .authorization_bearer(&token)
        .add_query_param("device_code", "dev-ok")
        .add_query_param("admin_secret", ADMIN)
        .await
        .json();
    assert_eq!(done["status"], "ok");
    assert_eq!(h.state.tokens.ensure_fresh(Scope::Service).await?.as_deref(), Some("linked-access-0123456789"));
    Ok(())
}

#[tokio::test]
async fn code_callback_links_service_account() -> anyhow::Result<()> {
    let h = harness().await?;
    let resp = h.server.get("/oauth/service/callback").add_query_param("code", "abc").await;
    resp.assert_status_ok();
    assert!(resp.text().contains("linked"));
    assert!(h.state.tokens.get(Scope::Service).await?.is_some());

    let unbound = h.server.get("/oauth/callback").add_query_param("code", "abc").add_query_param("state", "junk").await;
    unbound.assert_status(StatusCode::BAD_REQUEST);
    Ok(())
}
