// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{DefaultBodyLimit, Query, State};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use bytes::Bytes;
use serde_json::{json, Value};

use super::client::{items, FileOpera, ListAllQuery, PanClient, ShareRequest, CATEGORY_VIDEO};
use super::upload::{block_md5s, join_remote, md5_hex, run_batch, BLOCK_SIZE};
use super::UpstreamError;

type Seen = Arc<Mutex<Vec<(String, HashMap<String, String>)>>>;

async fn file_endpoint(
    State(seen): State<Seen>,
    Query(q): Query<HashMap<String, String>>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    let method = q.get("method").cloned().unwrap_or_default();
    let mut all = q.clone();
    all.extend(form);
    if let Ok(mut s) = seen.lock() {
        s.push((method.clone(), all));
    }
    Json(match method.as_str() {
        "list" => json!({"errno": 0, "list": [{"server_filename": "a.txt"}]}),
        "search" => json!({"errno": -7, "errmsg": "access denied"}),
        "precreate" => json!({"errno": 0, "uploadid": "up-1", "block_list": []}),
        "create" => json!({"errno": 0, "fs_id": 42, "path": "/x"}),
        "filemanager" => json!({"errno": 0, "info": []}),
        _ => json!({"errno": 0}),
    })
}

async fn multimedia_endpoint(Query(q): Query<HashMap<String, String>>) -> Json<Value> {
    match q.get("method").map(String::as_str) {
        Some("listall") => Json(json!({"errno": 0, "list": [
            {"fs_id": 1, "category": 1},
            {"fs_id": 2, "category": 7},
            {"fs_id": 3, "category": 1},
            {"fs_id": 4}
        ]})),
        Some("filemetas") => Json(json!({"errno": 0, "list": [
            {"fs_id": 9, "dlink": "https://d.example/file?sign=abc"}
        ]})),
        _ => Json(json!({"errno": 2})),
    }
}

async fn superfile(
    State(seen): State<Seen>,
    Query(mut q): Query<HashMap<String, String>>,
    body: Bytes,
) -> Json<Value> {
    q.insert("body_len".to_owned(), body.len().to_string());
    if let Ok(mut s) = seen.lock() {
        s.push(("superfile2".to_owned(), q));
    }
    Json(json!({"md5": "x"}))
}

async fn share(
    State(seen): State<Seen>,
    Query(q): Query<HashMap<String, String>>,
    Form(f): Form<HashMap<String, String>>,
) -> Json<Value> {
    let mut all = q;
    all.extend(f);
    if let Ok(mut s) = seen.lock() {
        s.push(("share".to_owned(), all));
    }
    Json(json!({"errno": 0, "data": {"link": "https://pan.example/s/1"}}))
}

async fn spawn_fake() -> anyhow::Result<(PanClient, Seen)> {
    let seen: Seen = Arc::default();
    let app = Router::new()
        .route("/rest/2.0/xpan/file", get(file_endpoint).post(file_endpoint))
        .route("/rest/2.0/xpan/multimedia", get(multimedia_endpoint))
        .route("/rest/2.0/pcs/superfile2", post(superfile))
        .route("/apaas/1.0/share/set", post(share))
        .route("/api/quota", get(|| async { Json(json!({"errno": 0, "total": 100, "used": 1})) }))
        .layer(DefaultBodyLimit::disable())
        .with_state(Arc::clone(&seen));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let base = format!("http://{}", listener.local_addr()?);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((PanClient::new(&base, &base, Some("app-7".to_owned())), seen))
}

fn calls(seen: &Seen, method: &str) -> Vec<HashMap<String, String>> {
    seen.lock()
        .map(|s| s.iter().filter(|(m, _)| m == method).map(|(_, q)| q.clone()).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn quota_and_list_pass_token() -> anyhow::Result<()> {
    let (client, seen) = spawn_fake().await?;
    let pan = client.session("tok-1");
    assert_eq!(pan.quota().await?["total"], 100);

    let listed = pan.list_files("/docs", 10, "name", 0).await?;
    assert_eq!(items(&listed).len(), 1);
    let q = &calls(&seen, "list")[0];
    assert_eq!(q.get("access_token").map(String::as_str), Some("tok-1"));
    assert_eq!(q.get("dir").map(String::as_str), Some("/docs"));
    Ok(())
}

#[tokio::test]
async fn nonzero_errno_is_rejected_with_message() -> anyhow::Result<()> {
    let (client, _) = spawn_fake().await?;
    let err = client.session("t").search("k", "/", "1", "50", "1").await;
    match err {
        Err(UpstreamError::Rejected { code, message, .. }) => {
            assert_eq!(code, -7);
            assert_eq!(message, "access denied");
        }
        other => anyhow::bail!("unexpected {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn category_filter_and_counts() -> anyhow::Result<()> {
    let (client, _) = spawn_fake().await?;
    let pan = client.session("t");
    let q = ListAllQuery {
        path: "/".into(),
        recursion: 0,
        start: 0,
        limit: 100,
        order: "time".into(),
        desc: 1,
    };
    let videos = pan.list_category_items(&q, CATEGORY_VIDEO).await?;
    assert_eq!(items(&videos).len(), 2);

    let counts = pan.category_counts("/", 1, 1000).await?;
    assert_eq!(counts["counts"]["1"], 2);
    assert_eq!(counts["counts"]["7"], 1);
    assert_eq!(counts["counts"]["0"], 1);
    Ok(())
}

#[tokio::test]
async fn resolve_dlink_reads_first_link() -> anyhow::Result<()> {
    let (client, _) = spawn_fake().await?;
    let link = client.session("t").resolve_dlink(9).await?;
    assert_eq!(link, "https://d.example/file?sign=abc");
    Ok(())
}

#[tokio::test]
async fn upload_runs_precreate_blocks_create() -> anyhow::Result<()> {
    let (client, seen) = spawn_fake().await?;
    let pan = client.session("t");
    let data = Bytes::from(vec![7u8; BLOCK_SIZE + 10]);
    let created = pan.upload_bytes("/用户上传/big.bin", data.clone()).await?;
    assert_eq!(created["fs_id"], 42);

    let pre = &calls(&seen, "precreate")[0];
    let expected: Vec<String> = block_md5s(&data);
    assert_eq!(expected.len(), 2);
    assert_eq!(pre.get("block_list").cloned(), Some(json!(expected).to_string()));

    let parts: Vec<String> = calls(&seen, "superfile2")
        .iter()
        .filter_map(|q| q.get("partseq").cloned())
        .collect();
    assert_eq!(parts.len(), 2);
    assert!(parts.contains(&"0".to_owned()) && parts.contains(&"1".to_owned()));

    let create = &calls(&seen, "create")[0];
    assert_eq!(create.get("uploadid").map(String::as_str), Some("up-1"));
    assert_eq!(create.get("size").cloned(), Some((BLOCK_SIZE + 10).to_string()));
    Ok(())
}

#[tokio::test]
async fn share_and_file_manager_forms() -> anyhow::Result<()> {
    let (client, seen) = spawn_fake().await?;
    let pan = client.session("t");
    pan.create_share(&ShareRequest {
        fsid_list: vec!["11".into(), "12".into()],
        period: 7,
        pwd: "ab12".into(),
        remark: None,
        ticket: None,
    })
    .await?;
    let s = &calls(&seen, "share")[0];
    assert_eq!(s.get("appid").map(String::as_str), Some("app-7"));
    assert_eq!(s.get("fsid_list").map(String::as_str), Some(r#"["11","12"]"#));
    assert!(!s.contains_key("remark"));

    pan.file_manager(FileOpera::Rename, r#"[{"path":"/a","newname":"b"}]"#, 0, Some("fail")).await?;
    let fm = &calls(&seen, "filemanager")[0];
    assert_eq!(fm.get("opera").map(String::as_str), Some("rename"));
    assert_eq!(fm.get("async").map(String::as_str), Some("0"));
    assert_eq!(fm.get("ondup").map(String::as_str), Some("fail"));
    Ok(())
}

#[tokio::test]
async fn batch_tallies_success_and_failure() {
    let jobs: Vec<(Value, _)> = (0..5)
        .map(|i| {
            (json!({ "n": i }), async move {
                if i % 2 == 0 {
                    Ok(json!({ "ok": i }))
                } else {
                    Err(UpstreamError::Local("odd".into()))
                }
            })
        })
        .collect();
    let report = run_batch(jobs, 2).await;
    assert_eq!((report.total, report.success, report.failed), (5, 3, 2));
    assert_eq!(report.status, "completed");
}

#[test]
fn md5_helpers() {
    assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
    assert_eq!(block_md5s(b"").len(), 1);
    assert_eq!(join_remote("/用户上传/", "a.txt"), "/用户上传/a.txt");
    assert_eq!(join_remote("", "a.txt"), "/a.txt");
}
