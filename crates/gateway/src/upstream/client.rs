// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the storage provider's REST API.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};

use crate::upstream::{http_client, UpstreamError};

/// Category codes the provider assigns to files.
pub const CATEGORY_VIDEO: i64 = 1;
pub const CATEGORY_BT: i64 = 7;

/// Endpoint configuration shared by every session.
#[derive(Clone)]
pub struct PanClient {
    api_base: String,
    pcs_base: String,
    app_id: Option<String>,
    http: Client,
}

impl PanClient {
    pub fn new(api_base: &str, pcs_base: &str, app_id: Option<String>) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_owned(),
            pcs_base: pcs_base.trim_end_matches('/').to_owned(),
            app_id,
            http: http_client(Duration::from_secs(30)),
        }
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Bind an access token for a sequence of calls.
    pub fn session(&self, access_token: impl Into<String>) -> PanSession<'_> {
        PanSession { client: self, token: access_token.into() }
    }
}

/// `listall` parameters.
#[derive(Debug, Clone)]
pub struct ListAllQuery {
    pub path: String,
    pub recursion: i64,
    pub start: i64,
    pub limit: i64,
    pub order: String,
    pub desc: i64,
}

/// `filemetas` parameters; `None` fields are omitted.
#[derive(Debug, Clone, Default)]
pub struct FileMetasQuery {
    pub fsids: String,
    pub thumb: Option<String>,
    pub extra: Option<String>,
    pub dlink: Option<String>,
    pub path: Option<String>,
    pub needmedia: Option<i64>,
}

/// File-manager operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOpera {
    Delete,
    Move,
    Rename,
    Copy,
}

impl FileOpera {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Move => "move",
            Self::Rename => "rename",
            Self::Copy => "copy",
        }
    }
}

/// Share-link request.
#[derive(Debug, Clone)]
pub struct ShareRequest {
    pub fsid_list: Vec<String>,
    pub period: u32,
    pub pwd: String,
    pub remark: Option<String>,
    pub ticket: Option<Value>,
}

/// A [`PanClient`] bound to one access token.
pub struct PanSession<'a> {
    client: &'a PanClient,
    token: String,
}

impl PanSession<'_> {
    pub fn client(&self) -> &PanClient {
        self.client
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub(crate) fn api(&self, path: &str) -> String {
        format!("{}{}", self.client.api_base, path)
    }

    pub(crate) fn pcs(&self, path: &str) -> String {
        format!("{}{}", self.client.pcs_base, path)
    }

    fn with_token<'q>(&'q self, query: &[(&'q str, String)]) -> Vec<(&'q str, String)> {
        let mut q = query.to_vec();
        q.push(("access_token", self.token.clone()));
        q
    }

    pub(crate) async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, UpstreamError> {
        let resp = self.client.http.get(self.api(path)).query(&self.with_token(query)).send().await?;
        read_json(resp).await
    }

    pub(crate) async fn post_form(
        &self,
        url: String,
        query: &[(&str, String)],
        form: &[(&str, String)],
    ) -> Result<Value, UpstreamError> {
        let resp =
            self.client.http.post(url).query(&self.with_token(query)).form(form).send().await?;
        read_json(resp).await
    }

    pub async fn quota(&self) -> Result<Value, UpstreamError> {
        self.get("/api/quota", &[("checkfree", "1".into()), ("checkexpire", "1".into())]).await
    }

    pub async fn list_files(&self, dir: &str, limit: i64, order: &str, desc: i64) -> Result<Value, UpstreamError> {
        self.get(
            "/rest/2.0/xpan/file",
            &[
                ("method", "list".into()),
                ("dir", dir.into()),
                ("order", order.into()),
                ("desc", desc.to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    /// `imagelist` or `doclist`.
    pub async fn list_typed(
        &self,
        method: &str,
        parent_path: &str,
        page: i64,
        num: i64,
        order: &str,
        desc: &str,
    ) -> Result<Value, UpstreamError> {
        self.get(
            "/rest/2.0/xpan/file",
            &[
                ("method", method.into()),
                ("parent_path", parent_path.into()),
                ("page", page.to_string()),
                ("num", num.to_string()),
                ("order", order.into()),
                ("desc", desc.into()),
            ],
        )
        .await
    }

    pub async fn search(
        &self,
        key: &str,
        dir: &str,
        page: &str,
        num: &str,
        recursion: &str,
    ) -> Result<Value, UpstreamError> {
        self.get(
            "/rest/2.0/xpan/file",
            &[
                ("method", "search".into()),
                ("key", key.into()),
                ("dir", dir.into()),
                ("page", page.into()),
                ("num", num.into()),
                ("recursion", recursion.into()),
            ],
        )
        .await
    }

    pub async fn list_all(&self, q: &ListAllQuery) -> Result<Value, UpstreamError> {
        self.get(
            "/rest/2.0/xpan/multimedia",
            &[
                ("method", "listall".into()),
                ("path", q.path.clone()),
                ("recursion", q.recursion.to_string()),
                ("start", q.start.to_string()),
                ("limit", q.limit.to_string()),
                ("order", q.order.clone()),
                ("desc", q.desc.to_string()),
            ],
        )
        .await
    }

    /// `listall` filtered locally to one category.
    pub async fn list_category_items(&self, q: &ListAllQuery, category: i64) -> Result<Value, UpstreamError> {
        let data = self.list_all(q).await?;
        let list: Vec<Value> = items(&data)
            .into_iter()
            .filter(|it| it.get("category").and_then(Value::as_i64) == Some(category))
            .collect();
        Ok(json!({ "errno": 0, "list": list }))
    }

    /// Item count per category under `path`.
    pub async fn category_counts(&self, path: &str, recursion: i64, limit: i64) -> Result<Value, UpstreamError> {
        let q = ListAllQuery {
            path: path.to_owned(),
            recursion,
            start: 0,
            limit,
            order: "time".to_owned(),
            desc: 1,
        };
        let data = self.list_all(&q).await?;
        let mut counts: BTreeMap<i64, u64> = BTreeMap::new();
        for it in items(&data) {
            let cat = it.get("category").and_then(Value::as_i64).unwrap_or(0);
            *counts.entry(cat).or_default() += 1;
        }
        Ok(json!({ "errno": 0, "counts": counts }))
    }

    pub async fn recent(&self, path: &str, limit: i64) -> Result<Value, UpstreamError> {
        let q = ListAllQuery {
            path: path.to_owned(),
            recursion: 1,
            start: 0,
            limit,
            order: "time".to_owned(),
            desc: 1,
        };
        self.list_all(&q).await
    }

    pub async fn file_metas(&self, q: &FileMetasQuery) -> Result<Value, UpstreamError> {
        let mut query = vec![("method", "filemetas".to_owned()), ("fsids", q.fsids.clone())];
        for (k, v) in [("thumb", &q.thumb), ("extra", &q.extra), ("dlink", &q.dlink), ("path", &q.path)] {
            if let Some(v) = v {
                query.push((k, v.clone()));
            }
        }
        if let Some(n) = q.needmedia {
            query.push(("needmedia", n.to_string()));
        }
        self.get("/rest/2.0/xpan/multimedia", &query).await
    }

    pub async fn download_links(&self, fsids: &[u64]) -> Result<Value, UpstreamError> {
        let q = FileMetasQuery {
            fsids: json!(fsids).to_string(),
            dlink: Some("1".to_owned()),
            ..FileMetasQuery::default()
        };
        self.file_metas(&q).await
    }

    /// Resolve one file id to its direct link.
    pub async fn resolve_dlink(&self, fsid: u64) -> Result<String, UpstreamError> {
        let data = self.download_links(&[fsid]).await?;
        items(&data)
            .into_iter()
            .find_map(|it| it.get("dlink").and_then(Value::as_str).map(str::to_owned))
            .filter(|d| !d.is_empty())
            .ok_or_else(|| UpstreamError::Local(format!("no direct link for fsid {fsid}")))
    }

    pub async fn mkdir(&self, path: &str, rtype: Option<i64>) -> Result<Value, UpstreamError> {
        let mut form = vec![
            ("path", path.to_owned()),
            ("isdir", "1".to_owned()),
            ("size", "0".to_owned()),
            ("uploadid", String::new()),
            ("block_list", "[]".to_owned()),
        ];
        if let Some(r) = rtype {
            form.push(("rtype", r.to_string()));
        }
        self.post_form(self.api("/rest/2.0/xpan/file"), &[("method", "create".into())], &form).await
    }

    pub async fn file_manager(
        &self,
        opera: FileOpera,
        filelist: &str,
        async_mode: i64,
        ondup: Option<&str>,
    ) -> Result<Value, UpstreamError> {
        let mut form = vec![("async", async_mode.to_string()), ("filelist", filelist.to_owned())];
        if let Some(o) = ondup {
            form.push(("ondup", o.to_owned()));
        }
        self.post_form(
            self.api("/rest/2.0/xpan/file"),
            &[("method", "filemanager".into()), ("opera", opera.as_str().into())],
            &form,
        )
        .await
    }

    pub async fn create_share(&self, req: &ShareRequest) -> Result<Value, UpstreamError> {
        let mut form = vec![
            ("fsid_list", json!(req.fsid_list).to_string()),
            ("period", req.period.to_string()),
            ("pwd", req.pwd.clone()),
        ];
        if let Some(r) = req.remark.as_deref().filter(|r| !r.is_empty()) {
            form.push(("remark", r.to_owned()));
        }
        if let Some(t) = &req.ticket {
            form.push(("ticket", t.to_string()));
        }
        let app_id = self.client.app_id.clone().unwrap_or_default();
        self.post_form(
            self.api("/apaas/1.0/share/set"),
            &[("product", "netdisk".into()), ("appid", app_id)],
            &form,
        )
        .await
    }

    pub async fn offline_add(&self, url: &str, save_path: &str, filename: Option<&str>) -> Result<Value, UpstreamError> {
        let mut query =
            vec![("method", "add_task".to_owned()), ("url", url.to_owned()), ("save_path", save_path.to_owned())];
        if let Some(f) = filename {
            query.push(("filename", f.to_owned()));
        }
        self.post_form(self.api("/rest/2.0/xpan/offline"), &query, &[]).await
    }

    pub async fn offline_query(&self, task_id: Option<&str>) -> Result<Value, UpstreamError> {
        let mut query = vec![("method", "query_task".to_owned())];
        if let Some(t) = task_id {
            query.push(("task_id", t.to_owned()));
        }
        self.post_form(self.api("/rest/2.0/xpan/offline"), &query, &[]).await
    }

    pub async fn offline_cancel(&self, task_id: &str) -> Result<Value, UpstreamError> {
        self.post_form(
            self.api("/rest/2.0/xpan/offline"),
            &[("method", "cancel_task".into()), ("task_id", task_id.into())],
            &[],
        )
        .await
    }
}

/// The `list` array of a listing response, wherever the provider put it.
pub fn items(data: &Value) -> Vec<Value> {
    data.get("list")
        .or_else(|| data.get("data").and_then(|d| d.get("list")))
        .or_else(|| data.get("info"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Decode a provider response, turning error payloads into [`UpstreamError`].
pub(crate) async fn read_json(resp: reqwest::Response) -> Result<Value, UpstreamError> {
    let status = resp.status();
    let text = resp.text().await?;
    let body: Value = serde_json::from_str(&text).unwrap_or_else(|_| json!({ "raw": text }));

    let code = body
        .get("errno")
        .or_else(|| body.get("error_code"))
        .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .unwrap_or(0);
    if code != 0 {
        let message = body
            .get("errmsg")
            .or_else(|| body.get("error_msg"))
            .or_else(|| body.get("show_msg"))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| format!("errno {code}"));
        return Err(UpstreamError::Rejected { code, message, body });
    }
    if !status.is_success() {
        return Err(UpstreamError::Rejected {
            code: i64::from(status.as_u16()),
            message: format!("http {status}"),
            body,
        });
    }
    Ok(body)
}
