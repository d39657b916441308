// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chunked upload: precreate with the block MD5 list, upload each block,
//! then create the file from the uploaded blocks.

use std::path::Path;

use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use md5::{Digest, Md5};
use serde_json::{json, Value};
use tracing::debug;

use crate::upstream::client::{read_json, PanSession};
use crate::upstream::{BatchItem, BatchReport, UpstreamError};

/// Provider block size.
pub const BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Lowercase hex MD5 of `data`.
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// MD5 of each `BLOCK_SIZE` block; a single empty-block hash for empty data.
pub fn block_md5s(data: &[u8]) -> Vec<String> {
    if data.is_empty() {
        return vec![md5_hex(&[])];
    }
    data.chunks(BLOCK_SIZE).map(md5_hex).collect()
}

/// Join a directory and a file name into a provider path.
pub fn join_remote(dir: &str, name: &str) -> String {
    let dir = if dir.is_empty() { "/" } else { dir };
    format!("{}/{}", dir.trim_end_matches('/'), name.trim_start_matches('/'))
}

impl PanSession<'_> {
    /// Upload `data` to `remote_path`.
    pub async fn upload_bytes(&self, remote_path: &str, data: Bytes) -> Result<Value, UpstreamError> {
        let blocks = block_md5s(&data);
        let block_list = json!(blocks).to_string();
        let size = data.len().to_string();

        let pre = self
            .post_form(
                self.api("/rest/2.0/xpan/file"),
                &[("method", "precreate".into())],
                &[
                    ("path", remote_path.to_owned()),
                    ("size", size.clone()),
                    ("isdir", "0".to_owned()),
                    ("autoinit", "1".to_owned()),
                    ("block_list", block_list.clone()),
                ],
            )
            .await?;
        let upload_id = pre
            .get("uploadid")
            .or_else(|| pre.get("upload_id"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| UpstreamError::Rejected {
                code: -1,
                message: "precreate_failed".to_owned(),
                body: pre.clone(),
            })?;

        // The provider lists the block indexes it still needs; empty means all.
        let wanted: Vec<usize> = pre
            .get("block_list")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_u64).map(|n| n as usize).collect())
            .filter(|v: &Vec<usize>| !v.is_empty())
            .unwrap_or_else(|| (0..blocks.len()).collect());

        for seq in wanted {
            let start = seq * BLOCK_SIZE;
            if start > data.len() || (start == data.len() && !data.is_empty()) {
                continue;
            }
            let end = (start + BLOCK_SIZE).min(data.len());
            self.upload_block(remote_path, &upload_id, seq, data.slice(start..end)).await?;
        }

        let created = self
            .post_form(
                self.api("/rest/2.0/xpan/file"),
                &[("method", "create".into())],
                &[
                    ("path", remote_path.to_owned()),
                    ("size", size),
                    ("isdir", "0".to_owned()),
                    ("uploadid", upload_id),
                    ("block_list", block_list),
                ],
            )
            .await?;
        debug!(path = remote_path, "upload created");
        Ok(created)
    }

    async fn upload_block(
        &self,
        remote_path: &str,
        upload_id: &str,
        seq: usize,
        block: Bytes,
    ) -> Result<Value, UpstreamError> {
        let part = reqwest::multipart::Part::bytes(block.to_vec()).file_name("blob");
        let form = reqwest::multipart::Form::new().part("file", part);
        let partseq = seq.to_string();
        let resp = self
            .client()
            .http()
            .post(self.pcs("/rest/2.0/pcs/superfile2"))
            .query(&[
                ("method", "upload"),
                ("type", "tmpfile"),
                ("path", remote_path),
                ("uploadid", upload_id),
                ("partseq", partseq.as_str()),
                ("access_token", self.token()),
            ])
            .multipart(form)
            .send()
            .await?;
        read_json(resp).await
    }

    /// Upload a file from the local filesystem.
    pub async fn upload_local(&self, local_path: &Path, remote_path: &str) -> Result<Value, UpstreamError> {
        let data = tokio::fs::read(local_path)
            .await
            .map_err(|_| UpstreamError::Local("local_file_not_found".to_owned()))?;
        self.upload_bytes(remote_path, Bytes::from(data)).await
    }

    /// Fetch `url` and upload its body into `dir`.
    pub async fn upload_url(&self, url: &str, dir: &str, filename: Option<&str>) -> Result<Value, UpstreamError> {
        let resp = self.client().http().get(url).send().await?.error_for_status()?;
        let data = resp.bytes().await?;
        let name = match filename.filter(|f| !f.is_empty()) {
            Some(f) => f.to_owned(),
            None => url
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .filter(|s| !s.is_empty() && !s.contains(':') && *s != "." && *s != "..")
                .unwrap_or("download.bin")
                .to_owned(),
        };
        self.upload_bytes(&join_remote(dir, &name), data).await
    }

    /// Upload UTF-8 text as a file in `dir`.
    pub async fn upload_text(&self, content: &str, dir: &str, filename: Option<&str>) -> Result<Value, UpstreamError> {
        let name = filename.filter(|f| !f.is_empty()).unwrap_or("note.txt");
        self.upload_bytes(&join_remote(dir, name), Bytes::copy_from_slice(content.as_bytes())).await
    }
}

/// Run `jobs` with at most `max_concurrent` in flight and tally the outcomes.
pub async fn run_batch<F>(jobs: Vec<(Value, F)>, max_concurrent: usize) -> BatchReport
where
    F: std::future::Future<Output = Result<Value, UpstreamError>>,
{
    let total = jobs.len();
    let outcomes: Vec<(Value, Result<Value, UpstreamError>)> = stream::iter(jobs)
        .map(|(item, fut)| async move { (item, fut.await) })
        .buffer_unordered(max_concurrent.max(1))
        .collect()
        .await;

    let mut report = BatchReport { status: "completed", total, ..BatchReport::default() };
    for (item, outcome) in outcomes {
        match outcome {
            Ok(result) => report.results.push(BatchItem { item, result }),
            Err(e) => report.errors.push(BatchItem {
                item,
                result: json!({ "status": "error", "error": e.to_string(), "data": e.data() }),
            }),
        }
    }
    report.success = report.results.len();
    report.failed = report.errors.len();
    report
}
