// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed argument structs for each operation.
//!
//! Clients send loosely typed JSON (`"page": "2"` and `"page": 2` both occur),
//! so numeric and string fields go through the lenient deserializers below.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Accept a JSON number or a numeric string.
fn int<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    match Value::deserialize(d)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| de::Error::custom("integer out of range")),
        Value::String(s) => s.trim().parse().map_err(|_| de::Error::custom(format!("not an integer: {s}"))),
        Value::Bool(b) => Ok(i64::from(b)),
        other => Err(de::Error::custom(format!("expected integer, got {other}"))),
    }
}

fn opt_int<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    match Value::deserialize(d)? {
        Value::Null => Ok(None),
        v => int(v).map(Some).map_err(de::Error::custom),
    }
}

/// Render any scalar as a string.
fn text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        v @ (Value::Number(_) | Value::Bool(_)) => Ok(v.to_string()),
        other => Err(de::Error::custom(format!("expected string, got {other}"))),
    }
}

fn opt_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    match Value::deserialize(d)? {
        Value::Null => Ok(None),
        v => text(v).map(Some).map_err(de::Error::custom),
    }
}

/// A JSON list passed either inline or as an encoded string; kept encoded.
fn json_list<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::String(s) => Ok(s),
        v @ Value::Array(_) => Ok(v.to_string()),
        Value::Null => Ok("[]".to_owned()),
        other => Err(de::Error::custom(format!("expected list, got {other}"))),
    }
}

/// File ids as an array of numbers/strings or an encoded JSON array.
fn fsid_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u64>, D::Error> {
    let items = match Value::deserialize(d)? {
        Value::Array(items) => items,
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(Value::Array(items)) => items,
            Ok(v @ Value::Number(_)) => vec![v],
            _ => return Err(de::Error::custom(format!("not a file id list: {s}"))),
        },
        Value::Number(n) => vec![Value::Number(n)],
        Value::Null => Vec::new(),
        other => return Err(de::Error::custom(format!("expected file id list, got {other}"))),
    };
    items
        .into_iter()
        .map(|v| match v {
            Value::Number(n) => n.as_u64().ok_or_else(|| de::Error::custom("bad file id")),
            Value::String(s) => s.trim().parse().map_err(|_| de::Error::custom(format!("bad file id: {s}"))),
            other => Err(de::Error::custom(format!("bad file id: {other}"))),
        })
        .collect()
}

fn root() -> String {
    "/".to_owned()
}
fn time() -> String {
    "time".to_owned()
}
fn one() -> i64 {
    1
}
fn one_str() -> String {
    "1".to_owned()
}
fn fifty() -> i64 {
    50
}
fn fifty_str() -> String {
    "50".to_owned()
}
fn hundred() -> i64 {
    100
}
fn empty_list() -> String {
    "[]".to_owned()
}
fn three() -> usize {
    3
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ListFilesArgs {
    #[serde(default = "root", deserialize_with = "text")]
    pub dir: String,
    #[serde(default = "hundred", deserialize_with = "int")]
    pub limit: i64,
    #[serde(default = "time", deserialize_with = "text")]
    pub order: String,
    #[serde(default = "one", deserialize_with = "int")]
    pub desc: i64,
}

/// `list_images` / `list_docs`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TypedListArgs {
    #[serde(default = "root", deserialize_with = "text")]
    pub dir: String,
    #[serde(default = "one", deserialize_with = "int")]
    pub page: i64,
    #[serde(default = "fifty", deserialize_with = "int")]
    pub num: i64,
    #[serde(default = "time", deserialize_with = "text")]
    pub order: String,
    #[serde(default = "one_str", deserialize_with = "text")]
    pub desc: String,
}

/// `search_filename` (`key`) and `search_semantic` (`query`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchArgs {
    #[serde(default, alias = "query", deserialize_with = "text")]
    pub key: String,
    #[serde(default = "root", deserialize_with = "text")]
    pub dir: String,
    #[serde(default = "one_str", deserialize_with = "text")]
    pub page: String,
    #[serde(default = "fifty_str", deserialize_with = "text")]
    pub num: String,
    #[serde(default = "one_str", deserialize_with = "text")]
    pub recursion: String,
}

/// `listall` family. `recursion` defaults per operation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ListAllArgs {
    #[serde(default = "root", deserialize_with = "text")]
    pub path: String,
    #[serde(default, deserialize_with = "opt_int")]
    pub recursion: Option<i64>,
    #[serde(default, deserialize_with = "int")]
    pub start: i64,
    #[serde(default = "hundred", deserialize_with = "int")]
    pub limit: i64,
    #[serde(default = "time", deserialize_with = "text")]
    pub order: String,
    #[serde(default = "one", deserialize_with = "int")]
    pub desc: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CategoryArgs {
    #[serde(default = "root", deserialize_with = "text")]
    pub path: String,
    #[serde(default = "one", deserialize_with = "int")]
    pub recursion: i64,
    #[serde(default = "thousand", deserialize_with = "int")]
    pub limit: i64,
}

fn thousand() -> i64 {
    1000
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecentArgs {
    #[serde(default = "root", deserialize_with = "text")]
    pub path: String,
    #[serde(default = "fifty", deserialize_with = "int")]
    pub limit: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MkdirArgs {
    #[serde(default = "new_folder", deserialize_with = "text")]
    pub path: String,
    #[serde(default, deserialize_with = "opt_int")]
    pub rtype: Option<i64>,
}

fn new_folder() -> String {
    "/新建文件夹".to_owned()
}

/// `delete` / `move` / `rename` / `copy`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FileManagerArgs {
    #[serde(default = "empty_list", deserialize_with = "json_list")]
    pub filelist: String,
    #[serde(rename = "async", default = "one", deserialize_with = "int")]
    pub async_mode: i64,
    #[serde(default, deserialize_with = "opt_text")]
    pub ondup: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadLocalArgs {
    #[serde(default, deserialize_with = "text")]
    pub local_file_path: String,
    #[serde(default = "default_remote", deserialize_with = "text")]
    pub remote_path: String,
}

fn default_remote() -> String {
    "/来自：mcp_server/upload.bin".to_owned()
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UploadUrlArgs {
    #[serde(default, deserialize_with = "text")]
    pub url: String,
    #[serde(default = "root", alias = "dir_path", deserialize_with = "text")]
    pub dir: String,
    #[serde(default, deserialize_with = "opt_text")]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UploadTextArgs {
    #[serde(default, deserialize_with = "text")]
    pub content: String,
    #[serde(default = "root", alias = "dir_path", deserialize_with = "text")]
    pub dir: String,
    #[serde(default, deserialize_with = "opt_text")]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BatchLocalItem {
    #[serde(default, deserialize_with = "text")]
    pub local_path: String,
    #[serde(default, deserialize_with = "text")]
    pub remote_path: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatchLocalArgs {
    #[serde(default)]
    pub file_list: Vec<BatchLocalItem>,
    #[serde(default = "three")]
    pub max_concurrent: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatchUrlArgs {
    #[serde(default)]
    pub url_list: Vec<UploadUrlArgs>,
    #[serde(default = "three")]
    pub max_concurrent: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatchTextArgs {
    #[serde(default)]
    pub text_list: Vec<UploadTextArgs>,
    #[serde(default = "three")]
    pub max_concurrent: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FileMetasArgs {
    #[serde(default = "empty_list", deserialize_with = "json_list")]
    pub fsids: String,
    #[serde(default, deserialize_with = "opt_text")]
    pub thumb: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub extra: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub dlink: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub path: Option<String>,
    #[serde(default, deserialize_with = "opt_int")]
    pub needmedia: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DownloadLinksArgs {
    #[serde(default, deserialize_with = "fsid_list")]
    pub fsids: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ShareArgs {
    #[serde(default, alias = "fsids", deserialize_with = "fsid_list")]
    pub fsid_list: Vec<u64>,
    #[serde(default = "seven", deserialize_with = "int")]
    pub period: i64,
    #[serde(default = "default_pwd", deserialize_with = "text")]
    pub pwd: String,
    #[serde(default, deserialize_with = "opt_text")]
    pub remark: Option<String>,
    #[serde(default)]
    pub ticket: Option<Value>,
}

fn seven() -> i64 {
    7
}
fn default_pwd() -> String {
    "1234".to_owned()
}

impl ShareArgs {
    /// Share periods the provider accepts, in days.
    pub const PERIODS: [i64; 3] = [1, 7, 30];

    pub fn validate(&self) -> Result<(), String> {
        if !Self::PERIODS.contains(&self.period) {
            return Err(format!("period must be one of 1, 7, 30 (got {})", self.period));
        }
        let pwd_ok = self.pwd.len() == 4
            && self.pwd.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit());
        if !pwd_ok {
            return Err("pwd must be 4 lowercase letters or digits".to_owned());
        }
        if self.fsid_list.is_empty() {
            return Err("fsid_list must not be empty".to_owned());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OfflineAddArgs {
    #[serde(default, deserialize_with = "text")]
    pub url: String,
    #[serde(default = "root", deserialize_with = "text")]
    pub save_path: String,
    #[serde(default, deserialize_with = "opt_text")]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OfflineTaskArgs {
    #[serde(default, deserialize_with = "opt_text")]
    pub task_id: Option<String>,
}
