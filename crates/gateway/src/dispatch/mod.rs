// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Allowlisted operation dispatcher behind `/mcp/{user,public}/exec`.
//!
//! The request names an operation and carries loose JSON arguments. Names are
//! parsed into the closed [`OpName`] set at the boundary, then into an [`Op`]
//! with typed arguments. Upload-family destinations are confined to the
//! upload root, and charged operations consume one quota unit before any
//! provider call.

pub mod args;
pub mod confine;

use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;

use crate::credential::store::TokenStore;
use crate::credential::{CredentialError, Scope};
use crate::quota::{QuotaError, QuotaLedger};
use crate::session::users::User;
use crate::upstream::client::{
    FileMetasQuery, FileOpera, ListAllQuery, PanClient, PanSession, ShareRequest, CATEGORY_BT, CATEGORY_VIDEO,
};
use crate::upstream::upload::run_batch;
use crate::upstream::{BatchReport, UpstreamError};

use self::args::*;
use self::confine::{confine_file, confine_local, confine_upload};

/// Which upstream credential an exec call runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// The caller's own linked account.
    User,
    /// The shared service account.
    Public,
}

impl Surface {
    pub fn scope(self, user_id: i64) -> Scope {
        match self {
            Self::User => Scope::User(user_id),
            Self::Public => Scope::Service,
        }
    }
}

/// Body of an exec request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecRequest {
    #[serde(default)]
    pub op: String,
    #[serde(default)]
    pub args: Value,
}

macro_rules! op_names {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// The closed set of operations the exec surface accepts.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum OpName {
            $($variant),+
        }

        impl OpName {
            pub const ALL: &'static [OpName] = &[$(Self::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name),+
                }
            }

            /// Exact, trimmed match against the allowlist.
            pub fn parse(s: &str) -> Option<Self> {
                match s.trim() {
                    $($name => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

op_names! {
    Quota => "quota",
    ListFiles => "list_files",
    ListImages => "list_images",
    ListVideos => "list_videos",
    ListDocs => "list_docs",
    ListBt => "list_bt",
    ListCategory => "list_category",
    SearchFilename => "search_filename",
    SearchSemantic => "search_semantic",
    Mkdir => "mkdir",
    Delete => "delete",
    Move => "move",
    Rename => "rename",
    Copy => "copy",
    UploadLocal => "upload_local",
    UploadUrl => "upload_url",
    UploadText => "upload_text",
    UploadBatchLocal => "upload_batch_local",
    UploadBatchUrl => "upload_batch_url",
    UploadBatchText => "upload_batch_text",
    Playlist => "playlist",
    Recent => "recent",
    ListAll => "list_all",
    FileMetas => "file_metas",
    DownloadLinks => "download_links",
    ShareCreate => "share_create",
    OfflineAdd => "offline_add",
    OfflineStatus => "offline_status",
    OfflineCancel => "offline_cancel",
}

impl OpName {
    /// Operations that consume one daily quota unit.
    pub fn is_charged(&self) -> bool {
        matches!(self, Self::DownloadLinks | Self::ShareCreate | Self::FileMetas)
    }
}

impl fmt::Display for OpName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed operation with its typed arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Quota,
    ListFiles(ListFilesArgs),
    ListImages(TypedListArgs),
    ListVideos(ListAllArgs),
    ListDocs(TypedListArgs),
    ListBt(ListAllArgs),
    ListCategory(CategoryArgs),
    SearchFilename(SearchArgs),
    SearchSemantic(SearchArgs),
    Mkdir(MkdirArgs),
    FileManager(FileOpera, FileManagerArgs),
    UploadLocal(UploadLocalArgs),
    UploadUrl(UploadUrlArgs),
    UploadText(UploadTextArgs),
    UploadBatchLocal(BatchLocalArgs),
    UploadBatchUrl(BatchUrlArgs),
    UploadBatchText(BatchTextArgs),
    Recent(RecentArgs),
    ListAll(ListAllArgs),
    FileMetas(FileMetasArgs),
    DownloadLinks(DownloadLinksArgs),
    ShareCreate(ShareArgs),
    OfflineAdd(OfflineAddArgs),
    OfflineStatus(OfflineTaskArgs),
    OfflineCancel(OfflineTaskArgs),
}

fn decode<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, DispatchError> {
    let args = if args.is_null() { Value::Object(Default::default()) } else { args };
    serde_json::from_value(args).map_err(|e| DispatchError::BadArgs(e.to_string()))
}

impl Op {
    pub fn parse(name: OpName, args: Value) -> Result<Self, DispatchError> {
        Ok(match name {
            OpName::Quota => Self::Quota,
            OpName::ListFiles => Self::ListFiles(decode(args)?),
            OpName::ListImages => Self::ListImages(decode(args)?),
            OpName::ListVideos => Self::ListVideos(decode(args)?),
            OpName::ListDocs => Self::ListDocs(decode(args)?),
            OpName::ListBt => Self::ListBt(decode(args)?),
            OpName::ListCategory => Self::ListCategory(decode(args)?),
            OpName::SearchFilename => Self::SearchFilename(decode(args)?),
            OpName::SearchSemantic => Self::SearchSemantic(decode(args)?),
            OpName::Mkdir => Self::Mkdir(decode(args)?),
            OpName::Delete => Self::FileManager(FileOpera::Delete, decode(args)?),
            OpName::Move => Self::FileManager(FileOpera::Move, decode(args)?),
            OpName::Rename => Self::FileManager(FileOpera::Rename, decode(args)?),
            OpName::Copy => Self::FileManager(FileOpera::Copy, decode(args)?),
            OpName::UploadLocal => Self::UploadLocal(decode(args)?),
            OpName::UploadUrl => Self::UploadUrl(decode(args)?),
            OpName::UploadText => Self::UploadText(decode(args)?),
            OpName::UploadBatchLocal => Self::UploadBatchLocal(decode(args)?),
            OpName::UploadBatchUrl => Self::UploadBatchUrl(decode(args)?),
            OpName::UploadBatchText => Self::UploadBatchText(decode(args)?),
            OpName::Playlist => return Err(DispatchError::NotImplemented(name)),
            OpName::Recent => Self::Recent(decode(args)?),
            OpName::ListAll => Self::ListAll(decode(args)?),
            OpName::FileMetas => Self::FileMetas(decode(args)?),
            OpName::DownloadLinks => Self::DownloadLinks(decode(args)?),
            OpName::ShareCreate => {
                let share: ShareArgs = decode(args)?;
                share.validate().map_err(DispatchError::BadArgs)?;
                Self::ShareCreate(share)
            }
            OpName::OfflineAdd => Self::OfflineAdd(decode(args)?),
            OpName::OfflineStatus => Self::OfflineStatus(decode(args)?),
            OpName::OfflineCancel => Self::OfflineCancel(decode(args)?),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("operation not allowed: {0}")]
    NotAllowed(String),
    #[error("operation not implemented: {0}")]
    NotImplemented(OpName),
    #[error("upload destination not allowed: {0}")]
    DirNotAllowed(String),
    #[error("invalid arguments: {0}")]
    BadArgs(String),
    #[error("no upstream token linked for {0}")]
    TokenMissing(Scope),
    #[error(transparent)]
    Quota(#[from] QuotaError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl DispatchError {
    /// Soft-fail code for the exec envelope.
    pub fn code(&self) -> String {
        match self {
            Self::NotAllowed(_) => "op_not_allowed".to_owned(),
            Self::NotImplemented(_) => "op_not_implemented".to_owned(),
            Self::DirNotAllowed(_) => "upload_dir_not_allowed".to_owned(),
            Self::BadArgs(_) => "bad_request".to_owned(),
            Self::TokenMissing(Scope::Service) => "service_token_missing".to_owned(),
            Self::TokenMissing(Scope::User(_)) => "user_token_missing".to_owned(),
            Self::Quota(_) => "quota_exceeded".to_owned(),
            Self::Credential(_) => "credential_unavailable".to_owned(),
            Self::Upstream(e) => e.code(),
        }
    }
}

/// Runs exec requests against the provider.
#[derive(Clone)]
pub struct Dispatcher {
    pan: PanClient,
    tokens: TokenStore,
    quota: QuotaLedger,
    upload_root: String,
    data_dir: PathBuf,
}

impl Dispatcher {
    pub fn new(pan: PanClient, tokens: TokenStore, quota: QuotaLedger, upload_root: &str, data_dir: PathBuf) -> Self {
        Self { pan, tokens, quota, upload_root: upload_root.trim_end_matches('/').to_owned(), data_dir }
    }

    pub fn upload_root(&self) -> &str {
        &self.upload_root
    }

    /// Parse, confine, charge, then run one request.
    pub async fn exec(&self, surface: Surface, caller: &User, req: ExecRequest) -> Result<Value, DispatchError> {
        let name = OpName::parse(&req.op).ok_or_else(|| DispatchError::NotAllowed(req.op.trim().to_owned()))?;
        let op = Op::parse(name, req.args)?;
        let local = self.confine(&op)?;

        let scope = surface.scope(caller.id);
        let token = self.tokens.ensure_fresh(scope).await?.ok_or(DispatchError::TokenMissing(scope))?;

        if name.is_charged() {
            self.quota.consume(caller.id, caller.tier).await?;
        }

        tracing::debug!(op = %name, user_id = caller.id, scope = %scope, "exec");
        let session = self.pan.session(token);
        self.run(&session, op, local).await
    }

    /// Check upload destinations. Returns the resolved local source path for
    /// `upload_local`, and one per item for `upload_batch_local`.
    fn confine(&self, op: &Op) -> Result<Vec<Option<PathBuf>>, DispatchError> {
        let root = self.upload_root.as_str();
        match op {
            Op::UploadLocal(a) => {
                confine_file(root, &a.remote_path)?;
                Ok(vec![Some(confine_local(&self.data_dir, &a.local_file_path)?)])
            }
            Op::UploadUrl(a) => confine_upload(root, &a.dir, a.filename.as_deref()).map(|_| Vec::new()),
            Op::UploadText(a) => confine_upload(root, &a.dir, a.filename.as_deref()).map(|_| Vec::new()),
            Op::UploadBatchLocal(a) => a
                .file_list
                .iter()
                .map(|it| {
                    if it.local_path.is_empty() || it.remote_path.is_empty() {
                        return Ok(None);
                    }
                    confine_file(root, &it.remote_path)?;
                    Ok(Some(confine_local(&self.data_dir, &it.local_path)?))
                })
                .collect(),
            Op::UploadBatchUrl(a) => {
                for it in &a.url_list {
                    confine_upload(root, &it.dir, it.filename.as_deref())?;
                }
                Ok(Vec::new())
            }
            Op::UploadBatchText(a) => {
                for it in &a.text_list {
                    confine_upload(root, &it.dir, it.filename.as_deref())?;
                }
                Ok(Vec::new())
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn run(&self, s: &PanSession<'_>, op: Op, local: Vec<Option<PathBuf>>) -> Result<Value, DispatchError> {
        let data = match op {
            Op::Quota => s.quota().await?,
            Op::ListFiles(a) => s.list_files(&a.dir, a.limit, &a.order, a.desc).await?,
            Op::ListImages(a) => s.list_typed("imagelist", &a.dir, a.page, a.num, &a.order, &a.desc).await?,
            Op::ListDocs(a) => s.list_typed("doclist", &a.dir, a.page, a.num, &a.order, &a.desc).await?,
            Op::ListVideos(a) => s.list_category_items(&list_all_query(a, 0), CATEGORY_VIDEO).await?,
            Op::ListBt(a) => s.list_category_items(&list_all_query(a, 0), CATEGORY_BT).await?,
            Op::ListAll(a) => s.list_all(&list_all_query(a, 1)).await?,
            Op::ListCategory(a) => s.category_counts(&a.path, a.recursion, a.limit).await?,
            Op::SearchFilename(a) | Op::SearchSemantic(a) => {
                s.search(&a.key, &a.dir, &a.page, &a.num, &a.recursion).await?
            }
            Op::Recent(a) => s.recent(&a.path, a.limit).await?,
            Op::Mkdir(a) => s.mkdir(&a.path, a.rtype).await?,
            Op::FileManager(opera, a) => {
                s.file_manager(opera, &a.filelist, a.async_mode, a.ondup.as_deref()).await?
            }
            Op::UploadLocal(a) => {
                let path = local.into_iter().flatten().next().ok_or_else(|| {
                    DispatchError::DirNotAllowed(a.local_file_path.clone())
                })?;
                s.upload_local(&path, &a.remote_path).await?
            }
            Op::UploadUrl(a) => s.upload_url(&a.url, &a.dir, a.filename.as_deref()).await?,
            Op::UploadText(a) => s.upload_text(&a.content, &a.dir, a.filename.as_deref()).await?,
            Op::UploadBatchLocal(a) => {
                let jobs = a
                    .file_list
                    .into_iter()
                    .zip(local)
                    .map(|(it, path)| {
                        let item = serde_json::to_value(&it).unwrap_or(Value::Null);
                        (item, async move {
                            match path {
                                Some(p) => s.upload_local(&p, &it.remote_path).await,
                                None => Err(UpstreamError::Local("missing_paths".to_owned())),
                            }
                        })
                    })
                    .collect();
                to_value(run_batch(jobs, a.max_concurrent).await)
            }
            Op::UploadBatchUrl(a) => {
                let jobs = a
                    .url_list
                    .into_iter()
                    .map(|it| {
                        let item = serde_json::to_value(&it).unwrap_or(Value::Null);
                        (item, async move {
                            if it.url.is_empty() {
                                return Err(UpstreamError::Local("missing_url".to_owned()));
                            }
                            s.upload_url(&it.url, &it.dir, it.filename.as_deref()).await
                        })
                    })
                    .collect();
                to_value(run_batch(jobs, a.max_concurrent).await)
            }
            Op::UploadBatchText(a) => {
                let jobs = a
                    .text_list
                    .into_iter()
                    .map(|it| {
                        let item = serde_json::to_value(&it).unwrap_or(Value::Null);
                        (item, async move {
                            if it.content.is_empty() {
                                return Err(UpstreamError::Local("missing_content".to_owned()));
                            }
                            s.upload_text(&it.content, &it.dir, it.filename.as_deref()).await
                        })
                    })
                    .collect();
                to_value(run_batch(jobs, a.max_concurrent).await)
            }
            Op::FileMetas(a) => {
                let q = FileMetasQuery {
                    fsids: a.fsids,
                    thumb: a.thumb,
                    extra: a.extra,
                    dlink: a.dlink,
                    path: a.path,
                    needmedia: a.needmedia,
                };
                s.file_metas(&q).await?
            }
            Op::DownloadLinks(a) => s.download_links(&a.fsids).await?,
            Op::ShareCreate(a) => {
                let req = ShareRequest {
                    fsid_list: a.fsid_list.iter().map(u64::to_string).collect(),
                    period: a.period as u32,
                    pwd: a.pwd,
                    remark: a.remark,
                    ticket: a.ticket,
                };
                s.create_share(&req).await?
            }
            Op::OfflineAdd(a) => s.offline_add(&a.url, &a.save_path, a.filename.as_deref()).await?,
            Op::OfflineStatus(a) => s.offline_query(a.task_id.as_deref()).await?,
            Op::OfflineCancel(a) => s.offline_cancel(a.task_id.as_deref().unwrap_or_default()).await?,
        };
        Ok(data)
    }
}

fn list_all_query(a: ListAllArgs, default_recursion: i64) -> ListAllQuery {
    ListAllQuery {
        path: a.path,
        recursion: a.recursion.unwrap_or(default_recursion),
        start: a.start,
        limit: a.limit,
        order: a.order,
        desc: a.desc,
    }
}

fn to_value(report: BatchReport) -> Value {
    serde_json::to_value(report).unwrap_or(Value::Null)
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
