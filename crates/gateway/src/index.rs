// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local file index: MD5 lookup for upload dedup, upsert after upload.

use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db::{Db, DbError};
use crate::state::epoch_secs;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FileEntry {
    pub file_name: String,
    pub file_path: String,
    pub file_size: Option<i64>,
    pub fs_id: Option<i64>,
    pub file_md5: Option<String>,
    pub category: Option<i64>,
    pub create_time: Option<i64>,
    pub modify_time: Option<i64>,
}

impl FileEntry {
    /// Build an entry from the provider's `create` response. The provider
    /// md5 is not the content md5, so the locally computed one wins.
    pub fn from_created(created: &serde_json::Value, remote_path: &str, md5: &str) -> Self {
        let path = created.get("path").and_then(|v| v.as_str()).unwrap_or(remote_path);
        let name = created
            .get("server_filename")
            .or_else(|| created.get("name"))
            .and_then(|v| v.as_str())
            .map(|s| s.rsplit('/').next().unwrap_or(s).to_owned())
            .unwrap_or_else(|| path.rsplit('/').next().unwrap_or(path).to_owned());
        Self {
            file_name: name,
            file_path: path.to_owned(),
            file_size: created.get("size").and_then(|v| v.as_i64()),
            fs_id: created.get("fs_id").and_then(|v| v.as_i64()),
            file_md5: Some(md5.to_owned()),
            category: created.get("category").and_then(|v| v.as_i64()),
            create_time: created.get("ctime").and_then(|v| v.as_i64()),
            modify_time: created.get("mtime").and_then(|v| v.as_i64()),
        }
    }
}

#[derive(Clone)]
pub struct FileIndex {
    db: Db,
}

impl FileIndex {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn count_by_md5(&self, md5: &str) -> Result<i64, DbError> {
        let md5 = md5.to_ascii_lowercase();
        self.db
            .call(move |conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM file_index WHERE lower(file_md5) = ?1",
                    params![md5],
                    |row| row.get(0),
                )?)
            })
            .await
    }

    pub async fn find_by_md5(&self, md5: &str, limit: u32) -> Result<Vec<FileEntry>, DbError> {
        let md5 = md5.to_ascii_lowercase();
        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT file_name, file_path, file_size, fs_id, file_md5, category,
                            create_time, modify_time
                     FROM file_index WHERE lower(file_md5) = ?1
                     ORDER BY export_time DESC, id DESC LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![md5, limit], row_to_entry)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
    }

    pub async fn by_path(&self, path: &str) -> Result<Option<FileEntry>, DbError> {
        let path = path.to_owned();
        self.db
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT file_name, file_path, file_size, fs_id, file_md5, category,
                                create_time, modify_time
                         FROM file_index WHERE file_path = ?1",
                        params![path],
                        row_to_entry,
                    )
                    .optional()?)
            })
            .await
    }

    /// Insert or replace the entry keyed by its remote path.
    pub async fn upsert(&self, entry: FileEntry) -> Result<(), DbError> {
        let now = epoch_secs() as i64;
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO file_index
                        (file_name, file_path, file_size, fs_id, file_md5, category,
                         create_time, modify_time, export_time)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(file_path) DO UPDATE SET
                        file_name = excluded.file_name,
                        file_size = excluded.file_size,
                        fs_id = excluded.fs_id,
                        file_md5 = excluded.file_md5,
                        category = excluded.category,
                        create_time = excluded.create_time,
                        modify_time = excluded.modify_time,
                        export_time = excluded.export_time",
                    params![
                        entry.file_name,
                        entry.file_path,
                        entry.file_size,
                        entry.fs_id,
                        entry.file_md5,
                        entry.category,
                        entry.create_time,
                        entry.modify_time,
                        now,
                    ],
                )?;
                Ok(())
            })
            .await
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileEntry> {
    Ok(FileEntry {
        file_name: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
        file_path: row.get(1)?,
        file_size: row.get(2)?,
        fs_id: row.get(3)?,
        file_md5: row.get(4)?,
        category: row.get(5)?,
        create_time: row.get(6)?,
        modify_time: row.get(7)?,
    })
}

#[cfg(test)]
#[path = "index_tests.rs"]
mod tests;
