//! 文件列表：以磁盘实际内容为准校正元数据，并按修改时间倒序输出。

use axum::extract::Extension;
use axum::response::Json as JsonResponse;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{error, info, warn};

use crate::error::ApiError;
use crate::library::Library;
use crate::metadata::reconcile;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub name: String,
    pub size: u64,
    pub date: String,
    pub tags: Vec<String>,
}

/// 列出存储的文件。
pub async fn list_files(
    Extension(library): Extension<Arc<Library>>,
) -> Result<JsonResponse<Vec<FileRecord>>, ApiError> {
    let records = build_listing(&library).await.map_err(|err| {
        error!(error = %err, "list files failed");
        ApiError::Internal("Failed to list files")
    })?;
    info!(count = records.len(), "list files");
    Ok(JsonResponse(records))
}

/// 读取元数据与目录内容，清除已消失文件的条目并写回，再合并生成列表。
///
/// 写回失败只记录日志，列表照常返回。
pub async fn build_listing(library: &Library) -> io::Result<Vec<FileRecord>> {
    let _guard = library.write_lock().await;
    let entries = library.storage().list_entries().await?;
    let real_files: HashSet<String> = entries.iter().map(|entry| entry.name.clone()).collect();

    let loaded = library.metadata().load().await;
    let loaded_len = loaded.len();
    let mut map = reconcile(loaded, &real_files);
    if map.len() != loaded_len {
        info!(removed = loaded_len - map.len(), "pruned metadata of missing files");
    }
    if let Err(err) = library.metadata().save(&map).await {
        warn!(error = %err, "failed to persist reconciled metadata");
    }

    let mut records: Vec<FileRecord> = entries
        .into_iter()
        .map(|entry| FileRecord {
            tags: map
                .remove(&entry.name)
                .map(|metadata| metadata.tags)
                .unwrap_or_default(),
            date: format_date(entry.modified),
            size: entry.size,
            name: entry.name,
        })
        .collect();

    records.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.name.cmp(&b.name)));
    Ok(records)
}

fn format_date(modified: SystemTime) -> String {
    let datetime: DateTime<Local> = modified.into();
    datetime.format("%Y-%m-%d %H:%M").to_string()
}
