//! 标签元数据文档：文件名到 [`FileMetadata`] 的 JSON 映射。
//!
//! 文档整体读写，没有增量更新；并发保护由 [`crate::library::Library`] 的写锁负责。

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::ErrorKind;
use tracing::warn;

use crate::atomic::write_atomic;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    #[serde(default)]
    pub tags: Vec<String>,
}

pub type MetadataMap = BTreeMap<String, FileMetadata>;

#[derive(Clone, Debug)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取元数据；文件缺失或损坏时返回空映射。
    pub async fn load(&self) -> MetadataMap {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return MetadataMap::new(),
            Err(err) => {
                warn!(path = ?self.path, error = %err, "metadata unreadable, starting empty");
                return MetadataMap::new();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(map) => map,
            Err(err) => {
                warn!(path = ?self.path, error = %err, "metadata corrupt, starting empty");
                MetadataMap::new()
            }
        }
    }

    /// 以整体替换的方式持久化映射。
    pub async fn save(&self, map: &MetadataMap) -> io::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_vec(map).map_err(io::Error::other)?;
        write_atomic(&self.path, &content).await
    }
}

/// 剔除磁盘上已不存在的文件对应的条目。
pub fn reconcile(mut map: MetadataMap, real_files: &HashSet<String>) -> MetadataMap {
    map.retain(|name, _| real_files.contains(name));
    map
}
