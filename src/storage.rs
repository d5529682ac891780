//! 存储目录访问：文件名清洗、冲突改名、枚举与写入。

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::ErrorKind;
use tracing::debug;

use crate::atomic::write_atomic;

#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
    /// 与用户文件同处一个目录、但不应出现在列表中的文件名。
    reserved: Vec<String>,
}

/// 存储目录中一个可见的用户文件。
#[derive(Clone, Debug)]
pub struct StoredFile {
    pub name: String,
    pub size: u64,
    pub modified: SystemTime,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            reserved: Vec::new(),
        }
    }

    pub fn with_reserved_name(mut self, name: impl Into<String>) -> Self {
        self.reserved.push(name.into());
        self
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// 只接受已清洗过的基础文件名。
    fn path_for(&self, name: &str) -> io::Result<PathBuf> {
        if sanitize_file_name(name).as_deref() != Some(name) {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("not a bare file name: {name:?}"),
            ));
        }
        Ok(self.root.join(name))
    }

    /// 判断目录项是否存在（包括悬空的符号链接）。
    pub async fn exists(&self, name: &str) -> io::Result<bool> {
        let path = self.path_for(name)?;
        match fs::symlink_metadata(&path).await {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// 为新上传选择一个当前不存在的文件名。
    ///
    /// 未冲突时原样返回；冲突时在主干与扩展名之间插入 `_<秒级时间戳>`，
    /// 同一秒内再次冲突则继续追加 `_<n>`。调用方需持有写锁。
    pub async fn resolve_available_name(&self, name: &str, epoch_secs: i64) -> io::Result<String> {
        if !self.exists(name).await? {
            return Ok(name.to_string());
        }
        let mut attempt = 0;
        loop {
            let candidate = timestamped_name(name, epoch_secs, attempt);
            if !self.exists(&candidate).await? {
                debug!(original = name, resolved = candidate, "file name collision resolved");
                return Ok(candidate);
            }
            attempt += 1;
        }
    }

    /// 以原子替换方式写入文件内容。
    pub async fn write(&self, name: &str, data: &[u8]) -> io::Result<()> {
        let target = self.path_for(name)?;
        write_atomic(&target, data).await
    }

    /// 枚举存储目录中的用户文件。
    ///
    /// 跳过隐藏项、脚本与日志、保留文件名以及非普通文件；
    /// 枚举与 stat 之间消失的文件被静默忽略。
    pub async fn list_entries(&self) -> io::Result<Vec<StoredFile>> {
        let mut dir = fs::read_dir(&self.root).await?;
        let mut entries = Vec::new();

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !self.is_listable(&name) {
                continue;
            }
            let metadata = match fs::metadata(entry.path()).await {
                Ok(metadata) => metadata,
                Err(err) => {
                    debug!(name, error = %err, "skipping entry that could not be stat'ed");
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }
            entries.push(StoredFile {
                name,
                size: metadata.len(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }

        Ok(entries)
    }

    fn is_listable(&self, name: &str) -> bool {
        !(name.starts_with('.')
            || name.ends_with(".py")
            || name.ends_with(".log")
            || self.reserved.iter().any(|reserved| reserved == name))
    }
}

/// 去掉目录部分，只保留基础文件名；不可用的名字返回 `None`。
pub fn sanitize_file_name(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or("");
    if base.is_empty() || base == "." || base == ".." || base.contains('\0') {
        return None;
    }
    Some(base.to_string())
}

fn timestamped_name(name: &str, epoch_secs: i64, attempt: u32) -> String {
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| name.to_string());
    let suffix = if attempt == 0 {
        format!("{epoch_secs}")
    } else {
        format!("{epoch_secs}_{attempt}")
    };
    match path.extension() {
        Some(ext) => format!("{stem}_{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{suffix}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_storage() -> (tempfile::TempDir, Storage) {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("uploads");
        std::fs::create_dir_all(&root).expect("create storage root");
        (temp, Storage::new(root).with_reserved_name("data.json"))
    }

    #[test]
    fn sanitize_strips_directories() {
        assert_eq!(sanitize_file_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_file_name(r"C:\Users\me\report.pdf").as_deref(), Some("report.pdf"));
        assert_eq!(sanitize_file_name("notes.txt").as_deref(), Some("notes.txt"));
    }

    #[test]
    fn sanitize_rejects_empty_and_dot_names() {
        assert_eq!(sanitize_file_name(""), None);
        assert_eq!(sanitize_file_name("dir/"), None);
        assert_eq!(sanitize_file_name("a/.."), None);
        assert_eq!(sanitize_file_name("."), None);
    }

    #[test]
    fn timestamped_name_keeps_extension() {
        assert_eq!(timestamped_name("report.pdf", 1733000000, 0), "report_1733000000.pdf");
        assert_eq!(timestamped_name("archive.tar.gz", 7, 0), "archive.tar_7.gz");
        assert_eq!(timestamped_name("README", 7, 0), "README_7");
        assert_eq!(timestamped_name("report.pdf", 7, 2), "report_7_2.pdf");
    }

    #[tokio::test]
    async fn resolve_available_name_avoids_existing_files() {
        let (_temp, storage) = make_storage();
        assert_eq!(
            storage.resolve_available_name("a.txt", 42).await.expect("resolve"),
            "a.txt"
        );

        storage.write("a.txt", b"1").await.expect("write");
        assert_eq!(
            storage.resolve_available_name("a.txt", 42).await.expect("resolve"),
            "a_42.txt"
        );

        storage.write("a_42.txt", b"2").await.expect("write");
        assert_eq!(
            storage.resolve_available_name("a.txt", 42).await.expect("resolve"),
            "a_42_1.txt"
        );
    }

    #[tokio::test]
    async fn write_rejects_path_components() {
        let (temp, storage) = make_storage();
        let result = storage.write("../escape.txt", b"x").await;
        assert!(result.is_err());
        assert!(!temp.path().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn list_entries_skips_hidden_and_reserved() {
        let (_temp, storage) = make_storage();
        let root = storage.root_path().to_path_buf();
        std::fs::write(root.join("visible.pdf"), b"pdf").expect("write");
        std::fs::write(root.join(".hidden"), b"x").expect("write");
        std::fs::write(root.join("server.py"), b"x").expect("write");
        std::fs::write(root.join("debug.log"), b"x").expect("write");
        std::fs::write(root.join("data.json"), b"{}").expect("write");
        std::fs::create_dir(root.join("folder")).expect("mkdir");

        let entries = storage.list_entries().await.expect("list");
        let names: Vec<_> = entries.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, vec!["visible.pdf"]);
        assert_eq!(entries[0].size, 3);
    }
}
