//! 上传处理：解码表单、解决文件名冲突、写入存储并更新标签元数据。

use axum::body::Body as AxumBody;
use axum::extract::Extension;
use axum::http::{HeaderMap, header};
use axum::response::Json as JsonResponse;
use chrono::Utc;
use serde::Serialize;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::error::ApiError;
use crate::library::Library;
use crate::metadata::FileMetadata;
use crate::multipart::{DecodeError, Submission, decode};
use crate::storage::sanitize_file_name;

#[derive(Debug)]
pub struct UploadConfig {
    /// 请求体上限（字节），0 表示不限制。
    pub max_size: u64,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to read request body")]
    Body(#[source] axum::Error),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("submission has no usable file part")]
    MissingFile,
    #[error("storage i/o failure: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
}

impl UploadResponse {
    pub fn stored(file: String) -> Self {
        Self {
            success: true,
            file: Some(file),
            message: None,
        }
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            file: None,
            message: Some("Upload failed"),
        }
    }
}

/// 上传接口：任何失败都只向客户端返回通用的 400。
pub async fn upload_file(
    Extension(library): Extension<Arc<Library>>,
    Extension(upload): Extension<Arc<UploadConfig>>,
    headers: HeaderMap,
    body: AxumBody,
) -> Result<JsonResponse<UploadResponse>, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    match receive(&library, &upload, content_type, body).await {
        Ok(file) => Ok(JsonResponse(UploadResponse::stored(file))),
        Err(err) => {
            match &err {
                UploadError::Io(io_err) => error!(error = %io_err, "upload failed"),
                other => warn!(error = %other, "upload rejected"),
            }
            Err(ApiError::UploadFailed)
        }
    }
}

async fn receive(
    library: &Library,
    upload: &UploadConfig,
    content_type: Option<&str>,
    body: AxumBody,
) -> Result<String, UploadError> {
    let limit = match usize::try_from(upload.max_size) {
        Ok(0) | Err(_) => usize::MAX,
        Ok(limit) => limit,
    };
    let body = axum::body::to_bytes(body, limit)
        .await
        .map_err(UploadError::Body)?;
    let submission = decode(content_type, body).await?;
    ingest(library, submission).await
}

/// 将一次表单提交落盘，返回最终使用的文件名。
///
/// 冲突改名、写文件与更新元数据在同一把写锁内完成。文件写入失败时不会登记元数据；
/// 元数据保存失败时文件保留在磁盘上，列表中表现为无标签。
pub async fn ingest(library: &Library, submission: Submission) -> Result<String, UploadError> {
    let Submission { file, tags } = submission;
    let file = file
        .filter(|file| !file.data.is_empty())
        .ok_or(UploadError::MissingFile)?;
    let name = sanitize_file_name(&file.file_name).ok_or(UploadError::MissingFile)?;

    let _guard = library.write_lock().await;
    let storage = library.storage();
    let resolved = storage
        .resolve_available_name(&name, Utc::now().timestamp())
        .await?;
    storage.write(&resolved, &file.data).await?;
    info!(
        original = file.file_name,
        file = resolved,
        size = file.data.len(),
        "file stored"
    );

    let mut map = library.metadata().load().await;
    map.insert(resolved.clone(), FileMetadata { tags });
    if let Err(err) = library.metadata().save(&map).await {
        warn!(file = resolved, "stored file left without metadata entry");
        return Err(UploadError::Io(err));
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use axum::response::IntoResponse;
    use bytes::Bytes;
    use std::collections::HashSet;
    use tempfile::tempdir;

    use crate::library::test_support::make_library;
    use crate::multipart::UploadedFile;
    use crate::multipart::test_support::FormBuilder;

    fn submission(file_name: &str, data: &[u8], tags: &[&str]) -> Submission {
        Submission {
            file: Some(UploadedFile {
                file_name: file_name.to_string(),
                data: Bytes::copy_from_slice(data),
            }),
            tags: tags.iter().map(|tag| tag.to_string()).collect(),
        }
    }

    fn make_upload_config() -> Arc<UploadConfig> {
        Arc::new(UploadConfig { max_size: 0 })
    }

    #[tokio::test]
    async fn ingest_stores_file_and_tags() {
        let temp = tempdir().expect("tempdir");
        let library = make_library(&temp);

        let stored = ingest(&library, submission("notes.txt", b"hello", &["a", "b"]))
            .await
            .expect("ingest");

        assert_eq!(stored, "notes.txt");
        let contents = std::fs::read(library.storage().root_path().join("notes.txt"))
            .expect("read stored file");
        assert_eq!(contents, b"hello");
        let map = library.metadata().load().await;
        assert_eq!(map["notes.txt"].tags, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn colliding_upload_is_renamed_and_original_kept() {
        let temp = tempdir().expect("tempdir");
        let library = make_library(&temp);

        ingest(&library, submission("report.pdf", b"first", &["v1"]))
            .await
            .expect("first ingest");
        let second = ingest(&library, submission("report.pdf", b"second", &["v2"]))
            .await
            .expect("second ingest");

        assert_ne!(second, "report.pdf");
        assert!(second.starts_with("report_") && second.ends_with(".pdf"));
        let root = library.storage().root_path();
        assert_eq!(std::fs::read(root.join("report.pdf")).expect("read"), b"first");
        assert_eq!(std::fs::read(root.join(&second)).expect("read"), b"second");

        let map = library.metadata().load().await;
        assert_eq!(map["report.pdf"].tags, vec!["v1"]);
        assert_eq!(map[&second].tags, vec!["v2"]);
    }

    #[tokio::test]
    async fn ingest_strips_path_traversal() {
        let temp = tempdir().expect("tempdir");
        let library = make_library(&temp);

        let stored = ingest(&library, submission("../../etc/passwd", b"root:x", &[]))
            .await
            .expect("ingest");

        assert_eq!(stored, "passwd");
        assert!(library.storage().root_path().join("passwd").is_file());
        assert!(!temp.path().join("etc").exists());
    }

    #[tokio::test]
    async fn ingest_requires_file_and_payload() {
        let temp = tempdir().expect("tempdir");
        let library = make_library(&temp);

        let result = ingest(&library, Submission::default()).await;
        assert!(matches!(result, Err(UploadError::MissingFile)));

        let result = ingest(&library, submission("empty.txt", b"", &[])).await;
        assert!(matches!(result, Err(UploadError::MissingFile)));

        let result = ingest(&library, submission("dir/", b"data", &[])).await;
        assert!(matches!(result, Err(UploadError::MissingFile)));

        assert!(library.metadata().load().await.is_empty());
    }

    #[tokio::test]
    async fn metadata_failure_keeps_written_file() {
        let temp = tempdir().expect("tempdir");
        let library = make_library(&temp);
        // 元数据路径被目录占用，保存必然失败。
        std::fs::create_dir(library.metadata().path()).expect("occupy metadata path");

        let result = ingest(&library, submission("kept.txt", b"data", &["t"])).await;

        assert!(matches!(result, Err(UploadError::Io(_))));
        assert!(library.storage().root_path().join("kept.txt").is_file());
    }

    #[tokio::test]
    async fn upload_handler_returns_resolved_name() {
        let temp = tempdir().expect("tempdir");
        let library = make_library(&temp);
        let (content_type, body) = FormBuilder::new()
            .file("file", Some("notes.txt"), b"hello")
            .text("tags", "a, b")
            .build();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_str(&content_type).expect("header"),
        );

        let JsonResponse(response) = upload_file(
            Extension(library.clone()),
            Extension(make_upload_config()),
            headers,
            AxumBody::from(body),
        )
        .await
        .unwrap_or_else(|_| panic!("upload failed"));

        assert!(response.success);
        assert_eq!(response.file.as_deref(), Some("notes.txt"));
    }

    #[tokio::test]
    async fn upload_handler_collapses_errors_to_bad_request() {
        let temp = tempdir().expect("tempdir");
        let library = make_library(&temp);
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("multipart/form-data; boundary=xyz"),
        );

        let result = upload_file(
            Extension(library),
            Extension(make_upload_config()),
            headers,
            AxumBody::from("garbage"),
        )
        .await;

        let err = result.expect_err("malformed body must fail");
        assert!(matches!(err, ApiError::UploadFailed));
        assert_eq!(
            err.into_response().status(),
            axum::http::StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn upload_handler_enforces_size_limit() {
        let temp = tempdir().expect("tempdir");
        let library = make_library(&temp);
        let (content_type, body) = FormBuilder::new()
            .file("file", Some("big.bin"), &[7u8; 4096])
            .build();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_str(&content_type).expect("header"),
        );

        let result = upload_file(
            Extension(library.clone()),
            Extension(Arc::new(UploadConfig { max_size: 1024 })),
            headers,
            AxumBody::from(body),
        )
        .await;

        assert!(matches!(result, Err(ApiError::UploadFailed)));
        assert!(!library.storage().root_path().join("big.bin").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_same_name_uploads_never_overwrite() {
        const UPLOADS: usize = 16;
        let temp = tempdir().expect("tempdir");
        let library = make_library(&temp);

        let handles: Vec<_> = (0..UPLOADS)
            .map(|i| {
                let library = library.clone();
                tokio::spawn(async move {
                    let body = format!("payload-{i}");
                    let tag = format!("t{i}");
                    let form = submission("same.txt", body.as_bytes(), &[tag.as_str()]);
                    ingest(&library, form).await
                })
            })
            .collect();

        let mut names = HashSet::new();
        for handle in handles {
            let name = handle.await.expect("task").expect("ingest");
            assert!(names.insert(name), "resolved names must be distinct");
        }
        assert_eq!(names.len(), UPLOADS);

        let on_disk: HashSet<String> = std::fs::read_dir(library.storage().root_path())
            .expect("read storage root")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(on_disk, names);

        let map = library.metadata().load().await;
        assert_eq!(map.len(), UPLOADS);
        for name in &names {
            assert_eq!(map[name].tags.len(), 1, "metadata entry for {name}");
        }
        let payloads: HashSet<Vec<u8>> = names
            .iter()
            .map(|name| std::fs::read(library.storage().root_path().join(name)).expect("read"))
            .collect();
        assert_eq!(payloads.len(), UPLOADS);
    }
}
