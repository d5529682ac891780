//! multipart/form-data 解码：从原始请求体提取上传文件与标签。

use bytes::Bytes;
use std::convert::Infallible;
use thiserror::Error;

pub const FILE_FIELD: &str = "file";
pub const TAGS_FIELD: &str = "tags";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("content type is not multipart/form-data")]
    NotMultipart,
    #[error("multipart boundary is missing or malformed")]
    MissingBoundary,
    #[error("malformed multipart body: {0}")]
    Malformed(#[source] multer::Error),
}

/// 表单中的文件部分。
#[derive(Clone, Debug)]
pub struct UploadedFile {
    pub file_name: String,
    pub data: Bytes,
}

/// 一次上传请求解码后的结果，只在该请求内存在。
#[derive(Clone, Debug, Default)]
pub struct Submission {
    pub file: Option<UploadedFile>,
    pub tags: Vec<String>,
}

/// 按 `content_type` 声明的 boundary 解析 `body`。
///
/// 只识别 `file` 与 `tags` 两个字段。多个带文件名的 `file` 部分时取第一个，
/// 多个 `tags` 部分时取最后一个；没有文件名的 `file` 部分视为未上传文件。
pub async fn decode(content_type: Option<&str>, body: Bytes) -> Result<Submission, DecodeError> {
    let content_type = content_type.ok_or(DecodeError::NotMultipart)?;
    let boundary = multer::parse_boundary(content_type).map_err(|err| match err {
        multer::Error::NoBoundary => DecodeError::MissingBoundary,
        _ => DecodeError::NotMultipart,
    })?;

    let stream = futures_util::stream::once(async move { Ok::<Bytes, Infallible>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);
    let mut submission = Submission::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(DecodeError::Malformed)?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(FILE_FIELD) => {
                let file_name = field
                    .file_name()
                    .filter(|file_name| !file_name.is_empty())
                    .map(str::to_string);
                let data = field.bytes().await.map_err(DecodeError::Malformed)?;
                if submission.file.is_none()
                    && let Some(file_name) = file_name
                {
                    submission.file = Some(UploadedFile { file_name, data });
                }
            }
            Some(TAGS_FIELD) => {
                let text = field.text().await.map_err(DecodeError::Malformed)?;
                submission.tags = parse_tags(&text);
            }
            _ => {}
        }
    }

    Ok(submission)
}

/// 逗号分隔的标签串；每个元素去除首尾空白，空串得到空列表。
pub fn parse_tags(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(',').map(|tag| tag.trim().to_string()).collect()
}
