//! 统一的 API 错误类型与转换。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json as JsonResponse, Response};

use crate::auth::AuthError;
use crate::upload::UploadResponse;

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    /// 上传链路的所有失败都折叠为该变体，细节只写入服务端日志。
    UploadFailed,
    /// 服务端故障；消息为固定文案，原始错误只写入日志。
    Internal(&'static str),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized").into_response(),
            ApiError::UploadFailed => (
                StatusCode::BAD_REQUEST,
                JsonResponse(UploadResponse::failed()),
            )
                .into_response(),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::InvalidPassword => ApiError::Unauthorized,
        }
    }
}
