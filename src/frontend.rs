//! 静态资源直通：公开目录与上传目录的文件读取。

use axum::Router;
use std::path::Path;
use tower_http::services::ServeDir;

/// 挂载静态资源路由。
///
/// `/uploads/*` 读取存储目录；`/public/*` 与其余路径都映射到公开目录，
/// 目录请求回落到其中的 `index.html`。
pub fn mount_static(router: Router, public_root: &Path, storage_root: &Path) -> Router {
    router
        .nest_service("/uploads", ServeDir::new(storage_root))
        .nest_service("/public", ServeDir::new(public_root))
        .fallback_service(ServeDir::new(public_root))
}
