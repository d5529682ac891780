//! 路由装配：API、静态资源、认证与追踪中间件。

use axum::extract::{DefaultBodyLimit, Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::routing::{get, post};
use axum::{Router, middleware};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info_span};

use crate::auth::{self, SessionGate};
use crate::frontend::mount_static;
use crate::http::{self, build_cors_layer, forwarded_client_ip};
use crate::library::Library;
use crate::listing;
use crate::upload::{self, UploadConfig};
use crate::version;

/// 服务进程持有的全部共享状态。
pub struct AppContext {
    pub gate: Arc<SessionGate>,
    pub library: Arc<Library>,
    pub upload: Arc<UploadConfig>,
    pub public_root: PathBuf,
    pub cors_origins: Option<String>,
}

pub fn build_router(ctx: &AppContext) -> Router {
    let api = Router::new()
        .route("/api/files", get(listing::list_files))
        .route(
            "/api/upload",
            // 上限由处理器自行检查，以便超限也返回统一的失败响应。
            post(upload::upload_file).layer(DefaultBodyLimit::disable()),
        )
        .route("/api/login", post(auth::auth_login))
        .route("/api/logout", post(auth::auth_logout))
        .route("/api/version", get(version::get_version_info));

    let mut app = mount_static(api, &ctx.public_root, ctx.library.storage().root_path())
        .layer(middleware::from_fn(auth::auth_middleware))
        .layer(middleware::from_fn(http::add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let connect_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.ip().to_string());
                    let client_ip = forwarded_client_ip(request.headers())
                        .or(connect_ip)
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(ctx.gate.clone()))
        .layer(Extension(ctx.library.clone()))
        .layer(Extension(ctx.upload.clone()));

    if let Some(cors_layer) = build_cors_layer(ctx.cors_origins.as_deref()) {
        app = app.layer(cors_layer);
    }
    app
}
