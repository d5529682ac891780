//! Kakomon Drive server binary.
//!
//! A small password-protected file drop: uploads land in a storage directory,
//! per-file tags live in a JSON document that is reconciled against the
//! directory on every listing, and the web frontend is served from a public
//! root on disk.

mod app;
mod atomic;
mod auth;
mod background;
mod config;
mod error;
mod frontend;
mod http;
mod library;
mod listing;
mod logging;
mod metadata;
mod multipart;
mod storage;
mod upload;
mod version;

use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;

use crate::app::{AppContext, build_router};
use crate::auth::SessionGate;
use crate::background::spawn_background_tasks;
use crate::config::Args;
use crate::library::Library;
use crate::metadata::MetadataStore;
use crate::storage::Storage;
use crate::upload::UploadConfig;

shadow!(build);

/// Starts the server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let args = Args::parse();
    let data_file = PathBuf::from(&args.data_file);
    let mut storage = Storage::new(PathBuf::from(&args.storage_dir));
    if let Some(name) = data_file.file_name() {
        storage = storage.with_reserved_name(name.to_string_lossy());
    }
    storage.ensure_root().await?;

    let library = Arc::new(Library::new(storage, MetadataStore::new(data_file)));
    let session_ttl = (args.session_ttl_secs > 0).then(|| Duration::from_secs(args.session_ttl_secs));
    let gate = Arc::new(SessionGate::new(args.password.clone(), session_ttl));
    let ctx = AppContext {
        gate: gate.clone(),
        library,
        upload: Arc::new(UploadConfig {
            max_size: args.upload_max_size,
        }),
        public_root: PathBuf::from(&args.public_dir),
        cors_origins: args.cors_origins.clone(),
    };
    let app = build_router(&ctx);

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let handle = Handle::new();

    info!(
        version = build::PKG_VERSION,
        storage = ?ctx.library.storage().root_path(),
        metadata = ?ctx.library.metadata().path(),
        public = ?ctx.public_root,
        session_ttl_secs = args.session_ttl_secs,
        "🚀 Starting HTTP server at {}",
        addr
    );

    let server = axum_server::bind(addr)
        .handle(handle.clone())
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());

    spawn_background_tasks(gate);
    tokio::select! {
        result = server => result?,
        _ = shutdown_signal(handle) => {}
    }

    Ok(())
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
