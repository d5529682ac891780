//! CLI arguments and server configuration defaults.

use clap::Parser;
use shadow_rs::formatcp;

use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const SESSION_COOKIE_NAME: &str = "kakomon_session";
pub const LOGIN_PAGE: &str = "/login.html";
pub const DEFAULT_PASSWORD: &str = "2026";
pub const DEFAULT_DATA_FILE: &str = "data.json";
pub const DEFAULT_PUBLIC_DIR: &str = "public";
pub const DEFAULT_STORAGE_DIR: &str = "public/uploads";
/// 0 表示会话永不过期。
pub const DEFAULT_SESSION_TTL_SECS: u64 = 0;
pub const DEFAULT_UPLOAD_MAX_SIZE: u64 = 512 * 1024 * 1024;
pub const SESSION_PRUNE_INTERVAL_SECS: u64 = 300;

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "kakomon-drive", version = VERSION_INFO, about = "Kakomon file drop server")]
pub struct Args {
    #[arg(long, env = "KAKOMON_HOST", default_value = "0.0.0.0", help = "Bind host")]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "KAKOMON_PORT",
        default_value_t = 8090,
        help = "HTTP port"
    )]
    pub port: u16,
    #[arg(
        long,
        env = "KAKOMON_PUBLIC_DIR",
        default_value = DEFAULT_PUBLIC_DIR,
        help = "Static asset root"
    )]
    pub public_dir: String,
    #[arg(
        short = 's',
        long,
        env = "KAKOMON_STORAGE_DIR",
        default_value = DEFAULT_STORAGE_DIR,
        help = "Directory holding uploaded files"
    )]
    pub storage_dir: String,
    #[arg(
        long,
        env = "KAKOMON_DATA_FILE",
        default_value = DEFAULT_DATA_FILE,
        help = "Tag metadata JSON document"
    )]
    pub data_file: String,
    #[arg(
        long,
        env = "KAKOMON_PASSWORD",
        default_value = DEFAULT_PASSWORD,
        hide_env_values = true,
        help = "Shared login password"
    )]
    pub password: String,
    #[arg(
        long,
        env = "KAKOMON_SESSION_TTL_SECS",
        default_value_t = DEFAULT_SESSION_TTL_SECS,
        help = "Session expiration in seconds (0 to never expire)"
    )]
    pub session_ttl_secs: u64,
    #[arg(
        long,
        env = "KAKOMON_UPLOAD_MAX_SIZE",
        default_value_t = DEFAULT_UPLOAD_MAX_SIZE,
        help = "Max upload request size in bytes (0 to disable)"
    )]
    pub upload_max_size: u64,
    #[arg(long, env = "KAKOMON_CORS_ORIGINS", help = "Comma separated CORS origins")]
    pub cors_origins: Option<String>,
}
