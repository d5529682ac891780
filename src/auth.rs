//! 认证处理：共享口令登录、会话管理与访问控制中间件。

use axum::body::{Body as AxumBody, Bytes};
use axum::extract::Extension;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::middleware;
use axum_extra::extract::{CookieJar, cookie::Cookie};
use cookie::time::Duration as CookieDuration;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{LOGIN_PAGE, SESSION_COOKIE_NAME};
use crate::error::ApiError;
use crate::http::is_https_request;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid password")]
    InvalidPassword,
}

/// 会话门禁：持有口令与全部有效会话，是会话集合唯一的修改者。
#[derive(Debug)]
pub struct SessionGate {
    password: String,
    /// `None` 表示会话永不过期。
    session_ttl: Option<Duration>,
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

#[derive(Debug)]
struct SessionEntry {
    expires_at: Option<Instant>,
}

impl SessionGate {
    pub fn new(password: impl Into<String>, session_ttl: Option<Duration>) -> Self {
        Self {
            password: password.into(),
            session_ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn session_ttl(&self) -> Option<Duration> {
        self.session_ttl
    }

    /// 校验口令，成功时签发新的会话令牌。
    pub async fn login(&self, password: &str) -> Result<String, AuthError> {
        if !constant_time_eq(password.as_bytes(), self.password.as_bytes()) {
            return Err(AuthError::InvalidPassword);
        }
        let token = Uuid::new_v4().to_string();
        let expires_at = self.session_ttl.map(|ttl| Instant::now() + ttl);
        let mut sessions = self.sessions.lock().await;
        sessions.insert(token.clone(), SessionEntry { expires_at });
        Ok(token)
    }

    pub async fn logout(&self, token: &str) {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(token);
    }

    /// 令牌是否属于当前有效会话；过期令牌在此顺带移除。
    pub async fn is_session_valid(&self, token: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();
        let live = match sessions.get(token) {
            Some(entry) => entry.expires_at.is_none_or(|expires_at| expires_at > now),
            None => return false,
        };
        if !live {
            sessions.remove(token);
        }
        live
    }

    /// 请求是否携带有效的会话 Cookie。
    pub async fn is_authenticated(&self, jar: &CookieJar) -> bool {
        match jar.get(SESSION_COOKIE_NAME) {
            Some(cookie) => self.is_session_valid(cookie.value()).await,
            None => false,
        }
    }

    /// 清理过期会话。
    pub async fn prune_expired(&self) {
        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();
        let before = sessions.len();
        sessions.retain(|_, entry| entry.expires_at.is_none_or(|expires_at| expires_at > now));
        if sessions.len() != before {
            debug!(removed = before - sessions.len(), "pruned expired sessions");
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// 访问控制中间件：未登录的 API 调用返回 401，页面访问重定向到登录页。
pub async fn auth_middleware(
    Extension(gate): Extension<Arc<SessionGate>>,
    jar: CookieJar,
    req: Request<AxumBody>,
    next: middleware::Next,
) -> Response {
    let path = req.uri().path();
    if is_auth_exempt_path(path) || gate.is_authenticated(&jar).await {
        return next.run(req).await;
    }

    let is_navigation = matches!(*req.method(), Method::GET | Method::HEAD);
    if path.starts_with("/api/") || !is_navigation {
        debug!(path, "rejecting unauthenticated request");
        return ApiError::Unauthorized.into_response();
    }
    (StatusCode::FOUND, [(header::LOCATION, LOGIN_PAGE)]).into_response()
}

fn is_auth_exempt_path(path: &str) -> bool {
    const EXEMPT: &[&str] = &["/api/login", "/api/version", "/login.html", "/public/login.html"];
    const PUBLIC_PREFIXES: &[&str] = &["/css/", "/js/", "/public/css/", "/public/js/"];
    if path.contains("..") {
        return false;
    }
    EXEMPT.contains(&path) || PUBLIC_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

#[derive(Deserialize)]
pub(crate) struct LoginRequest {
    password: String,
}

/// 登录接口：口令正确时创建会话并写入 Cookie。
///
/// 请求体无法解析同样按口令错误处理。
pub async fn auth_login(
    Extension(gate): Extension<Arc<SessionGate>>,
    headers: HeaderMap,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, StatusCode), ApiError> {
    let Ok(payload) = serde_json::from_slice::<LoginRequest>(&body) else {
        warn!("login request body is not valid json");
        return Err(ApiError::Unauthorized);
    };
    let token = match gate.login(&payload.password).await {
        Ok(token) => token,
        Err(err) => {
            warn!(error = %err, "login rejected");
            return Err(err.into());
        }
    };
    info!("login succeeded");

    let mut cookie = Cookie::build((SESSION_COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .secure(is_https_request(&headers))
        .same_site(axum_extra::extract::cookie::SameSite::Strict);
    if let Some(ttl) = gate.session_ttl() {
        cookie = cookie.max_age(CookieDuration::seconds(ttl.as_secs() as i64));
    }
    Ok((jar.add(cookie.build()), StatusCode::OK))
}

/// 登出接口：清理会话并删除 Cookie。
pub async fn auth_logout(
    Extension(gate): Extension<Arc<SessionGate>>,
    jar: CookieJar,
) -> (CookieJar, StatusCode) {
    if let Some(cookie) = jar.get(SESSION_COOKIE_NAME) {
        gate.logout(cookie.value()).await;
    }

    (
        jar.remove(Cookie::build(SESSION_COOKIE_NAME).path("/").build()),
        StatusCode::NO_CONTENT,
    )
}
