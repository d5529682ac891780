//! 过期会话清理的后台任务。

use std::sync::Arc;
use std::time::Duration;

use crate::auth::SessionGate;
use crate::config::SESSION_PRUNE_INTERVAL_SECS;

/// 启动后台任务；会话永不过期时无需清理。
pub fn spawn_background_tasks(gate: Arc<SessionGate>) {
    if gate.session_ttl().is_none() {
        return;
    }

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(SESSION_PRUNE_INTERVAL_SECS));
        loop {
            interval.tick().await;
            gate.prune_expired().await;
        }
    });
}
