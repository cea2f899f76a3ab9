//! 内存存储
//!
//! 用于测试与离线模式（SQLite 无法打开时顶替主存储）。可随时切换为“不可用”以模拟后端故障。

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{apply_to_routes, RouteStore, StorageError, WriteOp};
use crate::model::{Route, RouteId, TrackingSession};

#[derive(Debug, Default)]
struct MemoryState {
    routes: Vec<Route>,
    current_route: Option<RouteId>,
    sessions: Vec<TrackingSession>,
    session_cleared_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    state: RwLock<MemoryState>,
    available: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(MemoryState::default()),
            available: AtomicBool::new(true),
            writes: AtomicUsize::new(0),
        }
    }

    /// 始终不可用的存储（主存储打开失败时使用）
    pub fn offline() -> Self {
        let store = Self::new("offline");
        store.set_available(false);
        store
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// 成功写入的次数
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// 直接追加一条会话条目，绕过单例约束（模拟历史遗留的多会话数据）
    #[cfg(test)]
    pub(crate) async fn push_raw_session(&self, session: TrackingSession) {
        self.state.write().await.sessions.push(session);
    }

    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(StorageError::Unavailable(format!("{} store is offline", self.name)))
        }
    }
}

#[async_trait]
impl RouteStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load_routes(&self) -> Result<Vec<Route>, StorageError> {
        self.check()?;
        Ok(self.state.read().await.routes.clone())
    }

    async fn load_current_route(&self) -> Result<Option<RouteId>, StorageError> {
        self.check()?;
        Ok(self.state.read().await.current_route.clone())
    }

    async fn load_sessions(&self) -> Result<Vec<TrackingSession>, StorageError> {
        self.check()?;
        Ok(self.state.read().await.sessions.clone())
    }

    async fn load_session_cleared_at(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        self.check()?;
        Ok(self.state.read().await.session_cleared_at)
    }

    async fn apply(&self, op: WriteOp<'_>) -> Result<(), StorageError> {
        self.check()?;
        let mut state = self.state.write().await;
        match op {
            WriteOp::SetCurrentRoute(id) => state.current_route = id.map(str::to_string),
            WriteOp::PutSession(session) => state.sessions = vec![session.clone()],
            WriteOp::ClearSession => state.sessions.clear(),
            WriteOp::MarkSessionCleared(at) => state.session_cleared_at = Some(at),
            other => apply_to_routes(&mut state.routes, other),
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
