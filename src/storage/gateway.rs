//! 持久化网关：主存储 + 备用存储
//!
//! 写：先写主存储；失败则改写备用存储；主存储成功时顺带镜像到备用存储。
//! 读（启动）：路线优先读主存储，为空再读备用；会话从两个后端都读，按更新时间取最新的一份。
//! 删会话：两个后端都删；只删掉一边时在成功的一边留下删除标记，启动时据此丢弃残留副本。

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{FlatFileStore, MemoryStore, RouteStore, SqliteStore, StorageError, WriteOp};
use crate::config::StorageSection;
use crate::model::{Route, RouteId, TrackingSession};

/// 启动时恢复出的状态
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoredState {
    pub routes: Vec<Route>,
    pub current_route_id: Option<RouteId>,
    pub session: Option<TrackingSession>,
}

/// 两个后端中读到的全部会话副本
#[derive(Debug, Default)]
struct StoredSessions {
    primary: Vec<TrackingSession>,
    fallback: Vec<TrackingSession>,
    cleared_at: Option<DateTime<Utc>>,
}

pub struct PersistenceGateway {
    primary: Arc<dyn RouteStore>,
    fallback: Arc<dyn RouteStore>,
    /// 主存储写成功后是否同步镜像到备用存储
    mirror_fallback: bool,
}

impl PersistenceGateway {
    pub fn new(primary: Arc<dyn RouteStore>, fallback: Arc<dyn RouteStore>) -> Self {
        Self {
            primary,
            fallback,
            mirror_fallback: true,
        }
    }

    pub fn with_mirroring(mut self, enabled: bool) -> Self {
        self.mirror_fallback = enabled;
        self
    }

    /// 按写策略执行一次写操作；只有两个后端都失败时才返回错误
    pub async fn write(&self, op: WriteOp<'_>) -> Result<(), StorageError> {
        match self.primary.apply(op).await {
            Ok(()) => {
                if self.mirror_fallback {
                    if let Err(e) = self.fallback.apply(op).await {
                        tracing::debug!("Mirror write {} to {} failed: {}", op.label(), self.fallback.name(), e);
                    }
                }
                Ok(())
            }
            Err(primary_err) => {
                tracing::warn!(
                    "Primary store {} failed on {}: {}, writing {} instead",
                    self.primary.name(),
                    op.label(),
                    primary_err,
                    self.fallback.name()
                );
                self.fallback.apply(op).await.map_err(|fallback_err| {
                    tracing::error!("Fallback store {} failed on {}: {}", self.fallback.name(), op.label(), fallback_err);
                    StorageError::BothBackendsFailed {
                        primary: primary_err.to_string(),
                        fallback: fallback_err.to_string(),
                    }
                })
            }
        }
    }

    /// 从两个后端同时删除活动会话
    ///
    /// 只删掉一边时返回 `Ok(Some(告警))`，并在删除成功的后端记录删除时间，
    /// 下次启动时另一边残留的旧副本会被丢弃。
    pub async fn clear_session(&self) -> Result<Option<String>, StorageError> {
        let cleared_at = Utc::now();
        let primary = self.primary.apply(WriteOp::ClearSession).await;
        let fallback = self.fallback.apply(WriteOp::ClearSession).await;
        let (failed, failure, survivor) = match (primary, fallback) {
            (Ok(()), Ok(())) => return Ok(None),
            (Err(p), Err(f)) => {
                return Err(StorageError::BothBackendsFailed {
                    primary: p.to_string(),
                    fallback: f.to_string(),
                })
            }
            (Err(e), Ok(())) => (&self.primary, e, &self.fallback),
            (Ok(()), Err(e)) => (&self.fallback, e, &self.primary),
        };

        tracing::warn!("Could not clear session in {}: {}", failed.name(), failure);
        let warning = match survivor.apply(WriteOp::MarkSessionCleared(cleared_at)).await {
            Ok(()) => format!(
                "Session is still stored in {} ({}); it will be discarded on next start",
                failed.name(),
                failure
            ),
            Err(e) => {
                tracing::warn!("Could not record session clear in {}: {}", survivor.name(), e);
                format!(
                    "Session is still stored in {} ({}) and may come back on next start",
                    failed.name(),
                    failure
                )
            }
        };
        Ok(Some(warning))
    }

    /// 启动恢复：读取路线、会话与当前路线指针
    pub async fn restore(&self) -> RestoredState {
        let routes = self.load_routes().await;
        let mut session = self.restore_session().await;

        let orphaned = session
            .as_ref()
            .is_some_and(|s| !routes.iter().any(|r| r.id == s.route_id));
        if orphaned {
            tracing::warn!("Stored session references a missing route, discarding it");
            session = None;
            if let Err(e) = self.clear_session().await {
                tracing::warn!("Could not discard orphaned session: {}", e);
            }
        }

        let current_route_id = match &session {
            Some(s) => Some(s.route_id.clone()),
            None if routes.len() == 1 => Some(routes[0].id.clone()),
            None => self
                .load_pointer()
                .await
                .filter(|id| routes.iter().any(|r| &r.id == id)),
        };

        tracing::info!(
            "Restored {} routes, session active: {}, current route: {:?}",
            routes.len(),
            session.is_some(),
            current_route_id
        );

        RestoredState {
            routes,
            current_route_id,
            session,
        }
    }

    /// 在两个后端的全部副本中选出最新的会话，并让两个后端重新一致
    async fn restore_session(&self) -> Option<TrackingSession> {
        let stored = self.load_sessions().await;
        let per_store_duplicates = stored.primary.len() > 1 || stored.fallback.len() > 1;
        let (live, cleared): (Vec<_>, Vec<_>) = stored
            .primary
            .into_iter()
            .chain(stored.fallback)
            .partition(|s| stored.cleared_at.map_or(true, |at| s.updated_at > at));

        let kept = live.iter().max_by_key(|s| s.freshness()).cloned();
        let Some(kept) = kept else {
            if !cleared.is_empty() {
                tracing::warn!("Discarding {} session copies left over from a cleared session", cleared.len());
                if let Err(e) = self.clear_session().await {
                    tracing::warn!("Could not discard cleared session: {}", e);
                }
            }
            return None;
        };

        let diverged = live.iter().any(|s| *s != kept);
        if diverged || per_store_duplicates || !cleared.is_empty() {
            tracing::warn!(
                "Found {} stored session copies, keeping revision {} from {}",
                live.len() + cleared.len(),
                kept.revision,
                kept.updated_at
            );
            for store in [&self.primary, &self.fallback] {
                if let Err(e) = store.apply(WriteOp::PutSession(&kept)).await {
                    tracing::warn!("Could not rewrite session in {}: {}", store.name(), e);
                }
            }
        }
        Some(kept)
    }

    async fn load_routes(&self) -> Vec<Route> {
        match self.primary.load_routes().await {
            Ok(routes) if !routes.is_empty() => return routes,
            Ok(_) => {}
            Err(e) => tracing::warn!("Reading routes from {} failed: {}", self.primary.name(), e),
        }
        match self.fallback.load_routes().await {
            Ok(routes) => {
                if !routes.is_empty() {
                    tracing::info!("Loaded {} routes from {}", routes.len(), self.fallback.name());
                }
                routes
            }
            Err(e) => {
                tracing::warn!("Reading routes from {} failed: {}", self.fallback.name(), e);
                Vec::new()
            }
        }
    }

    async fn load_sessions(&self) -> StoredSessions {
        let mut stored = StoredSessions::default();
        for (store, sessions) in [
            (&self.primary, &mut stored.primary),
            (&self.fallback, &mut stored.fallback),
        ] {
            match store.load_sessions().await {
                Ok(found) => *sessions = found,
                Err(e) => tracing::warn!("Reading session from {} failed: {}", store.name(), e),
            }
            match store.load_session_cleared_at().await {
                Ok(at) => stored.cleared_at = stored.cleared_at.max(at),
                Err(e) => tracing::warn!("Reading session marker from {} failed: {}", store.name(), e),
            }
        }
        stored
    }

    async fn load_pointer(&self) -> Option<RouteId> {
        match self.primary.load_current_route().await {
            Ok(Some(id)) => return Some(id),
            Ok(None) => {}
            Err(e) => tracing::warn!("Reading current route from {} failed: {}", self.primary.name(), e),
        }
        self.fallback.load_current_route().await.ok().flatten()
    }
}

/// 按配置创建网关：SQLite 打不开时主存储降级为离线，所有写入落到备用存储
pub fn create_gateway(cfg: &StorageSection) -> PersistenceGateway {
    let primary: Arc<dyn RouteStore> = match SqliteStore::open(&cfg.database_path) {
        Ok(store) => {
            tracing::info!("Using SQLite store: {:?}", cfg.database_path);
            Arc::new(store)
        }
        Err(e) => {
            tracing::warn!("Failed to open SQLite store ({}), primary store offline", e);
            Arc::new(MemoryStore::offline())
        }
    };
    tracing::info!("Using flat-file fallback store: {:?}", cfg.fallback_dir);
    let fallback = Arc::new(FlatFileStore::new(&cfg.fallback_dir));
    PersistenceGateway::new(primary, fallback).with_mirroring(cfg.mirror_fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn stores() -> (Arc<MemoryStore>, Arc<MemoryStore>, PersistenceGateway) {
        let primary = Arc::new(MemoryStore::new("primary"));
        let fallback = Arc::new(MemoryStore::new("fallback"));
        let gateway = PersistenceGateway::new(primary.clone(), fallback.clone());
        (primary, fallback, gateway)
    }

    fn route(id: &str) -> Route {
        Route::new(id).with_id(id)
    }

    #[tokio::test]
    async fn test_write_mirrors_to_fallback() {
        let (primary, fallback, gateway) = stores();
        gateway.write(WriteOp::PutRoute(&route("a"))).await.unwrap();
        assert_eq!(primary.load_routes().await.unwrap().len(), 1);
        assert_eq!(fallback.load_routes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mirroring_can_be_disabled() {
        let primary = Arc::new(MemoryStore::new("primary"));
        let fallback = Arc::new(MemoryStore::new("fallback"));
        let gateway = PersistenceGateway::new(primary.clone(), fallback.clone()).with_mirroring(false);
        gateway.write(WriteOp::PutRoute(&route("a"))).await.unwrap();
        assert_eq!(fallback.write_count(), 0);
    }

    #[tokio::test]
    async fn test_primary_failure_degrades_to_fallback() {
        let (primary, fallback, gateway) = stores();
        primary.set_available(false);
        gateway.write(WriteOp::PutRoute(&route("a"))).await.unwrap();
        assert_eq!(fallback.load_routes().await.unwrap().len(), 1);

        fallback.set_available(false);
        let err = gateway.write(WriteOp::PutRoute(&route("b"))).await.unwrap_err();
        assert!(matches!(err, StorageError::BothBackendsFailed { .. }));
    }

    #[tokio::test]
    async fn test_clear_session_hits_both_even_if_one_is_down() {
        let (primary, fallback, gateway) = stores();
        let session = TrackingSession::new(&route("a"));
        gateway.write(WriteOp::PutSession(&session)).await.unwrap();
        assert_eq!(fallback.session_count().await, 1);

        primary.set_available(false);
        let warning = gateway.clear_session().await.unwrap();
        assert!(warning.unwrap().contains("primary"));
        assert_eq!(fallback.session_count().await, 0);
        assert!(fallback.load_session_cleared_at().await.unwrap().is_some());

        primary.set_available(true);
        fallback.set_available(false);
        gateway.clear_session().await.unwrap();
        assert_eq!(primary.session_count().await, 0);

        fallback.set_available(true);
        assert_eq!(gateway.clear_session().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_restore_drops_copy_left_by_partial_clear() {
        let (primary, fallback, gateway) = stores();
        primary.apply(WriteOp::PutRoute(&route("a"))).await.unwrap();
        let mut session = TrackingSession::new(&route("a"));
        session.touch();
        gateway.write(WriteOp::PutSession(&session)).await.unwrap();

        primary.set_available(false);
        gateway.clear_session().await.unwrap();
        primary.set_available(true);
        assert_eq!(primary.session_count().await, 1);

        let restored = gateway.restore().await;
        assert!(restored.session.is_none());
        assert_eq!(primary.session_count().await, 0);
        assert_eq!(fallback.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_session_started_after_clear_survives_marker() {
        let (primary, _fallback, gateway) = stores();
        primary.apply(WriteOp::PutRoute(&route("a"))).await.unwrap();
        let cleared_at = Utc::now() - Duration::minutes(1);
        gateway.write(WriteOp::MarkSessionCleared(cleared_at)).await.unwrap();

        let mut session = TrackingSession::new(&route("a"));
        session.touch();
        gateway.write(WriteOp::PutSession(&session)).await.unwrap();
        assert_eq!(gateway.restore().await.session, Some(session));
    }

    #[tokio::test]
    async fn test_restore_prefers_newest_copy_across_backends() {
        let (primary, fallback, gateway) = stores();
        primary.apply(WriteOp::PutRoute(&route("a"))).await.unwrap();
        let mut stale = TrackingSession::new(&route("a"));
        stale.touch();
        let mut fresh = stale.clone();
        fresh.notes = "written while primary was down".to_string();
        fresh.touch();
        fresh.updated_at = stale.updated_at + Duration::seconds(30);
        primary.apply(WriteOp::PutSession(&stale)).await.unwrap();
        fallback.apply(WriteOp::PutSession(&fresh)).await.unwrap();

        let restored = gateway.restore().await;
        assert_eq!(restored.session.as_ref(), Some(&fresh));
        assert_eq!(primary.load_sessions().await.unwrap(), vec![fresh.clone()]);
        assert_eq!(fallback.load_sessions().await.unwrap(), vec![fresh]);
    }

    #[tokio::test]
    async fn test_restore_reads_fallback_when_primary_empty() {
        let (_primary, fallback, gateway) = stores();
        fallback.apply(WriteOp::PutRoute(&route("a"))).await.unwrap();
        fallback.apply(WriteOp::PutRoute(&route("b"))).await.unwrap();
        fallback.apply(WriteOp::SetCurrentRoute(Some("b"))).await.unwrap();

        let restored = gateway.restore().await;
        assert_eq!(restored.routes.len(), 2);
        assert_eq!(restored.current_route_id.as_deref(), Some("b"));
        assert!(restored.session.is_none());
    }

    #[tokio::test]
    async fn test_restore_single_route_is_auto_activated() {
        let (primary, _fallback, gateway) = stores();
        primary.apply(WriteOp::PutRoute(&route("only"))).await.unwrap();
        primary.apply(WriteOp::SetCurrentRoute(Some("gone"))).await.unwrap();
        let restored = gateway.restore().await;
        assert_eq!(restored.current_route_id.as_deref(), Some("only"));
    }

    #[tokio::test]
    async fn test_restore_ignores_dangling_pointer() {
        let (primary, _fallback, gateway) = stores();
        primary.apply(WriteOp::PutRoute(&route("a"))).await.unwrap();
        primary.apply(WriteOp::PutRoute(&route("b"))).await.unwrap();
        primary.apply(WriteOp::SetCurrentRoute(Some("gone"))).await.unwrap();
        assert_eq!(gateway.restore().await.current_route_id, None);
    }

    #[tokio::test]
    async fn test_restore_collapses_multiple_sessions() {
        let (primary, _fallback, gateway) = stores();
        primary.apply(WriteOp::PutRoute(&route("a"))).await.unwrap();
        primary.apply(WriteOp::PutRoute(&route("b"))).await.unwrap();

        let older = TrackingSession::new(&route("a"));
        let mut newer = TrackingSession::new(&route("b"));
        newer.updated_at = older.updated_at + Duration::minutes(5);
        primary.push_raw_session(older).await;
        primary.push_raw_session(newer.clone()).await;

        let restored = gateway.restore().await;
        assert_eq!(restored.session, Some(newer));
        assert_eq!(restored.current_route_id.as_deref(), Some("b"));
        assert_eq!(primary.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_restore_discards_orphaned_session() {
        let (primary, fallback, gateway) = stores();
        primary.apply(WriteOp::PutRoute(&route("a"))).await.unwrap();
        gateway.write(WriteOp::PutSession(&TrackingSession::new(&route("deleted")))).await.unwrap();

        let restored = gateway.restore().await;
        assert!(restored.session.is_none());
        assert_eq!(restored.current_route_id.as_deref(), Some("a"));
        assert_eq!(primary.session_count().await, 0);
        assert_eq!(fallback.session_count().await, 0);
    }
}
