//! 平面键值备用存储
//!
//! 每个固定键对应目录下的一个文本文件（`<key>.json`），内容为 JSON 文本。
//! 写入先落临时文件再 rename，避免半写状态。

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;

use super::{apply_to_routes, RouteStore, StorageError, WriteOp};
use crate::model::{Route, RouteId, TrackingSession};

pub const ROUTES_KEY: &str = "farmRoutes";
pub const CURRENT_ROUTE_KEY: &str = "currentRouteId";
pub const SESSION_KEY: &str = "activeTrackingSession";
pub const SESSION_CLEARED_KEY: &str = "sessionClearedAt";

/// 会话键的内容：正常是单个对象，旧数据可能是数组
#[derive(Deserialize)]
#[serde(untagged)]
enum SessionEntry {
    One(Box<TrackingSession>),
    Many(Vec<TrackingSession>),
}

pub struct FlatFileStore {
    root: PathBuf,
    /// 串行化路线列表的读-改-写
    write_lock: Mutex<()>,
}

impl FlatFileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    /// 读取键对应的文本；键不存在时返回 None
    pub async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match tokio::fs::read_to_string(self.key_path(key)).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let tmp = self.root.join(format!("{key}.json.tmp"));
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, self.key_path(key)).await?;
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.key_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_routes(&self) -> Result<Vec<Route>, StorageError> {
        match self.get(ROUTES_KEY).await? {
            Some(text) => Ok(serde_json::from_str(&text)?),
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl RouteStore for FlatFileStore {
    fn name(&self) -> &str {
        "flat-file"
    }

    async fn load_routes(&self) -> Result<Vec<Route>, StorageError> {
        self.read_routes().await
    }

    async fn load_current_route(&self) -> Result<Option<RouteId>, StorageError> {
        let Some(text) = self.get(CURRENT_ROUTE_KEY).await? else {
            return Ok(None);
        };
        // 兼容未加引号的裸 id
        let id = serde_json::from_str::<Option<String>>(&text)
            .unwrap_or_else(|_| Some(text.trim().to_string()));
        Ok(id.filter(|id| !id.is_empty()))
    }

    async fn load_sessions(&self) -> Result<Vec<TrackingSession>, StorageError> {
        let Some(text) = self.get(SESSION_KEY).await? else {
            return Ok(Vec::new());
        };
        let entry: Option<SessionEntry> = serde_json::from_str(&text)?;
        Ok(match entry {
            Some(SessionEntry::One(session)) => vec![*session],
            Some(SessionEntry::Many(sessions)) => sessions,
            None => Vec::new(),
        })
    }

    async fn load_session_cleared_at(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        match self.get(SESSION_CLEARED_KEY).await? {
            Some(text) => Ok(serde_json::from_str(&text)?),
            None => Ok(None),
        }
    }

    async fn apply(&self, op: WriteOp<'_>) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        match op {
            WriteOp::SetCurrentRoute(Some(id)) => {
                self.set(CURRENT_ROUTE_KEY, &serde_json::to_string(id)?).await
            }
            WriteOp::SetCurrentRoute(None) => self.remove(CURRENT_ROUTE_KEY).await,
            WriteOp::PutSession(session) => {
                self.set(SESSION_KEY, &serde_json::to_string(session)?).await
            }
            WriteOp::ClearSession => self.remove(SESSION_KEY).await,
            WriteOp::MarkSessionCleared(at) => {
                self.set(SESSION_CLEARED_KEY, &serde_json::to_string(&at)?).await
            }
            other => {
                let mut routes = self.read_routes().await?;
                apply_to_routes(&mut routes, other);
                self.set(ROUTES_KEY, &serde_json::to_string(&routes)?).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_routes_round_trip_under_fixed_key() {
        let dir = TempDir::new().unwrap();
        let store = FlatFileStore::new(dir.path());
        assert!(store.load_routes().await.unwrap().is_empty());

        store.apply(WriteOp::PutRoute(&Route::new("A").with_id("a"))).await.unwrap();
        store.apply(WriteOp::PutRoute(&Route::new("B").with_id("b"))).await.unwrap();
        let routes = store.load_routes().await.unwrap();
        assert_eq!(routes.len(), 2);

        let raw = store.get(ROUTES_KEY).await.unwrap().unwrap();
        assert!(raw.contains("\"id\":\"a\""));
    }

    #[tokio::test]
    async fn test_current_route_accepts_bare_id() {
        let dir = TempDir::new().unwrap();
        let store = FlatFileStore::new(dir.path());
        store.set(CURRENT_ROUTE_KEY, "route-7").await.unwrap();
        assert_eq!(store.load_current_route().await.unwrap(), Some("route-7".to_string()));

        store.apply(WriteOp::SetCurrentRoute(Some("route-8"))).await.unwrap();
        assert_eq!(store.load_current_route().await.unwrap(), Some("route-8".to_string()));

        store.apply(WriteOp::SetCurrentRoute(None)).await.unwrap();
        assert_eq!(store.load_current_route().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_session_entry_may_be_array() {
        let dir = TempDir::new().unwrap();
        let store = FlatFileStore::new(dir.path());
        let session = TrackingSession::new(&Route::new("A").with_id("a"));
        let legacy = serde_json::to_string(&vec![session.clone(), session.clone()]).unwrap();
        store.set(SESSION_KEY, &legacy).await.unwrap();
        assert_eq!(store.load_sessions().await.unwrap().len(), 2);

        store.apply(WriteOp::PutSession(&session)).await.unwrap();
        assert_eq!(store.load_sessions().await.unwrap(), vec![session]);

        store.apply(WriteOp::ClearSession).await.unwrap();
        store.apply(WriteOp::ClearSession).await.unwrap();
        assert!(store.load_sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_session_cleared_marker_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = FlatFileStore::new(dir.path());
        assert_eq!(store.load_session_cleared_at().await.unwrap(), None);

        let at = Utc::now();
        store.apply(WriteOp::MarkSessionCleared(at)).await.unwrap();
        assert_eq!(store.load_session_cleared_at().await.unwrap(), Some(at));
        assert!(store.load_routes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unwritable_root_fails() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();
        let store = FlatFileStore::new(&blocker);
        assert!(store.apply(WriteOp::PutRoute(&Route::new("A"))).await.is_err());
        assert!(store.apply(WriteOp::PutSession(&TrackingSession::new(&Route::new("A")))).await.is_err());
    }
}
