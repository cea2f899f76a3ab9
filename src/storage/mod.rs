//! 存储抽象层
//!
//! 三个逻辑集合：路线（按 id）、当前路线指针、唯一的活动会话。
//! 主存储为 SQLite，备用存储为按固定键保存文本的平面文件；PersistenceGateway 负责两者之间的降级与镜像。

pub mod flat;
pub mod gateway;
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{Route, RouteId, TrackingSession};

pub use flat::FlatFileStore;
pub use gateway::{create_gateway, PersistenceGateway, RestoredState};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// 存储错误：由 Gateway 在本地降级处理
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Both stores failed (primary: {primary}; fallback: {fallback})")]
    BothBackendsFailed { primary: String, fallback: String },
}

/// 一次写操作；Gateway 对每个 WriteOp 统一执行“先主后备”的策略
#[derive(Debug, Clone, Copy)]
pub enum WriteOp<'a> {
    /// 新增或更新单条路线
    PutRoute(&'a Route),
    /// 以给定列表整体替换全部路线
    ReplaceRoutes(&'a [Route]),
    DeleteRoute(&'a str),
    SetCurrentRoute(Option<&'a str>),
    /// 写入唯一的活动会话（覆盖已有会话）
    PutSession(&'a TrackingSession),
    ClearSession,
    /// 记录会话删除时间；不晚于该时间的会话副本在启动时被丢弃
    MarkSessionCleared(DateTime<Utc>),
}

impl WriteOp<'_> {
    pub fn label(&self) -> &'static str {
        match self {
            WriteOp::PutRoute(_) => "put_route",
            WriteOp::ReplaceRoutes(_) => "replace_routes",
            WriteOp::DeleteRoute(_) => "delete_route",
            WriteOp::SetCurrentRoute(_) => "set_current_route",
            WriteOp::PutSession(_) => "put_session",
            WriteOp::ClearSession => "clear_session",
            WriteOp::MarkSessionCleared(_) => "mark_session_cleared",
        }
    }
}

/// 存储后端接口
#[async_trait]
pub trait RouteStore: Send + Sync {
    /// 后端名称（日志用）
    fn name(&self) -> &str;

    /// 按保存顺序返回全部路线
    async fn load_routes(&self) -> Result<Vec<Route>, StorageError>;

    async fn load_current_route(&self) -> Result<Option<RouteId>, StorageError>;

    /// 返回所有会话条目；正常情况下至多一条，历史数据可能有多条
    async fn load_sessions(&self) -> Result<Vec<TrackingSession>, StorageError>;

    /// 最近一次记录的会话删除时间
    async fn load_session_cleared_at(&self) -> Result<Option<DateTime<Utc>>, StorageError>;

    async fn apply(&self, op: WriteOp<'_>) -> Result<(), StorageError>;
}

/// 在已有路线列表上应用单条写操作（内存与平面存储共用）
pub(crate) fn apply_to_routes(routes: &mut Vec<Route>, op: WriteOp<'_>) {
    match op {
        WriteOp::PutRoute(route) => match routes.iter_mut().find(|r| r.id == route.id) {
            Some(existing) => *existing = route.clone(),
            None => routes.push(route.clone()),
        },
        WriteOp::ReplaceRoutes(all) => *routes = all.to_vec(),
        WriteOp::DeleteRoute(id) => routes.retain(|r| r.id != id),
        _ => {}
    }
}
