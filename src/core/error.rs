//! 错误类型
//!
//! ValidationError 阻断状态迁移且不修改任何状态；DataFormatError 用于导入文档校验；
//! 存储错误（StorageError）在 Tracker 内部降级处理，不会从这里向上传播。

use thiserror::Error;

use crate::model::{ItemIdentity, RouteId, StopId};

/// 校验错误：调用方可见，迁移被拒绝，内存与存储均不变
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("A session for route '{active}' is already active (requested '{requested}')")]
    SessionConflict { active: RouteId, requested: RouteId },

    #[error("No tracking session is active")]
    NoActiveSession,

    #[error("No inventory input is pending")]
    NotAwaitingInventory,

    /// 等待库存输入时不允许导航
    #[error("Inventory input is pending, submit or skip it first")]
    InventoryPending,

    #[error("Unknown route: {0}")]
    UnknownRoute(RouteId),

    #[error("Unknown stop: {0}")]
    UnknownStop(StopId),

    #[error("Unknown item: {0}")]
    UnknownItem(ItemIdentity),

    #[error("Item of type '{0}' requires a name")]
    MissingItemName(String),

    #[error("Route '{0}' has no stops")]
    EmptyRoute(RouteId),

    /// 会话进行中，路线目录被冻结
    #[error("Routes cannot be edited while a tracking session is active")]
    CatalogLocked,

    #[error("Stop position {index} is out of range (route has {len} stops)")]
    StopOutOfRange { index: usize, len: usize },
}

/// 导入文档格式错误：导入中止，现有路线不受影响
#[derive(Error, Debug)]
pub enum DataFormatError {
    #[error("Import document is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Import document has no 'routes' field")]
    MissingRoutes,

    #[error("Import document field 'routes' is not an array")]
    RoutesNotArray,

    #[error("Import document contains malformed routes: {0}")]
    InvalidRoutes(#[source] serde_json::Error),
}

/// Tracker 对外暴露的错误
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    DataFormat(#[from] DataFormatError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrackerError {
    /// 是否为会话冲突（UI 据此提示先结束当前会话）
    pub fn is_session_conflict(&self) -> bool {
        matches!(
            self,
            TrackerError::Validation(ValidationError::SessionConflict { .. })
        )
    }
}
