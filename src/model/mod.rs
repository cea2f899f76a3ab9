//! 数据模型：路线目录（Route / Stop / Item）与追踪会话（TrackingSession / InventorySnapshot）

pub mod route;
pub mod session;

pub use route::{Item, ItemDisplayName, ItemIdentity, ItemType, Route, RouteId, Stop, StopId};
pub use session::{
    IdentityCounts, InventoryScope, InventorySnapshot, NameCounts, PendingDirection,
    PendingInventory, StopInventory, TrackingSession,
};
