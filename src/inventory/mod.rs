//! 库存对账：名称索引与对账引擎

pub mod index;
pub mod reconcile;

pub use index::NameIndex;
pub use reconcile::{clamp_count, InventoryInput, ReconciliationEngine, RouteMode, StopMode};
