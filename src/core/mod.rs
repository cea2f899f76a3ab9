//! 核心层：错误分类、状态机迁移、确认闸门、Tracker 应用上下文与目录编辑

pub mod catalog;
pub mod confirm;
pub mod error;
pub mod fsm;
pub mod state;
pub mod tracker;

pub use confirm::{ConfirmGate, ConfirmRequest, StaticConfirm};
pub use error::{DataFormatError, TrackerError, ValidationError};
pub use state::{InventoryRow, Outcome, PendingGroup, StopItemView, TrackerState, TrackerView};
pub use tracker::Tracker;
