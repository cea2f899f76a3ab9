//! Farmtrack - 农场路线追踪
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、状态机、确认闸门、Tracker 应用上下文与目录编辑
//! - **inventory**: 名称索引与库存对账引擎
//! - **model**: 路线目录与追踪会话数据模型
//! - **observability**: 日志初始化
//! - **storage**: 存储接口、SQLite 主存储、平面文件备用存储与持久化网关
//! - **transfer**: 导出 / 导入快照文档
//! - **ui**: 行式控制台

pub mod config;
pub mod core;
pub mod inventory;
pub mod model;
pub mod observability;
pub mod storage;
pub mod transfer;
pub mod ui;

pub use crate::core::{Tracker, TrackerState, TrackerView};
