//! 库存对账引擎
//!
//! 用户按名称报总数，存储按物品身份记录：同一站点内 k 个同名实例等分总数 V，
//! 每个实例记 V / k（不取整，小数原样保留）。离站记录时再按名称求差得到 addedAmount，
//! 并累加进 routeInventory。

use std::collections::BTreeMap;

use crate::core::ValidationError;
use crate::model::{
    IdentityCounts, InventoryScope, InventorySnapshot, ItemDisplayName, NameCounts, Route, Stop,
};

use super::index::NameIndex;

/// 用户输入：名称 → 非负整数
pub type InventoryInput = BTreeMap<ItemDisplayName, u32>;

/// 路线级记录模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMode {
    Pre,
    Post,
}

/// 站点级记录模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    PreStop,
    PostStop,
}

/// 把任意输入数值收敛为非负整数（负数、NaN 记 0，小数向下取整）
pub fn clamp_count(raw: f64) -> u32 {
    if raw.is_finite() && raw > 0.0 {
        raw.floor().min(f64::from(u32::MAX)) as u32
    } else {
        0
    }
}

fn to_counts(values: &InventoryInput) -> NameCounts {
    values
        .iter()
        .map(|(name, v)| (name.clone(), f64::from(*v)))
        .collect()
}

/// 无状态的对账引擎
#[derive(Debug, Default, Clone, Copy)]
pub struct ReconciliationEngine;

impl ReconciliationEngine {
    pub fn new() -> Self {
        Self
    }

    /// 作用域内的可采集物（按名称分组）
    pub fn snapshot(&self, route: &Route, scope: &InventoryScope) -> Result<NameIndex, ValidationError> {
        match scope.stop_id() {
            Some(id) => route
                .stop(id)
                .map(NameIndex::for_stop)
                .ok_or_else(|| ValidationError::UnknownStop(id.to_string())),
            None => Ok(NameIndex::for_route(route)),
        }
    }

    /// 按作用域提交一次输入；站点不存在时不做任何修改
    pub fn record(
        &self,
        route: &Route,
        inventory: &mut InventorySnapshot,
        scope: &InventoryScope,
        values: &InventoryInput,
    ) -> Result<(), ValidationError> {
        match scope {
            InventoryScope::PreRoute => self.record_route_level(inventory, RouteMode::Pre, values),
            InventoryScope::PostRoute => self.record_route_level(inventory, RouteMode::Post, values),
            InventoryScope::PreStop(id) => {
                let stop = route
                    .stop(id)
                    .ok_or_else(|| ValidationError::UnknownStop(id.clone()))?;
                self.record_stop_level(inventory, stop, StopMode::PreStop, values);
            }
            InventoryScope::PostStop(id) => {
                let stop = route
                    .stop(id)
                    .ok_or_else(|| ValidationError::UnknownStop(id.clone()))?;
                self.record_stop_level(inventory, stop, StopMode::PostStop, values);
            }
        }
        Ok(())
    }

    /// 路线级：原样保存；Pre 模式同时以输入值重置 routeInventory
    pub fn record_route_level(&self, inventory: &mut InventorySnapshot, mode: RouteMode, values: &InventoryInput) {
        let counts = to_counts(values);
        match mode {
            RouteMode::Pre => {
                inventory.route_inventory = counts.clone();
                inventory.pre_route = Some(counts);
            }
            RouteMode::Post => inventory.post_route = Some(counts),
        }
    }

    /// 站点级：等分到同名实例；PostStop 模式计算 addedAmount 并累加账本
    pub fn record_stop_level(&self, inventory: &mut InventorySnapshot, stop: &Stop, mode: StopMode, values: &InventoryInput) {
        let index = NameIndex::for_stop(stop);
        for name in values.keys().filter(|n| !index.contains(n)) {
            tracing::debug!("Ignoring '{}': no harvestable of that name at stop {}", name, stop.id);
        }

        let mut recorded = IdentityCounts::new();
        for (name, instances) in index.iter() {
            let Some(total) = values.get(name) else {
                continue;
            };
            let share = f64::from(*total) / instances.len() as f64;
            for id in instances {
                recorded.insert(id.clone(), share);
            }
        }

        let entry = inventory.stops.entry(stop.id.clone()).or_default();
        match mode {
            StopMode::PreStop => entry.pre_stop = Some(recorded),
            StopMode::PostStop => {
                for (name, instances) in index.iter() {
                    let Some(total) = values.get(name) else {
                        continue;
                    };
                    let pre_total: f64 = entry
                        .pre_stop
                        .as_ref()
                        .map(|pre| instances.iter().filter_map(|id| pre.get(id)).sum())
                        .unwrap_or(0.0);
                    let added = f64::from(*total) - pre_total;
                    let credited = entry.credited.entry(name.clone()).or_insert(0.0);
                    let increment = (added.max(0.0) - *credited).max(0.0);
                    *credited += increment;
                    *inventory.route_inventory.entry(name.clone()).or_insert(0.0) += increment;
                    entry.added_amount.insert(name.clone(), added);
                }
                entry.post_stop = Some(recorded);
            }
        }
    }

    /// 用户拒绝测量：记录显式空结果，与“采集为 0”区分
    pub fn skip(&self, route: &Route, inventory: &mut InventorySnapshot, scope: &InventoryScope) -> Result<(), ValidationError> {
        if let Some(id) = scope.stop_id() {
            if route.stop(id).is_none() {
                return Err(ValidationError::UnknownStop(id.to_string()));
            }
        }
        match scope {
            InventoryScope::PreRoute => inventory.pre_route = Some(NameCounts::new()),
            InventoryScope::PostRoute => inventory.post_route = Some(NameCounts::new()),
            InventoryScope::PreStop(id) => {
                inventory.stops.entry(id.clone()).or_default().pre_stop = Some(IdentityCounts::new())
            }
            InventoryScope::PostStop(id) => {
                inventory.stops.entry(id.clone()).or_default().post_stop = Some(IdentityCounts::new())
            }
        }
        Ok(())
    }

    /// 回退进入站点时的预填值：依次取该站点已有的 postStop、preStop、路线 preRoute，否则为 0
    pub fn revisit_seed(&self, inventory: &InventorySnapshot, stop: &Stop) -> NameCounts {
        let index = NameIndex::for_stop(stop);
        let record = inventory.stop(&stop.id);
        let post = record
            .and_then(|r| r.post_stop.as_ref())
            .map(|c| index.aggregate(c))
            .unwrap_or_default();
        let pre = record
            .and_then(|r| r.pre_stop.as_ref())
            .map(|c| index.aggregate(c))
            .unwrap_or_default();

        index
            .names()
            .map(|name| {
                let value = post
                    .get(name)
                    .or_else(|| pre.get(name))
                    .or_else(|| inventory.pre_route.as_ref().and_then(|r| r.get(name)))
                    .copied()
                    .unwrap_or(0.0);
                (name.clone(), value)
            })
            .collect()
    }
}
