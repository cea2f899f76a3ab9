//! 追踪会话与库存快照
//!
//! 路线级库存（preRoute / postRoute / routeInventory）按名称寻址；
//! 站点级库存（preStop / postStop）按物品身份寻址，addedAmount 再回到名称维度。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::route::{ItemDisplayName, ItemIdentity, Route, RouteId, StopId};

/// 名称 → 数量
pub type NameCounts = BTreeMap<ItemDisplayName, f64>;
/// 身份 → 数量（等分后可能是小数）
pub type IdentityCounts = BTreeMap<ItemIdentity, f64>;

/// 单个站点的库存记录。None 表示尚未记录；Some(空) 表示用户明确跳过
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopInventory {
    #[serde(default)]
    pub pre_stop: Option<IdentityCounts>,
    #[serde(default)]
    pub post_stop: Option<IdentityCounts>,
    /// 本站点实际获得的数量（postStop 合计 − preStop 合计）
    #[serde(default)]
    pub added_amount: NameCounts,
    /// 已计入 routeInventory 的份额，重复提交时只补差额
    #[serde(default)]
    pub credited: NameCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventorySnapshot {
    #[serde(default)]
    pub pre_route: Option<NameCounts>,
    #[serde(default)]
    pub post_route: Option<NameCounts>,
    /// 会话开始以来的累计采集量，只增不减
    #[serde(default)]
    pub route_inventory: NameCounts,
    #[serde(default)]
    pub stops: BTreeMap<StopId, StopInventory>,
}

impl InventorySnapshot {
    pub fn stop(&self, stop_id: &str) -> Option<&StopInventory> {
        self.stops.get(stop_id)
    }

    pub fn has_pre_stop(&self, stop_id: &str) -> bool {
        self.stop(stop_id).is_some_and(|s| s.pre_stop.is_some())
    }

    pub fn has_post_stop(&self, stop_id: &str) -> bool {
        self.stop(stop_id).is_some_and(|s| s.post_stop.is_some())
    }
}

/// 库存检查点的作用域
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InventoryScope {
    PreRoute,
    PostRoute,
    PreStop(StopId),
    PostStop(StopId),
}

impl InventoryScope {
    pub fn stop_id(&self) -> Option<&str> {
        match self {
            InventoryScope::PreStop(id) | InventoryScope::PostStop(id) => Some(id),
            _ => None,
        }
    }
}

/// 库存输入完成后如何继续导航
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PendingDirection {
    /// 停留在当前站点
    Stay,
    /// 继续被挂起的 next()
    Forward,
    /// 继续被挂起的 previous()
    Backward,
    /// 重新调用 complete()
    Completing,
}

/// 挂起的库存输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingInventory {
    pub scope: InventoryScope,
    pub direction: PendingDirection,
    /// 预填值（回退进入站点时从既有记录推算）
    #[serde(default)]
    pub seed: NameCounts,
}

impl PendingInventory {
    pub fn new(scope: InventoryScope, direction: PendingDirection) -> Self {
        Self {
            scope,
            direction,
            seed: NameCounts::new(),
        }
    }

    pub fn seeded(mut self, seed: NameCounts) -> Self {
        self.seed = seed;
        self
    }
}

/// 全局至多一个的追踪会话
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingSession {
    pub route_id: RouteId,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub current_stop_index: usize,
    /// 会话开始时路线内所有物品 id，之后不增不减
    pub collected_items: BTreeMap<ItemIdentity, bool>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub inventory: InventorySnapshot,
    #[serde(default)]
    pub pending: Option<PendingInventory>,
    /// 每次持久化递增
    #[serde(default)]
    pub revision: u64,
    /// 最近一次持久化的时间；启动时据此在多个副本中选出最新的一份
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

impl TrackingSession {
    pub fn new(route: &Route) -> Self {
        let now = Utc::now();
        Self {
            route_id: route.id.clone(),
            start_time: now,
            current_stop_index: 0,
            collected_items: route.item_ids().map(|id| (id.clone(), false)).collect(),
            notes: String::new(),
            inventory: InventorySnapshot::default(),
            pending: None,
            revision: 0,
            updated_at: now,
        }
    }

    /// 写入存储前调用：递增修订号并刷新更新时间
    pub fn touch(&mut self) {
        self.revision += 1;
        self.updated_at = Utc::now().max(self.updated_at);
    }

    /// 副本比较键：更新时间优先，修订号兜底
    pub fn freshness(&self) -> (DateTime<Utc>, u64) {
        (self.updated_at, self.revision)
    }

    pub fn collected_count(&self) -> usize {
        self.collected_items.values().filter(|c| **c).count()
    }

    pub fn total_count(&self) -> usize {
        self.collected_items.len()
    }

    /// 翻转收集标记；id 不属于会话快照时返回 None
    pub fn toggle(&mut self, id: &ItemIdentity) -> Option<bool> {
        let flag = self.collected_items.get_mut(id)?;
        *flag = !*flag;
        Some(*flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Item, ItemType, Stop};

    fn route() -> Route {
        Route::new("Loop").with_id("r").with_stop(
            Stop::new("A")
                .with_id("a")
                .with_item(Item::new(ItemType::Harvestable, Some("Acid"), 1).unwrap().with_id("a1"))
                .with_item(Item::new(ItemType::Chest, None, 1).unwrap().with_id("c1")),
        )
    }

    #[test]
    fn test_new_session_seeds_all_items_false() {
        let session = TrackingSession::new(&route());
        assert_eq!(session.total_count(), 2);
        assert_eq!(session.collected_count(), 0);
        assert!(session.collected_items.values().all(|c| !c));
    }

    #[test]
    fn test_toggle_unknown_item_is_rejected() {
        let mut session = TrackingSession::new(&route());
        assert_eq!(session.toggle(&ItemIdentity::new("a1")), Some(true));
        assert_eq!(session.toggle(&ItemIdentity::new("a1")), Some(false));
        assert_eq!(session.toggle(&ItemIdentity::new("late")), None);
        assert_eq!(session.total_count(), 2);
    }

    #[test]
    fn test_touch_makes_copy_fresher() {
        let mut session = TrackingSession::new(&route());
        let stored = session.clone();
        session.touch();
        assert_eq!(session.revision, 1);
        assert!(session.freshness() > stored.freshness());
    }

    #[test]
    fn test_legacy_session_without_revision_loads() {
        let mut value = serde_json::to_value(TrackingSession::new(&route())).unwrap();
        let object = value.as_object_mut().unwrap();
        object.remove("revision");
        object.remove("updatedAt");
        let back: TrackingSession = serde_json::from_value(value).unwrap();
        assert_eq!(back.revision, 0);
        assert_eq!(back.updated_at, DateTime::<Utc>::default());
    }

    #[test]
    fn test_fractional_counts_survive_json() {
        let mut session = TrackingSession::new(&route());
        let mut pre = IdentityCounts::new();
        pre.insert(ItemIdentity::new("a1"), 10.0 / 3.0);
        session.inventory.stops.insert(
            "a".to_string(),
            StopInventory {
                pre_stop: Some(pre),
                ..Default::default()
            },
        );
        session.pending = Some(PendingInventory::new(
            InventoryScope::PostStop("a".to_string()),
            PendingDirection::Forward,
        ));
        let text = serde_json::to_string(&session).unwrap();
        let back: TrackingSession = serde_json::from_str(&text).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn test_skipped_record_differs_from_missing() {
        let mut inv = InventorySnapshot::default();
        assert!(!inv.has_pre_stop("a"));
        inv.stops.entry("a".to_string()).or_default().pre_stop = Some(IdentityCounts::new());
        assert!(inv.has_pre_stop("a"));
        assert!(!inv.has_post_stop("a"));
    }
}
