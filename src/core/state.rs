//! 状态定义：TrackerState 与展示层投影 TrackerView
//!
//! UI 只持有轻量的 TrackerView；完整会话由 Tracker 维护并在每次迁移后投影出来。

use serde::Serialize;

use crate::inventory::NameIndex;
use crate::model::{
    InventoryScope, ItemDisplayName, ItemIdentity, PendingDirection, Route, RouteId, TrackingSession,
};

/// 状态机当前状态
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum TrackerState {
    #[default]
    Idle,
    AtStop {
        index: usize,
    },
    AwaitingInventory {
        scope: InventoryScope,
        direction: PendingDirection,
    },
}

impl TrackerState {
    /// 从会话推导状态：无会话为 Idle；有挂起输入为 AwaitingInventory；否则停在当前站点
    pub fn of(session: Option<&TrackingSession>) -> Self {
        match session {
            None => TrackerState::Idle,
            Some(s) => match &s.pending {
                Some(p) => TrackerState::AwaitingInventory {
                    scope: p.scope.clone(),
                    direction: p.direction,
                },
                None => TrackerState::AtStop {
                    index: s.current_stop_index,
                },
            },
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, TrackerState::Idle)
    }

    pub fn awaiting(&self) -> Option<&InventoryScope> {
        match self {
            TrackerState::AwaitingInventory { scope, .. } => Some(scope),
            _ => None,
        }
    }
}

/// 需要确认的操作的结果：确认后执行，或被用户拒绝（状态不变）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied(TrackerState),
    Declined(TrackerState),
}

impl Outcome {
    pub fn state(&self) -> &TrackerState {
        match self {
            Outcome::Applied(state) | Outcome::Declined(state) => state,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }
}

/// 挂起输入中的一个名称分组
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingGroup {
    pub name: ItemDisplayName,
    /// 同名实例数（输入值将在这些实例间等分）
    pub instances: usize,
    /// 预填值
    pub seed: f64,
}

/// 当前站点的物品行
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopItemView {
    pub id: ItemIdentity,
    pub name: String,
    pub kind: &'static str,
    pub quantity: u32,
    pub collected: bool,
}

/// 路线级库存行
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryRow {
    pub name: ItemDisplayName,
    pub pre: Option<f64>,
    pub post: Option<f64>,
    pub diff: Option<f64>,
    /// routeInventory 累计值
    pub gathered: f64,
}

/// 展示层投影，轻量且易于渲染
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackerView {
    pub state: TrackerState,
    pub route_id: Option<RouteId>,
    pub route_name: Option<String>,
    pub stop_name: Option<String>,
    /// (当前下标, 站点总数)
    pub stop_position: Option<(usize, usize)>,
    pub stop_items: Vec<StopItemView>,
    pub collected: usize,
    pub total: usize,
    pub pending: Vec<PendingGroup>,
    pub rows: Vec<InventoryRow>,
    pub notes: String,
    pub storage_warning: Option<String>,
}

impl TrackerView {
    /// 由当前路线与会话生成投影；会话存在时 route 应为会话所属路线
    pub fn project(
        route: Option<&Route>,
        session: Option<&TrackingSession>,
        storage_warning: Option<String>,
    ) -> Self {
        let mut view = TrackerView {
            state: TrackerState::of(session),
            route_id: route.map(|r| r.id.clone()),
            route_name: route.map(|r| r.name.clone()),
            storage_warning,
            ..Default::default()
        };
        let (Some(route), Some(session)) = (route, session) else {
            return view;
        };

        view.collected = session.collected_count();
        view.total = session.total_count();
        view.notes = session.notes.clone();

        if let Some(stop) = route.stops.get(session.current_stop_index) {
            view.stop_name = Some(stop.name.clone());
            view.stop_position = Some((session.current_stop_index, route.stops.len()));
            view.stop_items = stop
                .items
                .iter()
                .map(|item| StopItemView {
                    id: item.id.clone(),
                    name: item.name.to_string(),
                    kind: item.item_type.label(),
                    quantity: item.quantity,
                    collected: session.collected_items.get(&item.id).copied().unwrap_or(false),
                })
                .collect();
        }

        if let Some(pending) = &session.pending {
            let index = match pending.scope.stop_id() {
                Some(id) => route.stop(id).map(NameIndex::for_stop).unwrap_or_default(),
                None => NameIndex::for_route(route),
            };
            view.pending = index
                .iter()
                .map(|(name, instances)| PendingGroup {
                    name: name.clone(),
                    instances: instances.len(),
                    seed: pending.seed.get(name).copied().unwrap_or(0.0),
                })
                .collect();
        }

        let inventory = &session.inventory;
        view.rows = NameIndex::for_route(route)
            .names()
            .map(|name| {
                let pre = inventory.pre_route.as_ref().and_then(|c| c.get(name)).copied();
                let post = inventory.post_route.as_ref().and_then(|c| c.get(name)).copied();
                InventoryRow {
                    name: name.clone(),
                    pre,
                    post,
                    diff: pre.zip(post).map(|(pre, post)| post - pre),
                    gathered: inventory.route_inventory.get(name).copied().unwrap_or(0.0),
                }
            })
            .collect();

        view
    }
}
