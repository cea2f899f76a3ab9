//! 会话状态机的迁移规则
//!
//! 只操作 Route + TrackingSession，不涉及存储与用户确认；Tracker 在此之上负责持久化。
//! 挂起的库存输入记录在 `session.pending` 中，导航在输入解决后按 PendingDirection 继续。

use crate::inventory::ReconciliationEngine;
use crate::model::{InventoryScope, PendingDirection, PendingInventory, Route, TrackingSession};

/// 新建会话并决定初始状态：
/// 开启自动检查且路线有可采集物 → PreRoute；否则首站需要采集 → PreStop(首站)；否则停在首站
pub fn begin(route: &Route) -> TrackingSession {
    let mut session = TrackingSession::new(route);
    if route.auto_inventory_checks && route.has_harvestables() {
        session.pending = Some(PendingInventory::new(InventoryScope::PreRoute, PendingDirection::Stay));
    } else {
        enter(route, &mut session);
    }
    session
}

/// 到达当前站点：需要采集且尚无 preStop 记录时挂起 PreStop
fn enter(route: &Route, session: &mut TrackingSession) {
    let Some(stop) = route.stops.get(session.current_stop_index) else {
        return;
    };
    if stop.wants_inventory() && !session.inventory.has_pre_stop(&stop.id) {
        session.pending = Some(PendingInventory::new(
            InventoryScope::PreStop(stop.id.clone()),
            PendingDirection::Stay,
        ));
    }
}

/// next()：离开前先补 postStop；已在末站则不动
pub fn advance(route: &Route, session: &mut TrackingSession) {
    let Some(stop) = route.stops.get(session.current_stop_index) else {
        return;
    };
    if stop.wants_inventory() && !session.inventory.has_post_stop(&stop.id) {
        session.pending = Some(PendingInventory::new(
            InventoryScope::PostStop(stop.id.clone()),
            PendingDirection::Forward,
        ));
        return;
    }
    if session.current_stop_index >= route.last_index() {
        return;
    }
    session.current_stop_index += 1;
    enter(route, session);
}

/// previous()：当前站缺 preStop 时先补；回到上一站时若其需要采集，则以既有记录预填 postStop
pub fn retreat(route: &Route, engine: &ReconciliationEngine, session: &mut TrackingSession) {
    let Some(stop) = route.stops.get(session.current_stop_index) else {
        return;
    };
    if stop.wants_inventory() && !session.inventory.has_pre_stop(&stop.id) {
        session.pending = Some(PendingInventory::new(
            InventoryScope::PreStop(stop.id.clone()),
            PendingDirection::Backward,
        ));
        return;
    }
    if session.current_stop_index == 0 {
        return;
    }
    session.current_stop_index -= 1;
    let previous = &route.stops[session.current_stop_index];
    if previous.wants_inventory() {
        let seed = engine.revisit_seed(&session.inventory, previous);
        session.pending = Some(
            PendingInventory::new(InventoryScope::PostStop(previous.id.clone()), PendingDirection::Stay)
                .seeded(seed),
        );
    }
}

/// 库存输入解决后继续被挂起的导航。返回 true 表示调用方应重新进入 complete()
pub fn resume(
    route: &Route,
    engine: &ReconciliationEngine,
    session: &mut TrackingSession,
    resolved: &InventoryScope,
    direction: PendingDirection,
) -> bool {
    match direction {
        PendingDirection::Forward => advance(route, session),
        PendingDirection::Backward => retreat(route, engine, session),
        PendingDirection::Completing => return true,
        // 开局的 PreRoute 解决后，首站仍需建立 preStop 基线
        PendingDirection::Stay if *resolved == InventoryScope::PreRoute => enter(route, session),
        PendingDirection::Stay => {}
    }
    false
}

/// complete() 是否需要先采集 postRoute
pub fn needs_post_route(route: &Route, session: &TrackingSession) -> bool {
    route.auto_inventory_checks && session.inventory.post_route.is_none() && route.has_harvestables()
}

/// 恢复会话时把站点下标限制在路线范围内
pub fn clamp_index(route: &Route, session: &mut TrackingSession) {
    if session.current_stop_index > route.last_index() {
        tracing::warn!(
            "Stored stop index {} exceeds route length, clamping",
            session.current_stop_index
        );
        session.current_stop_index = route.last_index();
    }
}
