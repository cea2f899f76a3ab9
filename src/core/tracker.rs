//! Tracker：应用上下文，持有路线目录、唯一的追踪会话与持久化网关
//!
//! 每次迁移先修改内存，再等待存储写入；存储失败只记录告警，不回滚内存状态。
//! 迁移完成后把 TrackerView 推到 watch 通道，展示层据此重绘。

use std::sync::Arc;

use tokio::sync::watch;

use super::confirm::{ConfirmGate, ConfirmRequest};
use super::error::{TrackerError, ValidationError};
use super::fsm;
use super::state::{Outcome, TrackerState, TrackerView};
use crate::inventory::{InventoryInput, NameIndex, ReconciliationEngine};
use crate::model::{
    InventoryScope, ItemIdentity, PendingDirection, PendingInventory, Route, RouteId, TrackingSession,
};
use crate::storage::{PersistenceGateway, StorageError, WriteOp};

pub struct Tracker {
    pub(crate) routes: Vec<Route>,
    pub(crate) current_route_id: Option<RouteId>,
    pub(crate) session: Option<TrackingSession>,
    pub(crate) gateway: PersistenceGateway,
    pub(crate) confirm: Arc<dyn ConfirmGate>,
    engine: ReconciliationEngine,
    view_tx: watch::Sender<TrackerView>,
    storage_warning: Option<String>,
}

pub(crate) fn find_route<'a>(routes: &'a [Route], id: &str) -> Result<&'a Route, ValidationError> {
    routes
        .iter()
        .find(|r| r.id == id)
        .ok_or_else(|| ValidationError::UnknownRoute(id.to_string()))
}

impl Tracker {
    /// 从存储恢复路线、当前路线与会话（含挂起的库存输入）
    pub async fn bootstrap(gateway: PersistenceGateway, confirm: Arc<dyn ConfirmGate>) -> Self {
        let restored = gateway.restore().await;
        let mut session = restored.session;
        if let Some(s) = session.as_mut() {
            if let Ok(route) = find_route(&restored.routes, &s.route_id) {
                fsm::clamp_index(route, s);
            }
        }

        let (view_tx, _) = watch::channel(TrackerView::default());
        let tracker = Self {
            routes: restored.routes,
            current_route_id: restored.current_route_id,
            session,
            gateway,
            confirm,
            engine: ReconciliationEngine::new(),
            view_tx,
            storage_warning: None,
        };
        tracker.publish();
        tracker
    }

    pub fn subscribe(&self) -> watch::Receiver<TrackerView> {
        self.view_tx.subscribe()
    }

    /// 最近一次发布的投影
    pub fn view(&self) -> TrackerView {
        self.view_tx.borrow().clone()
    }

    pub fn state(&self) -> TrackerState {
        TrackerState::of(self.session.as_ref())
    }

    pub fn session(&self) -> Option<&TrackingSession> {
        self.session.as_ref()
    }

    pub fn is_tracking(&self) -> bool {
        self.session.is_some()
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn route(&self, id: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.id == id)
    }

    pub fn current_route_id(&self) -> Option<&str> {
        self.current_route_id.as_deref()
    }

    pub fn current_route(&self) -> Option<&Route> {
        self.current_route_id.as_deref().and_then(|id| self.route(id))
    }

    pub fn storage_warning(&self) -> Option<&str> {
        self.storage_warning.as_deref()
    }

    /// 活动会话所属路线中某作用域的可采集物分组
    pub fn snapshot(&self, scope: &InventoryScope) -> Result<NameIndex, TrackerError> {
        let session = self.session.as_ref().ok_or(ValidationError::NoActiveSession)?;
        let route = find_route(&self.routes, &session.route_id)?;
        Ok(self.engine.snapshot(route, scope)?)
    }

    /// 开始追踪。同一路线已有会话时原样恢复；其他路线有会话时返回 SessionConflict
    pub async fn start(&mut self, route_id: &str) -> Result<TrackerState, TrackerError> {
        if let Some(active) = &self.session {
            if active.route_id == route_id {
                tracing::info!("Resuming tracking session for route {}", route_id);
                return Ok(self.state());
            }
            return Err(ValidationError::SessionConflict {
                active: active.route_id.clone(),
                requested: route_id.to_string(),
            }
            .into());
        }

        let route = find_route(&self.routes, route_id)?;
        if route.stops.is_empty() {
            return Err(ValidationError::EmptyRoute(route_id.to_string()).into());
        }
        let session = fsm::begin(route);
        tracing::info!(
            "Started tracking route '{}' ({} stops, {} items)",
            route.name,
            route.stops.len(),
            session.total_count()
        );
        self.session = Some(session);

        if self.current_route_id.as_deref() != Some(route_id) {
            self.current_route_id = Some(route_id.to_string());
            self.save_pointer().await;
        }
        self.persist_session().await;
        self.publish();
        Ok(self.state())
    }

    /// 翻转物品收集标记，返回新值；不改变状态机状态
    pub async fn toggle_collected(&mut self, item_id: &ItemIdentity) -> Result<bool, TrackerError> {
        let session = self.session.as_mut().ok_or(ValidationError::NoActiveSession)?;
        let collected = session
            .toggle(item_id)
            .ok_or_else(|| ValidationError::UnknownItem(item_id.clone()))?;
        self.persist_session().await;
        self.publish();
        Ok(collected)
    }

    pub async fn set_notes(&mut self, notes: &str) -> Result<(), TrackerError> {
        let session = self.session.as_mut().ok_or(ValidationError::NoActiveSession)?;
        session.notes = notes.to_string();
        self.persist_session().await;
        self.publish();
        Ok(())
    }

    pub async fn next(&mut self) -> Result<TrackerState, TrackerError> {
        let (route, session) = self.navigable()?;
        fsm::advance(route, session);
        self.persist_session().await;
        self.publish();
        Ok(self.state())
    }

    pub async fn previous(&mut self) -> Result<TrackerState, TrackerError> {
        let engine = self.engine;
        let (route, session) = self.navigable()?;
        fsm::retreat(route, &engine, session);
        self.persist_session().await;
        self.publish();
        Ok(self.state())
    }

    /// 提交挂起作用域的库存输入，然后按挂起方向继续导航
    pub async fn submit_inventory(&mut self, values: InventoryInput) -> Result<Outcome, TrackerError> {
        self.resolve_inventory(Some(&values)).await
    }

    /// 跳过挂起作用域：记录显式空结果后同样继续导航
    pub async fn skip_inventory(&mut self) -> Result<Outcome, TrackerError> {
        self.resolve_inventory(None).await
    }

    async fn resolve_inventory(&mut self, values: Option<&InventoryInput>) -> Result<Outcome, TrackerError> {
        let engine = self.engine;
        let (route, session) = self.active_parts()?;
        let pending = session
            .pending
            .clone()
            .ok_or(ValidationError::NotAwaitingInventory)?;

        match values {
            Some(values) => engine.record(route, &mut session.inventory, &pending.scope, values)?,
            None => {
                engine.skip(route, &mut session.inventory, &pending.scope)?;
                tracing::info!("Inventory check {:?} skipped", pending.scope);
            }
        }
        session.pending = None;
        let completing = fsm::resume(route, &engine, session, &pending.scope, pending.direction);

        self.persist_session().await;
        if completing {
            return self.complete().await;
        }
        self.publish();
        Ok(Outcome::Applied(self.state()))
    }

    /// 完成本次运行：需要 postRoute 时先挂起采集；否则确认后累加 completedRuns 并销毁会话
    pub async fn complete(&mut self) -> Result<Outcome, TrackerError> {
        let (route, session) = self.active_parts()?;
        if fsm::needs_post_route(route, session) {
            session.pending = Some(PendingInventory::new(
                InventoryScope::PostRoute,
                PendingDirection::Completing,
            ));
            self.persist_session().await;
            self.publish();
            return Ok(Outcome::Applied(self.state()));
        }

        let request = ConfirmRequest::CompleteRun {
            route_name: route.name.clone(),
            collected: session.collected_count(),
            total: session.total_count(),
        };
        let route_id = route.id.clone();
        if !self.confirm.confirm(&request).await {
            tracing::info!("Completion of route {} declined", route_id);
            self.publish();
            return Ok(Outcome::Declined(self.state()));
        }

        self.session = None;
        let runs = match self.routes.iter_mut().find(|r| r.id == route_id) {
            Some(route) => {
                route.completed_runs += 1;
                route.completed_runs
            }
            None => 0,
        };
        self.save_route(&route_id).await;
        self.clear_stored_session().await;
        tracing::info!("Completed run #{} of route {}", runs, route_id);
        self.publish();
        Ok(Outcome::Applied(TrackerState::Idle))
    }

    /// 取消会话：确认后销毁会话（路线不变），并从两个后端删除。无会话时直接清理存储
    pub async fn cancel(&mut self) -> Result<Outcome, TrackerError> {
        if let Some(session) = &self.session {
            let route_name = self
                .route(&session.route_id)
                .map(|r| r.name.clone())
                .unwrap_or_else(|| session.route_id.clone());
            let request = ConfirmRequest::CancelRun { route_name };
            if !self.confirm.confirm(&request).await {
                tracing::info!("Cancellation declined");
                self.publish();
                return Ok(Outcome::Declined(self.state()));
            }
            tracing::info!("Cancelled tracking session for route {}", session.route_id);
        }

        self.session = None;
        self.clear_stored_session().await;
        self.publish();
        Ok(Outcome::Applied(TrackerState::Idle))
    }

    fn active_parts(&mut self) -> Result<(&Route, &mut TrackingSession), ValidationError> {
        let session = self.session.as_mut().ok_or(ValidationError::NoActiveSession)?;
        let route = find_route(&self.routes, &session.route_id)?;
        Ok((route, session))
    }

    /// 导航前提：有会话且没有挂起的库存输入
    fn navigable(&mut self) -> Result<(&Route, &mut TrackingSession), ValidationError> {
        let (route, session) = self.active_parts()?;
        if session.pending.is_some() {
            return Err(ValidationError::InventoryPending);
        }
        Ok((route, session))
    }

    pub(crate) async fn persist_session(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return self.clear_stored_session().await;
        };
        session.touch();
        let result = self.gateway.write(WriteOp::PutSession(session)).await;
        self.absorb(result);
    }

    /// 只删掉一个后端时保留网关给出的告警
    async fn clear_stored_session(&mut self) {
        match self.gateway.clear_session().await {
            Ok(Some(warning)) => self.storage_warning = Some(warning),
            Ok(None) => self.absorb(Ok(())),
            Err(e) => self.absorb(Err(e)),
        }
    }

    pub(crate) async fn save_route(&mut self, route_id: &str) {
        let Some(route) = self.routes.iter().find(|r| r.id == route_id) else {
            return;
        };
        let result = self.gateway.write(WriteOp::PutRoute(route)).await;
        self.absorb(result);
    }

    pub(crate) async fn save_pointer(&mut self) {
        let result = self
            .gateway
            .write(WriteOp::SetCurrentRoute(self.current_route_id.as_deref()))
            .await;
        self.absorb(result);
    }

    /// 存储结果只影响告警：两个后端都失败时提示“仅保存在内存中”，之后任一次成功写入清除告警
    pub(crate) fn absorb(&mut self, result: Result<(), StorageError>) {
        match result {
            Ok(()) => self.storage_warning = None,
            Err(e) => {
                tracing::warn!("Storage write failed, keeping state in memory: {}", e);
                self.storage_warning = Some(format!("Changes are only kept in memory: {}", e));
            }
        }
    }

    pub(crate) fn publish(&self) {
        let route = match &self.session {
            Some(s) => self.route(&s.route_id),
            None => self.current_route(),
        };
        let view = TrackerView::project(route, self.session.as_ref(), self.storage_warning.clone());
        self.view_tx.send_replace(view);
    }
}
