//! 路线目录编辑：建路线、加站点/物品、排序、选择与删除
//!
//! 会话进行中目录被冻结，所有编辑返回 CatalogLocked。每次修改都经网关写入。

use super::confirm::ConfirmRequest;
use super::error::{TrackerError, ValidationError};
use super::state::{Outcome, TrackerState};
use super::tracker::{find_route, Tracker};
use crate::model::{Item, ItemIdentity, ItemType, Route, RouteId, Stop, StopId};
use crate::storage::WriteOp;

impl Tracker {
    fn ensure_unlocked(&self) -> Result<(), ValidationError> {
        if self.session.is_some() {
            return Err(ValidationError::CatalogLocked);
        }
        Ok(())
    }

    fn route_mut(&mut self, route_id: &str) -> Result<&mut Route, ValidationError> {
        self.routes
            .iter_mut()
            .find(|r| r.id == route_id)
            .ok_or_else(|| ValidationError::UnknownRoute(route_id.to_string()))
    }

    /// 新建路线；没有当前路线时自动选中
    pub async fn create_route(&mut self, name: &str, description: &str) -> Result<RouteId, TrackerError> {
        self.ensure_unlocked()?;
        let mut route = Route::new(name.trim());
        route.description = description.trim().to_string();
        let id = route.id.clone();
        self.routes.push(route);
        self.save_route(&id).await;

        if self.current_route().is_none() {
            self.current_route_id = Some(id.clone());
            self.save_pointer().await;
        }
        tracing::info!("Created route {} ({})", name.trim(), id);
        self.publish();
        Ok(id)
    }

    pub async fn add_stop(&mut self, route_id: &str, name: &str, collect_data: bool) -> Result<StopId, TrackerError> {
        self.ensure_unlocked()?;
        let stop = Stop::new(name.trim()).collecting(collect_data);
        let stop_id = stop.id.clone();
        self.route_mut(route_id)?.stops.push(stop);
        self.save_route(route_id).await;
        self.publish();
        Ok(stop_id)
    }

    /// 向站点添加物品；自定义、资源、可采集物必须有名称
    pub async fn add_item(
        &mut self,
        route_id: &str,
        stop_id: &str,
        item_type: ItemType,
        name: Option<&str>,
        quantity: u32,
    ) -> Result<ItemIdentity, TrackerError> {
        self.ensure_unlocked()?;
        let item = Item::new(item_type, name, quantity)?;
        let item_id = item.id.clone();
        let stop = self
            .route_mut(route_id)?
            .stop_mut(stop_id)
            .ok_or_else(|| ValidationError::UnknownStop(stop_id.to_string()))?;
        stop.items.push(item);
        self.save_route(route_id).await;
        self.publish();
        Ok(item_id)
    }

    pub async fn set_auto_inventory_checks(&mut self, route_id: &str, enabled: bool) -> Result<(), TrackerError> {
        self.ensure_unlocked()?;
        self.route_mut(route_id)?.auto_inventory_checks = enabled;
        self.save_route(route_id).await;
        self.publish();
        Ok(())
    }

    /// 把站点从 from 移到 to（0 起始）
    pub async fn move_stop(&mut self, route_id: &str, from: usize, to: usize) -> Result<(), TrackerError> {
        self.ensure_unlocked()?;
        let route = self.route_mut(route_id)?;
        let len = route.stops.len();
        for index in [from, to] {
            if index >= len {
                return Err(ValidationError::StopOutOfRange { index, len }.into());
            }
        }
        let stop = route.stops.remove(from);
        route.stops.insert(to, stop);
        self.save_route(route_id).await;
        self.publish();
        Ok(())
    }

    pub async fn select_route(&mut self, route_id: &str) -> Result<(), TrackerError> {
        self.ensure_unlocked()?;
        find_route(&self.routes, route_id)?;
        self.current_route_id = Some(route_id.to_string());
        self.save_pointer().await;
        self.publish();
        Ok(())
    }

    /// 删除路线（需确认）。删除当前路线时，若只剩一条路线则自动选中它
    pub async fn delete_route(&mut self, route_id: &str) -> Result<Outcome, TrackerError> {
        self.ensure_unlocked()?;
        let route_name = find_route(&self.routes, route_id)?.name.clone();
        let request = ConfirmRequest::DeleteRoute { route_name };
        if !self.confirm.confirm(&request).await {
            return Ok(Outcome::Declined(TrackerState::Idle));
        }

        self.routes.retain(|r| r.id != route_id);
        let result = self.gateway.write(WriteOp::DeleteRoute(route_id)).await;
        self.absorb(result);

        if self.current_route().is_none() {
            self.current_route_id = match self.routes.as_slice() {
                [only] => Some(only.id.clone()),
                _ => None,
            };
            self.save_pointer().await;
        }
        tracing::info!("Deleted route {}", route_id);
        self.publish();
        Ok(Outcome::Applied(TrackerState::Idle))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::StaticConfirm;
    use crate::storage::{MemoryStore, PersistenceGateway, RouteStore};

    async fn empty_tracker(gate: Arc<StaticConfirm>) -> (Tracker, Arc<MemoryStore>) {
        let primary = Arc::new(MemoryStore::new("primary"));
        let fallback = Arc::new(MemoryStore::new("fallback"));
        let gateway = PersistenceGateway::new(primary.clone(), fallback);
        (Tracker::bootstrap(gateway, gate).await, primary)
    }

    #[tokio::test]
    async fn test_authoring_builds_and_persists_route() {
        let (mut t, primary) = empty_tracker(Arc::new(StaticConfirm::accepting())).await;
        let route_id = t.create_route(" Swamp loop ", "north side").await.unwrap();
        assert_eq!(t.current_route_id(), Some(route_id.as_str()));

        let stop_id = t.add_stop(&route_id, "Ferry", true).await.unwrap();
        t.add_item(&route_id, &stop_id, ItemType::Harvestable, Some("Acid"), 5)
            .await
            .unwrap();
        t.add_item(&route_id, &stop_id, ItemType::Chest, None, 1).await.unwrap();
        t.set_auto_inventory_checks(&route_id, true).await.unwrap();

        let stored = primary.load_routes().await.unwrap();
        assert_eq!(stored.len(), 1);
        let route = &stored[0];
        assert_eq!(route.name, "Swamp loop");
        assert!(route.auto_inventory_checks);
        let items = &route.stops[0].items;
        assert_eq!(items[0].quantity, 1);
        assert_eq!(items[1].name.as_str(), "Chest");
        assert_eq!(primary.load_current_route().await.unwrap(), Some(route_id));
    }

    #[tokio::test]
    async fn test_harvestable_needs_a_name() {
        let (mut t, _) = empty_tracker(Arc::new(StaticConfirm::accepting())).await;
        let route_id = t.create_route("R", "").await.unwrap();
        let stop_id = t.add_stop(&route_id, "A", false).await.unwrap();
        let err = t
            .add_item(&route_id, &stop_id, ItemType::Harvestable, Some("  "), 1)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TrackerError::Validation(ValidationError::MissingItemName(_))
        ));
        assert!(t.route(&route_id).unwrap().stops[0].items.is_empty());
    }

    #[tokio::test]
    async fn test_catalog_is_locked_during_session() {
        let (mut t, _) = empty_tracker(Arc::new(StaticConfirm::accepting())).await;
        let route_id = t.create_route("R", "").await.unwrap();
        t.add_stop(&route_id, "A", false).await.unwrap();
        t.start(&route_id).await.unwrap();

        let err = t.add_stop(&route_id, "B", false).await.unwrap_err();
        assert!(matches!(err, TrackerError::Validation(ValidationError::CatalogLocked)));
        assert!(t.delete_route(&route_id).await.is_err());
        assert!(t.create_route("Other", "").await.is_err());
        assert_eq!(t.routes().len(), 1);
    }

    #[tokio::test]
    async fn test_move_stop_reorders() {
        let (mut t, _) = empty_tracker(Arc::new(StaticConfirm::accepting())).await;
        let route_id = t.create_route("R", "").await.unwrap();
        for name in ["A", "B", "C"] {
            t.add_stop(&route_id, name, false).await.unwrap();
        }
        t.move_stop(&route_id, 2, 0).await.unwrap();
        let names: Vec<_> = t.route(&route_id).unwrap().stops.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["C", "A", "B"]);
        assert!(matches!(
            t.move_stop(&route_id, 0, 3).await,
            Err(TrackerError::Validation(ValidationError::StopOutOfRange { index: 3, len: 3 }))
        ));
    }

    #[tokio::test]
    async fn test_delete_route_requires_confirmation() {
        let gate = Arc::new(StaticConfirm::declining());
        let (mut t, primary) = empty_tracker(gate.clone()).await;
        let first = t.create_route("First", "").await.unwrap();
        let second = t.create_route("Second", "").await.unwrap();
        t.select_route(&second).await.unwrap();

        assert!(!t.delete_route(&second).await.unwrap().is_applied());
        assert_eq!(t.routes().len(), 2);

        gate.set_answer(true);
        assert!(t.delete_route(&second).await.unwrap().is_applied());
        assert_eq!(t.routes().len(), 1);
        assert_eq!(t.current_route_id(), Some(first.as_str()));
        assert_eq!(primary.load_routes().await.unwrap().len(), 1);
        assert_eq!(gate.asked(), 2);
    }
}
