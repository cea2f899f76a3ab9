//! 追踪流程集成测试：真实 SQLite + 平面文件后端，含重启恢复

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use farmtrack::core::{Outcome, StaticConfirm, Tracker, TrackerState};
    use farmtrack::inventory::InventoryInput;
    use farmtrack::model::{InventoryScope, ItemDisplayName, ItemType, PendingDirection};
    use farmtrack::storage::{FlatFileStore, PersistenceGateway, RouteStore, SqliteStore};
    use tempfile::TempDir;

    fn gateway(dir: &TempDir) -> (PersistenceGateway, Arc<SqliteStore>, Arc<FlatFileStore>) {
        let sqlite = Arc::new(SqliteStore::open(dir.path().join("farm.db")).unwrap());
        let flat = Arc::new(FlatFileStore::new(dir.path().join("fallback")));
        (PersistenceGateway::new(sqlite.clone(), flat.clone()), sqlite, flat)
    }

    fn acid(count: u32) -> InventoryInput {
        InventoryInput::from([(ItemDisplayName::new("Acid"), count)])
    }

    #[tokio::test]
    async fn test_full_run_survives_restart() {
        let dir = TempDir::new().unwrap();
        let gate = Arc::new(StaticConfirm::accepting());

        let route_id = {
            let (gw, _, _) = gateway(&dir);
            let mut tracker = Tracker::bootstrap(gw, gate.clone()).await;
            let route_id = tracker.create_route("Swamp", "").await.unwrap();
            let ferry = tracker.add_stop(&route_id, "Ferry", true).await.unwrap();
            let mill = tracker.add_stop(&route_id, "Mill", false).await.unwrap();
            for _ in 0..2 {
                tracker
                    .add_item(&route_id, &ferry, ItemType::Harvestable, Some("Acid"), 1)
                    .await
                    .unwrap();
            }
            tracker.add_item(&route_id, &mill, ItemType::Chest, None, 1).await.unwrap();

            tracker.start(&route_id).await.unwrap();
            tracker.submit_inventory(acid(10)).await.unwrap();
            let state = tracker.next().await.unwrap();
            assert!(matches!(
                state,
                TrackerState::AwaitingInventory {
                    direction: PendingDirection::Forward,
                    ..
                }
            ));
            route_id
        };

        // 重启：挂起的 postStop 输入应原样恢复
        let (gw, sqlite, flat) = gateway(&dir);
        let mut tracker = Tracker::bootstrap(gw, gate.clone()).await;
        assert_eq!(tracker.current_route_id(), Some(route_id.as_str()));
        let ferry_id = tracker.route(&route_id).unwrap().stops[0].id.clone();
        assert_eq!(
            tracker.state(),
            TrackerState::AwaitingInventory {
                scope: InventoryScope::PostStop(ferry_id),
                direction: PendingDirection::Forward,
            }
        );

        let outcome = tracker.submit_inventory(acid(14)).await.unwrap();
        assert_eq!(outcome, Outcome::Applied(TrackerState::AtStop { index: 1 }));
        let gathered = tracker.view().rows[0].gathered;
        assert_eq!(gathered, 4.0);

        let outcome = tracker.complete().await.unwrap();
        assert_eq!(outcome, Outcome::Applied(TrackerState::Idle));
        assert_eq!(gate.asked(), 1);

        assert!(sqlite.load_sessions().await.unwrap().is_empty());
        assert!(flat.load_sessions().await.unwrap().is_empty());
        assert_eq!(sqlite.load_routes().await.unwrap()[0].completed_runs, 1);
        assert_eq!(flat.load_routes().await.unwrap()[0].completed_runs, 1);
    }

    #[tokio::test]
    async fn test_fallback_carries_state_when_sqlite_is_gone() {
        let dir = TempDir::new().unwrap();
        let gate = Arc::new(StaticConfirm::accepting());
        {
            let (gw, _, _) = gateway(&dir);
            let mut tracker = Tracker::bootstrap(gw, gate.clone()).await;
            let route_id = tracker.create_route("Caves", "").await.unwrap();
            tracker.add_stop(&route_id, "Entrance", false).await.unwrap();
            tracker.start(&route_id).await.unwrap();
            tracker.set_notes("torch").await.unwrap();
        }

        std::fs::remove_file(dir.path().join("farm.db")).unwrap();
        let (gw, _, _) = gateway(&dir);
        let tracker = Tracker::bootstrap(gw, gate).await;
        assert_eq!(tracker.routes().len(), 1);
        assert_eq!(tracker.session().map(|s| s.notes.as_str()), Some("torch"));
    }
}
