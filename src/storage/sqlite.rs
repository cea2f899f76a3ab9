//! SQLite 主存储
//!
//! 每条路线、当前路线指针与活动会话都以 JSON 文本存放在独立的表中。
//! 连接由 tokio Mutex 串行化；调用是同步的，持锁期间不跨越 await。

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use super::{RouteStore, StorageError, WriteOp};
use crate::model::{Route, RouteId, TrackingSession};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// 打开（或创建）数据库文件；父目录不存在时自动创建
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        init_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// 直接追加一条会话行，不清理已有行（模拟历史遗留的多会话数据）
    #[cfg(test)]
    pub(crate) async fn insert_raw_session(&self, session: &TrackingSession) -> Result<(), StorageError> {
        let data = serde_json::to_string(session)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO active_session (route_id, data, updated_at) VALUES (?1, ?2, ?3)",
            params![session.route_id, data, Utc::now()],
        )?;
        Ok(())
    }
}

fn init_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS routes (
            id TEXT PRIMARY KEY,
            position INTEGER NOT NULL,
            data TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS current_route (
            slot INTEGER PRIMARY KEY CHECK (slot = 0),
            route_id TEXT
        );
        CREATE TABLE IF NOT EXISTS active_session (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            route_id TEXT NOT NULL,
            data TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS session_marker (
            slot INTEGER PRIMARY KEY CHECK (slot = 0),
            cleared_at TEXT NOT NULL
        );",
    )
}

/// 新路线追加在末尾；已存在的路线保持原位置
fn upsert_route(conn: &Connection, route: &Route) -> Result<(), StorageError> {
    let data = serde_json::to_string(route)?;
    conn.execute(
        "INSERT INTO routes (id, position, data, updated_at)
         VALUES (?1, (SELECT COALESCE(MAX(position) + 1, 0) FROM routes), ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
        params![route.id, data, Utc::now()],
    )?;
    Ok(())
}

#[async_trait]
impl RouteStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn load_routes(&self) -> Result<Vec<Route>, StorageError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT id, data FROM routes ORDER BY position ASC")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        let mut routes = Vec::new();
        for row in rows {
            let (id, data) = row?;
            match serde_json::from_str::<Route>(&data) {
                Ok(route) => routes.push(route),
                Err(e) => tracing::warn!("Skipping unreadable route row {}: {}", id, e),
            }
        }
        Ok(routes)
    }

    async fn load_current_route(&self) -> Result<Option<RouteId>, StorageError> {
        let conn = self.conn.lock().await;
        let id: Option<Option<String>> = conn
            .query_row("SELECT route_id FROM current_route WHERE slot = 0", [], |row| row.get(0))
            .optional()?;
        Ok(id.flatten())
    }

    async fn load_sessions(&self) -> Result<Vec<TrackingSession>, StorageError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT id, data FROM active_session ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;

        let mut sessions = Vec::new();
        for row in rows {
            let (id, data) = row?;
            match serde_json::from_str::<TrackingSession>(&data) {
                Ok(session) => sessions.push(session),
                Err(e) => tracing::warn!("Skipping unreadable session row {}: {}", id, e),
            }
        }
        Ok(sessions)
    }

    async fn load_session_cleared_at(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        let conn = self.conn.lock().await;
        let at = conn
            .query_row("SELECT cleared_at FROM session_marker WHERE slot = 0", [], |row| row.get(0))
            .optional()?;
        Ok(at)
    }

    async fn apply(&self, op: WriteOp<'_>) -> Result<(), StorageError> {
        let mut conn = self.conn.lock().await;
        match op {
            WriteOp::PutRoute(route) => upsert_route(&conn, route)?,
            WriteOp::ReplaceRoutes(routes) => {
                let now = Utc::now();
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM routes", [])?;
                for (position, route) in routes.iter().enumerate() {
                    let data = serde_json::to_string(route)?;
                    tx.execute(
                        "INSERT INTO routes (id, position, data, updated_at) VALUES (?1, ?2, ?3, ?4)",
                        params![route.id, position as i64, data, now],
                    )?;
                }
                tx.commit()?;
            }
            WriteOp::DeleteRoute(id) => {
                conn.execute("DELETE FROM routes WHERE id = ?1", params![id])?;
            }
            WriteOp::SetCurrentRoute(id) => {
                conn.execute(
                    "INSERT INTO current_route (slot, route_id) VALUES (0, ?1)
                     ON CONFLICT(slot) DO UPDATE SET route_id = excluded.route_id",
                    params![id],
                )?;
            }
            WriteOp::PutSession(session) => {
                let data = serde_json::to_string(session)?;
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM active_session", [])?;
                tx.execute(
                    "INSERT INTO active_session (route_id, data, updated_at) VALUES (?1, ?2, ?3)",
                    params![session.route_id, data, Utc::now()],
                )?;
                tx.commit()?;
            }
            WriteOp::ClearSession => {
                conn.execute("DELETE FROM active_session", [])?;
            }
            WriteOp::MarkSessionCleared(at) => {
                conn.execute(
                    "INSERT INTO session_marker (slot, cleared_at) VALUES (0, ?1)
                     ON CONFLICT(slot) DO UPDATE SET cleared_at = excluded.cleared_at",
                    params![at],
                )?;
            }
        }
        Ok(())
    }
}
