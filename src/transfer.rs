//! 导出 / 导入：路线目录的 JSON 快照文档
//!
//! 导入只校验 `routes` 存在且为数组；文档中的 activeSession 仅作记录，不会恢复。

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{ConfirmRequest, DataFormatError, Outcome, Tracker, TrackerError, ValidationError};
use crate::model::{Route, RouteId, TrackingSession};
use crate::storage::WriteOp;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub routes: Vec<Route>,
    #[serde(default)]
    pub current_route_id: Option<RouteId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_session: Option<TrackingSession>,
    pub version: String,
    pub export_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// 按 id 合并：已有的更新，新的追加
    Merge,
    /// 整体替换（需确认）
    Replace,
}

impl std::str::FromStr for ImportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "merge" => Ok(ImportMode::Merge),
            "replace" => Ok(ImportMode::Replace),
            other => Err(format!("unknown import mode: {other}")),
        }
    }
}

/// 校验后的导入内容
#[derive(Debug, Clone, PartialEq)]
pub struct ImportPayload {
    pub routes: Vec<Route>,
    pub current_route_id: Option<RouteId>,
}

/// 按 id 合并：已存在的原位更新，新的追加到末尾
pub fn merge_routes(existing: &mut Vec<Route>, incoming: Vec<Route>) {
    for route in incoming {
        match existing.iter_mut().find(|r| r.id == route.id) {
            Some(slot) => *slot = route,
            None => existing.push(route),
        }
    }
}

/// 解析并校验导入文档；文档内重复的路线 id 以后出现的为准
pub fn parse_import(text: &str) -> Result<ImportPayload, DataFormatError> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(DataFormatError::InvalidJson)?;
    let routes = value.get("routes").ok_or(DataFormatError::MissingRoutes)?;
    if !routes.is_array() {
        return Err(DataFormatError::RoutesNotArray);
    }
    let incoming: Vec<Route> =
        serde_json::from_value(routes.clone()).map_err(DataFormatError::InvalidRoutes)?;

    let mut deduped = Vec::with_capacity(incoming.len());
    merge_routes(&mut deduped, incoming);
    let current_route_id = value
        .get("currentRouteId")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    Ok(ImportPayload {
        routes: deduped,
        current_route_id,
    })
}

impl Tracker {
    pub fn export_document(&self) -> ExportDocument {
        ExportDocument {
            routes: self.routes.clone(),
            current_route_id: self.current_route_id.clone(),
            active_session: self.session.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            export_date: Utc::now(),
        }
    }

    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.export_document())
    }

    pub async fn export_to(&self, path: impl AsRef<Path>) -> Result<(), TrackerError> {
        let text = self.export_json().map_err(std::io::Error::from)?;
        tokio::fs::write(path.as_ref(), text).await?;
        tracing::info!("Exported {} routes to {:?}", self.routes.len(), path.as_ref());
        Ok(())
    }

    /// 导入路线。会话进行中被拒绝；格式错误时不修改任何路线
    pub async fn import(&mut self, text: &str, mode: ImportMode) -> Result<Outcome, TrackerError> {
        if self.session.is_some() {
            return Err(ValidationError::CatalogLocked.into());
        }
        let payload = parse_import(text)?;

        match mode {
            ImportMode::Merge => merge_routes(&mut self.routes, payload.routes),
            ImportMode::Replace => {
                if !self.routes.is_empty() {
                    let request = ConfirmRequest::ReplaceAllRoutes {
                        incoming: payload.routes.len(),
                        existing: self.routes.len(),
                    };
                    if !self.confirm.confirm(&request).await {
                        return Ok(Outcome::Declined(self.state()));
                    }
                }
                self.routes = payload.routes;
            }
        }
        let result = self.gateway.write(WriteOp::ReplaceRoutes(&self.routes)).await;
        self.absorb(result);

        let pointer = self.current_route_id.clone();
        if self.current_route().is_none() {
            let imported = payload
                .current_route_id
                .filter(|id| self.routes.iter().any(|r| &r.id == id));
            self.current_route_id = match (imported, self.routes.as_slice()) {
                (Some(id), _) => Some(id),
                (None, [only]) => Some(only.id.clone()),
                (None, _) => None,
            };
        }
        if self.current_route_id != pointer {
            self.save_pointer().await;
        }

        tracing::info!("Imported routes ({:?}), catalog now has {}", mode, self.routes.len());
        self.publish();
        Ok(Outcome::Applied(self.state()))
    }

    pub async fn import_from(&mut self, path: impl AsRef<Path>, mode: ImportMode) -> Result<Outcome, TrackerError> {
        let text = tokio::fs::read_to_string(path.as_ref()).await?;
        self.import(&text, mode).await
    }
}
