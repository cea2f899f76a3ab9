//! 路线定义：Route → Stop → Item
//!
//! 物品有两种寻址方式：身份（ItemIdentity，路线内唯一）与显示名（ItemDisplayName，可重复）。
//! 同名的采集物可以出现在多个站点，甚至同一站点的多个位置。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::ValidationError;

pub type RouteId = String;
pub type StopId = String;

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 物品身份（存储侧的键）
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemIdentity(String);

impl ItemIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(new_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemIdentity {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// 物品显示名（用户输入库存时使用的键）
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemDisplayName(String);

impl ItemDisplayName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemDisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemDisplayName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// 物品类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    /// 自定义物品，必须命名
    Custom,
    /// 宝箱，未命名时以类型名作为名称
    Chest,
    /// 带数量的资源
    Resource,
    /// 可采集物，参与库存对账
    Harvestable,
}

impl ItemType {
    pub fn label(&self) -> &'static str {
        match self {
            ItemType::Custom => "custom",
            ItemType::Chest => "chest",
            ItemType::Resource => "resource",
            ItemType::Harvestable => "harvestable",
        }
    }

    /// 未命名时使用的默认名称；None 表示必须显式命名
    pub fn default_name(&self) -> Option<&'static str> {
        match self {
            ItemType::Chest => Some("Chest"),
            _ => None,
        }
    }

    pub fn has_quantity(&self) -> bool {
        matches!(self, ItemType::Resource)
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "custom" => Ok(ItemType::Custom),
            "chest" => Ok(ItemType::Chest),
            "resource" => Ok(ItemType::Resource),
            "harvestable" => Ok(ItemType::Harvestable),
            other => Err(format!("unknown item type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemIdentity,
    pub name: ItemDisplayName,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub description: String,
}

fn default_quantity() -> u32 {
    1
}

impl Item {
    /// 创建物品：名称去除首尾空白；类型无默认名时名称必填。
    /// 只有资源类保留数量，其余类型数量固定为 1。
    pub fn new(item_type: ItemType, name: Option<&str>, quantity: u32) -> Result<Self, ValidationError> {
        let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(n) => n.to_string(),
            None => item_type
                .default_name()
                .map(str::to_string)
                .ok_or_else(|| ValidationError::MissingItemName(item_type.label().to_string()))?,
        };
        let quantity = if item_type.has_quantity() { quantity.max(1) } else { 1 };
        Ok(Self {
            id: ItemIdentity::generate(),
            name: ItemDisplayName::new(name),
            item_type,
            quantity,
            description: String::new(),
        })
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = ItemIdentity::new(id);
        self
    }

    pub fn is_harvestable(&self) -> bool {
        self.item_type == ItemType::Harvestable
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stop {
    pub id: StopId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub items: Vec<Item>,
    /// 进入/离开该站点时请求库存检查点
    #[serde(default)]
    pub collect_data: bool,
}

impl Stop {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            description: String::new(),
            items: Vec::new(),
            collect_data: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn collecting(mut self, collect_data: bool) -> Self {
        self.collect_data = collect_data;
        self
    }

    pub fn with_item(mut self, item: Item) -> Self {
        self.items.push(item);
        self
    }

    pub fn harvestables(&self) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(|i| i.is_harvestable())
    }

    pub fn has_harvestables(&self) -> bool {
        self.harvestables().next().is_some()
    }

    /// 站点请求数据采集且确有可采集物时才需要库存检查点
    pub fn wants_inventory(&self) -> bool {
        self.collect_data && self.has_harvestables()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: RouteId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub stops: Vec<Stop>,
    #[serde(default)]
    pub completed_runs: u32,
    #[serde(default)]
    pub auto_inventory_checks: bool,
}

impl Route {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            description: String::new(),
            stops: Vec::new(),
            completed_runs: 0,
            auto_inventory_checks: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_stop(mut self, stop: Stop) -> Self {
        self.stops.push(stop);
        self
    }

    pub fn with_auto_checks(mut self, enabled: bool) -> Self {
        self.auto_inventory_checks = enabled;
        self
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.stops.iter().flat_map(|s| s.items.iter())
    }

    pub fn item_ids(&self) -> impl Iterator<Item = &ItemIdentity> {
        self.items().map(|i| &i.id)
    }

    pub fn has_harvestables(&self) -> bool {
        self.items().any(Item::is_harvestable)
    }

    pub fn stop(&self, id: &str) -> Option<&Stop> {
        self.stops.iter().find(|s| s.id == id)
    }

    pub fn stop_mut(&mut self, id: &str) -> Option<&mut Stop> {
        self.stops.iter_mut().find(|s| s.id == id)
    }

    pub fn last_index(&self) -> usize {
        self.stops.len().saturating_sub(1)
    }
}
