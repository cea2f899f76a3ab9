//! 名称索引：显示名 → 同名物品实例
//!
//! 每次按作用域（单站点或整条路线）现建，只收录可采集物。

use std::collections::BTreeMap;

use crate::model::{IdentityCounts, Item, ItemDisplayName, ItemIdentity, NameCounts, Route, Stop};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NameIndex {
    groups: BTreeMap<ItemDisplayName, Vec<ItemIdentity>>,
}

impl NameIndex {
    pub fn for_stop(stop: &Stop) -> Self {
        Self::from_items(stop.items.iter())
    }

    pub fn for_route(route: &Route) -> Self {
        Self::from_items(route.items())
    }

    fn from_items<'a>(items: impl Iterator<Item = &'a Item>) -> Self {
        let mut groups: BTreeMap<ItemDisplayName, Vec<ItemIdentity>> = BTreeMap::new();
        for item in items.filter(|i| i.is_harvestable()) {
            groups.entry(item.name.clone()).or_default().push(item.id.clone());
        }
        Self { groups }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn contains(&self, name: &ItemDisplayName) -> bool {
        self.groups.contains_key(name)
    }

    pub fn instances(&self, name: &ItemDisplayName) -> &[ItemIdentity] {
        self.groups.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ItemDisplayName, &[ItemIdentity])> {
        self.groups.iter().map(|(name, ids)| (name, ids.as_slice()))
    }

    pub fn names(&self) -> impl Iterator<Item = &ItemDisplayName> {
        self.groups.keys()
    }

    /// 同名实例的身份计数之和（缺失记为 0）
    pub fn total(&self, name: &ItemDisplayName, counts: &IdentityCounts) -> f64 {
        self.instances(name)
            .iter()
            .filter_map(|id| counts.get(id))
            .sum()
    }

    /// 把身份计数汇总回名称维度，只有至少一个实例有记录的名称才会出现
    pub fn aggregate(&self, counts: &IdentityCounts) -> NameCounts {
        self.iter()
            .filter(|(_, ids)| ids.iter().any(|id| counts.contains_key(id)))
            .map(|(name, _)| (name.clone(), self.total(name, counts)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemType;

    fn harvest(id: &str, name: &str) -> Item {
        Item::new(ItemType::Harvestable, Some(name), 1).unwrap().with_id(id)
    }

    fn stop() -> Stop {
        Stop::new("Cave")
            .with_item(harvest("a1", "Acid"))
            .with_item(Item::new(ItemType::Custom, Some("Acid"), 1).unwrap().with_id("x"))
            .with_item(harvest("q1", "Quartz"))
            .with_item(harvest("a2", "Acid"))
    }

    #[test]
    fn test_groups_only_harvestables_by_name() {
        let index = NameIndex::for_stop(&stop());
        assert_eq!(index.len(), 2);
        let acid = ItemDisplayName::new("Acid");
        assert_eq!(
            index.instances(&acid),
            &[ItemIdentity::new("a1"), ItemIdentity::new("a2")]
        );
        assert!(index.instances(&ItemDisplayName::new("Salt")).is_empty());
    }

    #[test]
    fn test_route_index_spans_stops() {
        let route = Route::new("Loop")
            .with_stop(stop())
            .with_stop(Stop::new("Shore").with_item(harvest("a3", "Acid")));
        let index = NameIndex::for_route(&route);
        assert_eq!(index.instances(&ItemDisplayName::new("Acid")).len(), 3);
    }

    #[test]
    fn test_aggregate_sums_instances() {
        let index = NameIndex::for_stop(&stop());
        let mut counts = IdentityCounts::new();
        counts.insert(ItemIdentity::new("a1"), 2.5);
        counts.insert(ItemIdentity::new("a2"), 2.5);
        let totals = index.aggregate(&counts);
        assert_eq!(totals.get(&ItemDisplayName::new("Acid")), Some(&5.0));
        assert!(!totals.contains_key(&ItemDisplayName::new("Quartz")));
    }
}
