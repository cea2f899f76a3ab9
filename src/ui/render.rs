//! 文本渲染
//!
//! 根据 TrackerView 输出状态行、当前站点物品、挂起的库存输入与路线级库存表；
//! 路线列表单独渲染。

use std::fmt::Write;

use crate::core::{TrackerState, TrackerView};
use crate::model::{InventoryScope, PendingDirection, Route};

/// 数量显示：整数不带小数点，其余保留两位
fn fmt_count(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}

fn scope_label(scope: &InventoryScope, view: &TrackerView) -> String {
    let stop = view.stop_name.as_deref().unwrap_or("?");
    match scope {
        InventoryScope::PreRoute => "inventory before the route".to_string(),
        InventoryScope::PostRoute => "inventory after the route".to_string(),
        InventoryScope::PreStop(_) => format!("inventory on arrival at {}", stop),
        InventoryScope::PostStop(_) => format!("inventory on leaving {}", stop),
    }
}

fn direction_hint(direction: PendingDirection) -> &'static str {
    match direction {
        PendingDirection::Stay => "",
        PendingDirection::Forward => " (then moving on)",
        PendingDirection::Backward => " (then moving back)",
        PendingDirection::Completing => " (then completing the run)",
    }
}

pub fn render_view(view: &TrackerView) -> String {
    let mut out = String::new();
    let route = view.route_name.as_deref().unwrap_or("no route selected");

    match &view.state {
        TrackerState::Idle => {
            let _ = writeln!(out, "[idle] {}", route);
        }
        TrackerState::AtStop { .. } | TrackerState::AwaitingInventory { .. } => {
            let position = view
                .stop_position
                .map(|(i, n)| format!("stop {}/{}", i + 1, n))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "[tracking] {} | {} {} | collected {}/{}",
                route,
                position,
                view.stop_name.as_deref().unwrap_or(""),
                view.collected,
                view.total
            );
            for (n, item) in view.stop_items.iter().enumerate() {
                let mark = if item.collected { "x" } else { " " };
                let quantity = if item.quantity > 1 {
                    format!(" x{}", item.quantity)
                } else {
                    String::new()
                };
                let _ = writeln!(out, "  {}. [{}] {}{} ({})", n + 1, mark, item.name, quantity, item.kind);
            }
            if !view.notes.is_empty() {
                let _ = writeln!(out, "  notes: {}", view.notes);
            }
        }
    }

    if let TrackerState::AwaitingInventory { scope, direction } = &view.state {
        let _ = writeln!(out, "Waiting for {}{}:", scope_label(scope, view), direction_hint(*direction));
        for group in &view.pending {
            let instances = if group.instances > 1 {
                format!(" (split across {} spots)", group.instances)
            } else {
                String::new()
            };
            let _ = writeln!(out, "  {} = {}{}", group.name, fmt_count(group.seed), instances);
        }
        let _ = writeln!(out, "Enter with 'inv Name=Count, ...' or 'skip'.");
    }

    if !view.rows.is_empty() {
        let _ = writeln!(out, "  {:<20} {:>8} {:>8} {:>8} {:>8}", "resource", "pre", "post", "diff", "gathered");
        for row in &view.rows {
            let cell = |v: Option<f64>| v.map(fmt_count).unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                out,
                "  {:<20} {:>8} {:>8} {:>8} {:>8}",
                row.name.as_str(),
                cell(row.pre),
                cell(row.post),
                cell(row.diff),
                fmt_count(row.gathered)
            );
        }
    }

    if let Some(warning) = &view.storage_warning {
        let _ = writeln!(out, "! {}", warning);
    }
    out.trim_end().to_string()
}

pub fn render_routes(routes: &[Route], current: Option<&str>) -> String {
    if routes.is_empty() {
        return "No routes yet, create one with 'new-route <name>'.".to_string();
    }
    let mut out = String::new();
    for (n, route) in routes.iter().enumerate() {
        let marker = if Some(route.id.as_str()) == current { "*" } else { " " };
        let _ = writeln!(
            out,
            "{} {}. {} ({} stops, {} runs{})",
            marker,
            n + 1,
            route.name,
            route.stops.len(),
            route.completed_runs,
            if route.auto_inventory_checks { ", auto checks" } else { "" }
        );
        if Some(route.id.as_str()) == current {
            for (i, stop) in route.stops.iter().enumerate() {
                let collect = if stop.collect_data { " [collect]" } else { "" };
                let _ = writeln!(out, "     {}. {} - {} items{}", i + 1, stop.name, stop.items.len(), collect);
            }
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PendingGroup;
    use crate::model::{ItemDisplayName, Stop};

    #[test]
    fn test_counts_drop_trailing_zeroes() {
        assert_eq!(fmt_count(4.0), "4");
        assert_eq!(fmt_count(10.0 / 3.0), "3.33");
    }

    #[test]
    fn test_pending_prompt_lists_groups() {
        let view = TrackerView {
            state: TrackerState::AwaitingInventory {
                scope: InventoryScope::PostStop("a".into()),
                direction: PendingDirection::Forward,
            },
            route_name: Some("Loop".into()),
            stop_name: Some("Ferry".into()),
            stop_position: Some((0, 2)),
            pending: vec![PendingGroup {
                name: ItemDisplayName::new("Acid"),
                instances: 2,
                seed: 0.0,
            }],
            ..Default::default()
        };
        let text = render_view(&view);
        assert!(text.contains("stop 1/2"));
        assert!(text.contains("on leaving Ferry (then moving on)"));
        assert!(text.contains("Acid = 0 (split across 2 spots)"));
    }

    #[test]
    fn test_route_list_marks_current() {
        let routes = vec![
            Route::new("A").with_id("a"),
            Route::new("B").with_id("b").with_stop(Stop::new("Gate").collecting(true)),
        ];
        let text = render_routes(&routes, Some("b"));
        assert!(text.contains("* 2. B"));
        assert!(text.contains("1. Gate - 0 items [collect]"));
    }
}
