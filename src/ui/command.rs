//! 控制台命令解析
//!
//! 每行一条命令，首个单词为命令名，其余为参数。路线可用序号（从 1 开始）、id 或名称引用。

use std::path::PathBuf;

use crate::inventory::{clamp_count, InventoryInput};
use crate::model::{ItemDisplayName, ItemType};
use crate::transfer::ImportMode;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Routes,
    Use(String),
    NewRoute(String),
    /// 向当前路线追加站点
    AddStop { name: String, collect: bool },
    /// 向当前路线第 stop 个站点（从 1 开始）添加物品
    AddItem {
        stop: usize,
        kind: ItemType,
        quantity: u32,
        name: Option<String>,
    },
    AutoChecks(bool),
    MoveStop { from: usize, to: usize },
    DeleteRoute(Option<String>),
    Start(Option<String>),
    /// 切换当前站点第 n 个物品（从 1 开始）
    Toggle(usize),
    Next,
    Prev,
    Inventory(InventoryInput),
    Skip,
    Complete,
    Cancel,
    Notes(String),
    Show,
    Export(PathBuf),
    Import { path: PathBuf, mode: ImportMode },
    Help,
    Quit,
}

pub const HELP: &str = "\
Catalog:
  routes                         list routes
  use <route>                    select the current route
  new-route <name>               create a route
  add-stop <name> [--collect]    append a stop to the current route
  add-item <stop#> <type> [qty] [name]
                                 types: custom, chest, resource, harvestable
  auto-checks on|off             toggle route-level inventory checks
  move-stop <from#> <to#>        reorder stops
  delete-route [route]           delete a route (asks first)
Tracking:
  start [route]                  start or resume tracking
  toggle <item#>                 flip an item at the current stop
  next | prev                    move between stops
  inv Name=Count, Name=Count     submit the pending inventory check
  skip                           decline the pending inventory check
  complete | cancel              finish or abandon the run
  notes <text>                   set session notes
  show                           print the current state
Data:
  export <file> | import <file> [merge|replace]
  help | quit";

fn positive_index(raw: &str) -> Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("'{}' is not a position (use 1, 2, ...)", raw)),
    }
}

fn optional(rest: &str) -> Option<String> {
    Some(rest.trim()).filter(|s| !s.is_empty()).map(str::to_string)
}

fn required(rest: &str, what: &str) -> Result<String, String> {
    optional(rest).ok_or_else(|| format!("missing {}", what))
}

/// 解析 `Name=Count, Name=Count`；数量收敛为非负整数，同名重复时以最后一次为准
pub fn parse_inventory(text: &str) -> Result<InventoryInput, String> {
    let mut values = InventoryInput::new();
    for part in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (name, count) = part
            .split_once('=')
            .ok_or_else(|| format!("expected Name=Count, got '{}'", part))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("missing name in '{}'", part));
        }
        let raw: f64 = count
            .trim()
            .parse()
            .map_err(|_| format!("'{}' is not a number", count.trim()))?;
        values.insert(ItemDisplayName::new(name), clamp_count(raw));
    }
    Ok(values)
}

pub fn parse(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();

    let command = match word.to_ascii_lowercase().as_str() {
        "routes" | "ls" => Command::Routes,
        "use" => Command::Use(required(rest, "route")?),
        "new-route" => Command::NewRoute(required(rest, "route name")?),
        "add-stop" => {
            let collect = rest.split_whitespace().any(|t| t == "--collect");
            let name: Vec<_> = rest.split_whitespace().filter(|t| *t != "--collect").collect();
            Command::AddStop {
                name: required(&name.join(" "), "stop name")?,
                collect,
            }
        }
        "add-item" => {
            let mut tokens = rest.split_whitespace().peekable();
            let stop = positive_index(tokens.next().ok_or("missing stop position")?)?;
            let kind: ItemType = tokens.next().ok_or("missing item type")?.parse()?;
            let quantity = match tokens.peek().and_then(|t| t.parse::<u32>().ok()) {
                Some(q) => {
                    tokens.next();
                    q
                }
                None => 1,
            };
            let name = optional(&tokens.collect::<Vec<_>>().join(" "));
            Command::AddItem {
                stop,
                kind,
                quantity,
                name,
            }
        }
        "auto-checks" => match rest.to_ascii_lowercase().as_str() {
            "on" | "true" | "yes" => Command::AutoChecks(true),
            "off" | "false" | "no" => Command::AutoChecks(false),
            _ => return Err("usage: auto-checks on|off".to_string()),
        },
        "move-stop" => {
            let mut tokens = rest.split_whitespace();
            let from = positive_index(tokens.next().ok_or("missing source position")?)?;
            let to = positive_index(tokens.next().ok_or("missing target position")?)?;
            Command::MoveStop { from, to }
        }
        "delete-route" => Command::DeleteRoute(optional(rest)),
        "start" => Command::Start(optional(rest)),
        "toggle" | "t" => Command::Toggle(positive_index(rest)?),
        "next" | "n" => Command::Next,
        "prev" | "previous" | "p" => Command::Prev,
        "inv" => Command::Inventory(parse_inventory(rest)?),
        "skip" => Command::Skip,
        "complete" | "done" => Command::Complete,
        "cancel" => Command::Cancel,
        "notes" => Command::Notes(rest.to_string()),
        "show" => Command::Show,
        "export" => Command::Export(PathBuf::from(required(rest, "file path")?)),
        "import" => {
            let mut tokens = rest.split_whitespace();
            let path = PathBuf::from(tokens.next().ok_or("missing file path")?);
            let mode = match tokens.next() {
                Some(mode) => mode.parse()?,
                None => ImportMode::Merge,
            };
            Command::Import { path, mode }
        }
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(format!("unknown command '{}', type 'help'", other)),
    };
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inventory_counts_are_clamped() {
        let values = parse_inventory("Acid=10, Iron Ore = 2.7, Slime=-4").unwrap();
        assert_eq!(values.get(&ItemDisplayName::new("Acid")), Some(&10));
        assert_eq!(values.get(&ItemDisplayName::new("Iron Ore")), Some(&2));
        assert_eq!(values.get(&ItemDisplayName::new("Slime")), Some(&0));
        assert!(parse_inventory("Acid").is_err());
        assert!(parse_inventory("Acid=lots").is_err());
        assert!(parse_inventory("").unwrap().is_empty());
    }

    #[test]
    fn test_add_item_arguments() {
        assert_eq!(
            parse("add-item 2 resource 5 Iron Bar").unwrap(),
            Command::AddItem {
                stop: 2,
                kind: ItemType::Resource,
                quantity: 5,
                name: Some("Iron Bar".into())
            }
        );
        assert_eq!(
            parse("add-item 1 chest").unwrap(),
            Command::AddItem {
                stop: 1,
                kind: ItemType::Chest,
                quantity: 1,
                name: None
            }
        );
        assert!(parse("add-item 0 chest").is_err());
        assert!(parse("add-item 1 treasure").is_err());
    }

    #[test]
    fn test_stop_and_import_flags() {
        assert_eq!(
            parse("add-stop Old Mill --collect").unwrap(),
            Command::AddStop {
                name: "Old Mill".into(),
                collect: true
            }
        );
        assert_eq!(
            parse("import backup.json replace").unwrap(),
            Command::Import {
                path: PathBuf::from("backup.json"),
                mode: ImportMode::Replace
            }
        );
        assert_eq!(parse("start").unwrap(), Command::Start(None));
        assert_eq!(parse("  NEXT ").unwrap(), Command::Next);
        assert!(parse("fly").is_err());
    }
}
