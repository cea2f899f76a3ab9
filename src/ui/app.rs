//! 控制台主循环
//!
//! 逐行读取 stdin，解析为 Command 并调用 Tracker；每次迁移后从 watch 通道取最新 TrackerView 重绘。
//! 确认闸门与主循环共用同一个行读取器，确认提示直接读取下一行 y/n。

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use super::command::{self, Command, HELP};
use super::render::{render_routes, render_view};
use crate::core::{ConfirmGate, ConfirmRequest, Outcome, Tracker, TrackerError, ValidationError};
use crate::model::{ItemIdentity, RouteId};

pub type SharedLines = Arc<Mutex<Lines<BufReader<Stdin>>>>;

pub fn stdin_lines() -> SharedLines {
    Arc::new(Mutex::new(BufReader::new(tokio::io::stdin()).lines()))
}

fn prompt(text: &str) {
    print!("{}", text);
    let _ = std::io::stdout().flush();
}

/// 从控制台读取 y/n；输入结束视为拒绝
pub struct StdinConfirm {
    lines: SharedLines,
}

impl StdinConfirm {
    pub fn new(lines: SharedLines) -> Self {
        Self { lines }
    }
}

#[async_trait]
impl ConfirmGate for StdinConfirm {
    async fn confirm(&self, request: &ConfirmRequest) -> bool {
        prompt(&format!("{} [y/N] ", request.prompt()));
        let mut lines = self.lines.lock().await;
        match lines.next_line().await {
            Ok(Some(answer)) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("Failed to read confirmation: {}", e);
                false
            }
        }
    }
}

/// 路线引用：序号（从 1 开始）、id 或名称（不区分大小写）
fn resolve_route(tracker: &Tracker, reference: Option<&str>) -> Result<RouteId, TrackerError> {
    let Some(reference) = reference else {
        return tracker
            .current_route_id()
            .map(str::to_string)
            .ok_or_else(|| ValidationError::UnknownRoute("(none selected)".to_string()).into());
    };
    let routes = tracker.routes();
    let found = reference
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| routes.get(i))
        .or_else(|| routes.iter().find(|r| r.id == reference))
        .or_else(|| routes.iter().find(|r| r.name.eq_ignore_ascii_case(reference)));
    found
        .map(|r| r.id.clone())
        .ok_or_else(|| ValidationError::UnknownRoute(reference.to_string()).into())
}

fn describe(outcome: Outcome) -> Option<String> {
    match outcome {
        Outcome::Applied(_) => None,
        Outcome::Declined(_) => Some("Nothing changed.".to_string()),
    }
}

/// 执行一条命令，返回需要额外打印的文本
async fn execute(tracker: &mut Tracker, command: Command) -> Result<Option<String>, TrackerError> {
    let text = match command {
        Command::Routes => Some(render_routes(tracker.routes(), tracker.current_route_id())),
        Command::Use(reference) => {
            let id = resolve_route(tracker, Some(&reference))?;
            tracker.select_route(&id).await?;
            None
        }
        Command::NewRoute(name) => {
            tracker.create_route(&name, "").await?;
            Some(format!("Created route '{}'.", name))
        }
        Command::AddStop { name, collect } => {
            let id = resolve_route(tracker, None)?;
            tracker.add_stop(&id, &name, collect).await?;
            Some(render_routes(tracker.routes(), tracker.current_route_id()))
        }
        Command::AddItem {
            stop,
            kind,
            quantity,
            name,
        } => {
            let id = resolve_route(tracker, None)?;
            let stops = tracker.route(&id).map(|r| r.stops.len()).unwrap_or(0);
            let stop_id = tracker
                .route(&id)
                .and_then(|r| r.stops.get(stop - 1))
                .map(|s| s.id.clone())
                .ok_or(ValidationError::StopOutOfRange { index: stop - 1, len: stops })?;
            tracker.add_item(&id, &stop_id, kind, name.as_deref(), quantity).await?;
            Some(render_routes(tracker.routes(), tracker.current_route_id()))
        }
        Command::AutoChecks(enabled) => {
            let id = resolve_route(tracker, None)?;
            tracker.set_auto_inventory_checks(&id, enabled).await?;
            None
        }
        Command::MoveStop { from, to } => {
            let id = resolve_route(tracker, None)?;
            tracker.move_stop(&id, from - 1, to - 1).await?;
            Some(render_routes(tracker.routes(), tracker.current_route_id()))
        }
        Command::DeleteRoute(reference) => {
            let id = resolve_route(tracker, reference.as_deref())?;
            describe(tracker.delete_route(&id).await?)
        }
        Command::Start(reference) => {
            let id = resolve_route(tracker, reference.as_deref())?;
            tracker.start(&id).await?;
            None
        }
        Command::Toggle(n) => {
            if !tracker.is_tracking() {
                return Err(ValidationError::NoActiveSession.into());
            }
            let item = tracker
                .view()
                .stop_items
                .get(n - 1)
                .map(|item| item.id.clone())
                .ok_or_else(|| ValidationError::UnknownItem(ItemIdentity::new(format!("#{}", n))))?;
            tracker.toggle_collected(&item).await?;
            None
        }
        Command::Next => {
            tracker.next().await?;
            None
        }
        Command::Prev => {
            tracker.previous().await?;
            None
        }
        Command::Inventory(values) => describe(tracker.submit_inventory(values).await?),
        Command::Skip => describe(tracker.skip_inventory().await?),
        Command::Complete => describe(tracker.complete().await?),
        Command::Cancel => describe(tracker.cancel().await?),
        Command::Notes(text) => {
            tracker.set_notes(&text).await?;
            None
        }
        Command::Show => Some(render_view(&tracker.view())),
        Command::Export(path) => {
            tracker.export_to(&path).await?;
            Some(format!("Exported to {}.", path.display()))
        }
        Command::Import { path, mode } => describe(tracker.import_from(&path, mode).await?),
        Command::Help => Some(HELP.to_string()),
        Command::Quit => None,
    };
    Ok(text)
}

/// 运行控制台：读命令、执行、重绘，直到 quit 或输入结束
pub async fn run_app(mut tracker: Tracker, lines: SharedLines) -> anyhow::Result<()> {
    let mut view_rx = tracker.subscribe();
    println!("{}", render_view(&view_rx.borrow_and_update()));
    println!("Type 'help' for commands.");

    loop {
        prompt("> ");
        let line = {
            let mut guard = lines.lock().await;
            guard.next_line().await.context("Failed to read console input")?
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match command::parse(&line) {
            Ok(command) => command,
            Err(msg) => {
                println!("{}", msg);
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }

        match execute(&mut tracker, command).await {
            Ok(Some(text)) => println!("{}", text),
            Ok(None) => {}
            Err(e) => println!("Error: {}", e),
        }
        if view_rx.has_changed().unwrap_or(false) {
            println!("{}", render_view(&view_rx.borrow_and_update()));
        }
    }
    tracing::info!("Console closed");
    Ok(())
}
