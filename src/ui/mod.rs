//! 控制台层：主循环（app）、命令解析（command）、文本渲染（render）

pub mod app;
pub mod command;
pub mod render;

pub use app::{run_app, stdin_lines, StdinConfirm};
pub use command::{parse, Command};
pub use render::{render_routes, render_view};
