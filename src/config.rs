//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `FARMTRACK__*` 覆盖（双下划线表示嵌套，如 `FARMTRACK__STORAGE__MIRROR_FALLBACK=false`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            storage: StorageSection::default(),
            logging: LoggingSection::default(),
        }
        .with_resolved_paths()
    }
}

impl AppConfig {
    /// storage 段未配置的路径放到 app.data_dir 下
    fn with_resolved_paths(mut self) -> Self {
        let data_dir = &self.app.data_dir;
        if self.storage.database_path.as_os_str().is_empty() {
            self.storage.database_path = data_dir.join("farmtrack.db");
        }
        if self.storage.fallback_dir.as_os_str().is_empty() {
            self.storage.fallback_dir = data_dir.join("fallback");
        }
        self
    }
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 数据根目录；storage 段未单独配置路径时以此为基准
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

/// [storage] 段：主存储（SQLite）与备用存储（平面文件）位置，留空时位于 data_dir 下
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    #[serde(default)]
    pub database_path: PathBuf,
    #[serde(default)]
    pub fallback_dir: PathBuf,
    /// 主存储写成功后是否镜像到备用存储
    #[serde(default = "default_mirror_fallback")]
    pub mirror_fallback: bool,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            database_path: PathBuf::new(),
            fallback_dir: PathBuf::new(),
            mirror_fallback: default_mirror_fallback(),
        }
    }
}

fn default_mirror_fallback() -> bool {
    true
}

/// [logging] 段：默认日志级别，RUST_LOG 优先
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// 从 config 目录加载配置，环境变量 FARMTRACK__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 FARMTRACK__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("FARMTRACK")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize::<AppConfig>().map(AppConfig::with_resolved_paths)
}
