//! 日志初始化
//!
//! 配置来源依次覆盖：默认值、`RUST_LOG` / `CHIMERA_LOG_LEVEL` / `CHIMERA_LOG_FORMAT`
//! 环境变量、配置环境中的 `chimera.logging.*`。
//!
//! ```toml
//! [chimera.logging]
//! level = "debug"
//! format = "pretty"
//! filter = "chimera_aop=trace,chimera_tx=debug"
//! ```

use crate::config::Environment;
use crate::error::{CoreError, CoreResult};
use std::fmt;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&Level::from(*self).as_str().to_lowercase())
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// 单行紧凑输出（默认）
    Compact,
    Json,
    /// 多行输出，适合本地调试拦截链
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!("Invalid log format: {}", s)),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,

    /// 输出事件的模块路径
    pub show_target: bool,

    /// 输出线程名，事务和当前代理都绑定在线程上
    pub show_thread_names: bool,

    /// 完整的过滤指令，设置后忽略 `level`
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            show_target: false,
            show_thread_names: false,
            filter: None,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// 从进程环境变量读取
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(directives) = std::env::var("RUST_LOG") {
            config.filter = Some(directives);
        }
        if let Some(level) = std::env::var("CHIMERA_LOG_LEVEL").ok().and_then(|s| s.parse().ok()) {
            config.level = level;
        }
        if let Some(format) = std::env::var("CHIMERA_LOG_FORMAT").ok().and_then(|s| s.parse().ok()) {
            config.format = format;
        }
        config
    }

    /// 在 `from_env` 的基础上读取 `chimera.logging.*`
    pub fn from_environment(env: &Environment) -> Self {
        let mut config = Self::from_env();
        if let Some(level) = env.get_string("chimera.logging.level").and_then(|s| s.parse().ok()) {
            config.level = level;
        }
        if let Some(format) = env.get_string("chimera.logging.format").and_then(|s| s.parse().ok()) {
            config.format = format;
        }
        if let Some(filter) = env.get_string("chimera.logging.filter") {
            config.filter = Some(filter);
        }
        config.show_target = env.get_bool_or("chimera.logging.show-target", config.show_target);
        config.show_thread_names =
            env.get_bool_or("chimera.logging.show-thread-names", config.show_thread_names);
        config
    }

    /// 过滤指令无效时退回到 `level`
    pub fn env_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.level.to_string());
        match &self.filter {
            Some(directives) => EnvFilter::try_new(directives).unwrap_or_else(|_| fallback()),
            None => fallback(),
        }
    }

    /// 安装全局订阅者，只能成功一次
    pub fn init(self) -> CoreResult<()> {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(self.env_filter())
            .with_target(self.show_target)
            .with_thread_names(self.show_thread_names);

        let result = match self.format {
            LogFormat::Compact => builder.compact().try_init(),
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Pretty => builder.pretty().try_init(),
        };
        result.map_err(|e| CoreError::LoggingInitFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigValue, MapPropertySource};
    use tracing::level_filters::LevelFilter;

    #[test]
    fn test_level_round_trips_through_text() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::Debug.to_string(), "debug");
        assert!("verbose".parse::<LogLevel>().is_err());
        assert!("full".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_environment_overrides_defaults() {
        let env = Environment::new().with_source(
            MapPropertySource::new("test")
                .with_property("chimera.logging.level", ConfigValue::String("debug".into()))
                .with_property("chimera.logging.format", ConfigValue::String("pretty".into()))
                .with_property("chimera.logging.show-thread-names", ConfigValue::Bool(true)),
        );
        let config = LoggingConfig::from_environment(&env);
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.show_thread_names);
        assert!(!config.show_target);
    }

    #[test]
    fn test_invalid_filter_falls_back_to_level() {
        let config = LoggingConfig::new().level(LogLevel::Warn).filter("chimera_tx=loud");
        assert_eq!(config.env_filter().max_level_hint(), Some(LevelFilter::WARN));

        let config = LoggingConfig::new().filter("chimera_aop=trace");
        assert_eq!(config.env_filter().max_level_hint(), Some(LevelFilter::TRACE));
    }
}
