/// 统一配置系统
///
/// 提供TOML/JSON配置文件、环境变量和运行时校验
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod answer;
pub mod canvas;
pub mod host;
pub mod network;

pub use answer::{AnswerConfig, WaitStrategy};
pub use canvas::CanvasConfig;
pub use host::{ComputeConfig, HostConfig};
pub use network::NetworkConfig;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 文件读取错误
    #[error("Config file error: {0}")]
    FileError(#[from] std::io::Error),
    /// 解析错误
    #[error("Config parse error: {0}")]
    ParseError(String),
    /// 验证错误
    #[error("Config validation error: {0}")]
    ValidationError(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// 桥接层主配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// 应答通道配置
    #[serde(default)]
    pub answer: AnswerConfig,

    /// 主机循环配置
    #[serde(default)]
    pub host: HostConfig,

    /// 画布配置
    #[serde(default)]
    pub canvas: CanvasConfig,

    /// 网络配置
    #[serde(default)]
    pub network: NetworkConfig,

    /// 计算侧配置
    #[serde(default)]
    pub compute: ComputeConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BridgeConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 从TOML文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_toml_str(&content)
    }

    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_json_str(&content)
    }

    /// 从JSON字符串解析配置
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 保存为TOML文件
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 保存为JSON文件
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 从环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) {
        // 应答通道
        if let Ok(val) = env::var("BRIDGE_ANSWER_CAPACITY") {
            if let Ok(capacity) = val.parse() {
                self.answer.capacity_bytes = capacity;
            }
        }
        if let Ok(val) = env::var("BRIDGE_ANSWER_POLL_MS") {
            if let Ok(interval_ms) = val.parse() {
                self.answer.wait = WaitStrategy::Polling { interval_ms };
            }
        }
        if let Ok(val) = env::var("BRIDGE_ANSWER_TIMEOUT_MS") {
            if let Ok(timeout) = val.parse() {
                self.answer.timeout_ms = Some(timeout);
            }
        }

        // 主机循环
        if let Ok(val) = env::var("BRIDGE_HOST_FRAME_MS") {
            if let Ok(interval) = val.parse() {
                self.host.frame_interval_ms = interval;
            }
        }
        if let Ok(val) = env::var("BRIDGE_HOST_FRAME_TICKS") {
            self.host.frame_tick_events = val.parse().unwrap_or(self.host.frame_tick_events);
        }

        // 画布
        if let Ok(val) = env::var("BRIDGE_CANVAS_PIXEL_RATIO") {
            if let Ok(ratio) = val.parse() {
                self.canvas.device_pixel_ratio = ratio;
            }
        }

        // 网络
        if let Ok(val) = env::var("BRIDGE_NET_TIMEOUT_MS") {
            if let Ok(timeout) = val.parse() {
                self.network.request_timeout_ms = timeout;
            }
        }

        if let Ok(val) = env::var("BRIDGE_LOG_LEVEL") {
            if let Some(level) = LogLevel::parse(&val) {
                self.logging.level = level;
            }
        }
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        self.answer.validate()?;
        self.host.validate()?;
        self.canvas.validate()?;
        self.network.validate()?;
        Ok(())
    }

    /// 自动查找并加载配置文件
    ///
    /// 按以下顺序查找：
    /// 1. ./bridge.toml
    /// 2. ./bridge.json
    /// 3. ~/.config/host_bridge/bridge.toml
    /// 4. 使用默认配置
    pub fn load_or_default() -> Self {
        if let Ok(config) = Self::from_toml_file("bridge.toml") {
            tracing::info!(target: "bridge::config", "Loaded config from bridge.toml");
            return config;
        }

        if let Ok(config) = Self::from_json_file("bridge.json") {
            tracing::info!(target: "bridge::config", "Loaded config from bridge.json");
            return config;
        }

        if let Some(home) = env::var_os("HOME") {
            let config_path = PathBuf::from(home)
                .join(".config")
                .join("host_bridge")
                .join("bridge.toml");

            if let Ok(config) = Self::from_toml_file(&config_path) {
                tracing::info!(target: "bridge::config", "Loaded config from {:?}", config_path);
                return config;
            }
        }

        tracing::info!(target: "bridge::config", "Using default configuration");
        Self::default()
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别（`RUST_LOG` 未设置时生效）
    pub level: LogLevel,
}

use crate::impl_default;

impl_default!(LoggingConfig {
    level: LogLevel::Info,
});

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// 跟踪
    Trace,
    /// 调试
    Debug,
    /// 信息
    Info,
    /// 警告
    Warn,
    /// 错误
    Error,
}

impl LogLevel {
    /// 解析大小写不敏感的级别名
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    /// `EnvFilter` 指令字符串
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
