//! 核心模块
//!
//! 包含桥接层的核心功能：
//! - `context` - 主机线程独占的桥接上下文
//! - `host` - 主机循环、统计与桥接构建器
//! - `error` - 错误类型定义
//! - `logging` - 日志初始化

pub mod context;
pub mod error;
pub mod host;
pub mod logging;
pub mod utils;
#[macro_use]
pub mod macros;

// 重新导出错误类型
pub use error::{
    AnswerError, AnswerResult, AudioError, AudioResult, BridgeError, BridgeResult, DispatchError,
    DispatchResult, EventError, EventResult, NetworkError, NetworkResult, ResourceError,
    ResourceResult,
};

// 重新导出主要类型
pub use context::{Backends, BridgeContext};
pub use host::{Bridge, BridgeBuilder, Host, HostHandle, HostStats, Message};
pub use logging::init_logging;
pub use utils::{current_timestamp_ms, decode_utf8_lossy, duration_ms};
