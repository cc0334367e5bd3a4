/// 主机循环与计算侧配置

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ConfigError, ConfigResult};
use crate::impl_default;

/// 主机循环配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// 帧间隔（毫秒），绘制命令按此节奏刷新
    pub frame_interval_ms: u64,

    /// 音频补充轮询间隔（毫秒）
    pub audio_poll_interval_ms: u64,

    /// 每帧是否推送 frame-tick 事件
    pub frame_tick_events: bool,

    /// 已弹出事件保留多少条以便按 id 查询
    pub event_history: usize,
}

impl_default!(HostConfig {
    frame_interval_ms: 16,
    audio_poll_interval_ms: 32,
    frame_tick_events: true,
    event_history: 64,
});

impl HostConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn audio_poll_interval(&self) -> Duration {
        Duration::from_millis(self.audio_poll_interval_ms)
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.frame_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "Frame interval must be non-zero".to_string(),
            ));
        }
        if self.audio_poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "Audio poll interval must be non-zero".to_string(),
            ));
        }
        if self.event_history == 0 {
            return Err(ConfigError::ValidationError(
                "Event history must keep at least one event".to_string(),
            ));
        }
        Ok(())
    }
}

/// 计算侧配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeConfig {
    /// `yield` 导入的协作式休眠时长（毫秒）
    pub yield_ms: u64,
}

impl_default!(ComputeConfig { yield_ms: 32 });

impl ComputeConfig {
    pub fn yield_interval(&self) -> Duration {
        Duration::from_millis(self.yield_ms)
    }
}
