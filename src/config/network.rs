/// 网络请求配置

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ConfigError, ConfigResult};
use crate::impl_default;

/// 网络请求配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// 单次请求超时（毫秒），超时后请求进入 Failed 状态
    pub request_timeout_ms: u64,

    /// HTTP User-Agent
    pub user_agent: String,
}

impl_default!(NetworkConfig {
    request_timeout_ms: 30_000,
    user_agent: concat!("host_bridge/", env!("CARGO_PKG_VERSION")).to_string(),
});

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "Request timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
