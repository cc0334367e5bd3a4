/// 画布配置

use serde::{Deserialize, Serialize};

use super::{ConfigError, ConfigResult};
use crate::impl_default;

/// 画布配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasConfig {
    /// 设备像素比，新建表面尺寸 = 元素尺寸 × 像素比
    pub device_pixel_ratio: f32,

    /// 新上下文的默认线宽
    pub line_width: f32,

    /// 元素尚无尺寸时使用的表面宽度
    pub fallback_width: u32,

    /// 元素尚无尺寸时使用的表面高度
    pub fallback_height: u32,

    /// 单个表面的像素缓冲上限（宽 × 高 × 4 字节）
    #[serde(default = "default_max_surface_bytes")]
    pub max_surface_bytes: u64,
}

fn default_max_surface_bytes() -> u64 {
    64 * 1024 * 1024
}

impl_default!(CanvasConfig {
    device_pixel_ratio: 1.0,
    line_width: 2.5,
    fallback_width: 300,
    fallback_height: 150,
    max_surface_bytes: default_max_surface_bytes(),
});

impl CanvasConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.device_pixel_ratio.is_finite() && self.device_pixel_ratio > 0.0) {
            return Err(ConfigError::ValidationError(
                "Invalid device pixel ratio".to_string(),
            ));
        }
        if !(self.line_width.is_finite() && self.line_width > 0.0) {
            return Err(ConfigError::ValidationError("Invalid line width".to_string()));
        }
        if self.fallback_width == 0 || self.fallback_height == 0 {
            return Err(ConfigError::ValidationError(
                "Fallback surface size must be non-zero".to_string(),
            ));
        }
        let fallback = self.fallback_width as u64 * self.fallback_height as u64 * 4;
        if fallback > self.max_surface_bytes {
            return Err(ConfigError::ValidationError(
                "Fallback surface exceeds max_surface_bytes".to_string(),
            ));
        }
        Ok(())
    }
}
