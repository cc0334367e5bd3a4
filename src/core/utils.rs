//! 核心工具函数
//!
//! 时间戳与字符串解码等跨模块共用的小工具

use std::time::Duration;

/// 获取当前Unix时间戳（毫秒）
///
/// 计算侧的 `now` 导入直接使用它，不经过桥接通道。
///
/// # 示例
///
/// ```rust
/// use host_bridge::core::utils::current_timestamp_ms;
///
/// let timestamp_ms = current_timestamp_ms();
/// assert!(timestamp_ms > 0);
/// ```
pub fn current_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// 将 `Duration` 转换为整数毫秒（用于日志与错误信息）
pub fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}

/// 将字节按 UTF-8 解码，非法序列替换为 U+FFFD
///
/// 计算侧传来的字符串只保证是字节序列，主机侧不拒绝非法编码。
pub fn decode_utf8_lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
