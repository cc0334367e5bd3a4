//! 核心宏定义
//!
//! 配置结构体大量重复 `Default` 实现，这里统一用宏生成

/// 为结构体实现Default trait的宏
///
/// 使用示例:
/// ```rust
/// use host_bridge::impl_default;
///
/// struct SlotConfig {
///     capacity: usize,
///     label: String,
/// }
///
/// impl_default!(SlotConfig {
///     capacity: 65536,
///     label: String::new(),
/// });
/// ```
#[macro_export]
macro_rules! impl_default {
    ($struct_name:ident {
        $($field:ident: $value:expr),* $(,)?
    }) => {
        impl Default for $struct_name {
            fn default() -> Self {
                Self {
                    $($field: $value),*
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {

    struct PollSettings {
        interval_ms: u64,
        label: String,
    }

    impl_default!(PollSettings {
        interval_ms: 32,
        label: String::new(),
    });

    #[test]
    fn test_impl_default() {
        let s = PollSettings::default();
        assert_eq!(s.interval_ms, 32);
        assert_eq!(s.label, "");
    }
}
