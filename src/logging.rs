//! 日誌初始化
//!
//! 使用 tracing 與 tracing-subscriber，`RUST_LOG` 優先於設定值。

use tracing_subscriber::{fmt, EnvFilter};

/// 初始化日誌
///
/// `default_filter` 在沒有設定 `RUST_LOG` 時使用，例如 `info` 或 `leveling_calc=debug`。
pub fn init(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();
}

/// 測試用日誌（重複初始化時忽略）
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
