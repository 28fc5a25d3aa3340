//! 运行日志
//!
//! 面向用户的输出（流式消息、待审阅的计划、报告路径）走stdout；
//! 这里初始化的tracing日志写到stderr，由 `RUST_LOG` 控制。

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// 初始化tracing订阅者
///
/// 优先读取 `RUST_LOG`；未设置时默认 `info`，`--verbose` 时为 `debug`。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // 重复初始化（如测试中）时忽略错误
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
