//! 可观测性：tracing 订阅器（EnvFilter + fmt），默认 info，可用 RUST_LOG 覆盖
//!
//! 日志写到 stderr，stdout 留给 CLI 的 JSON 报告。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // 测试或嵌入场景下可能已有全局订阅器，重复初始化时静默忽略
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}
