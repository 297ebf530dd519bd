//! 可观测性：tracing 日志初始化
//!
//! 默认 info 级别，可通过 RUST_LOG 覆盖（如 `RUST_LOG=voltdesk=debug`）。
//! 工具审计日志是 `tool_audit` 事件的单行 JSON，随普通日志一起输出。

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 初始化全局日志订阅者；重复调用时忽略（测试里可能多次初始化）
pub fn init() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init();
}
