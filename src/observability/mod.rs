//! 可观测性：tracing 订阅器初始化
//!
//! 默认 info，`--verbose` 时 debug；设置了 RUST_LOG 则以 RUST_LOG 为准。日志写到 stderr，stdout 留给报告输出。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // 重复初始化（测试中）时忽略错误
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
