//! 日志初始化
//!
//! 安装 `tracing-subscriber` 的 fmt 输出（`RUST_LOG` 优先），
//! 并把 `log` 门面的记录桥接到 tracing。

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// 日志初始化错误
#[derive(Error, Debug)]
pub enum LoggingError {
    /// 默认过滤指令无法解析
    #[error("Invalid log directive '{directive}': {message}")]
    InvalidDirective { directive: String, message: String },

    /// 全局 subscriber 已经安装
    #[error("Global tracing subscriber already installed")]
    AlreadyInitialized,

    /// `log` 门面已经设置了 logger
    #[error("Failed to bridge `log` records: {0}")]
    LogBridge(#[from] log::SetLoggerError),
}

/// 初始化全局日志
///
/// `default_directive` 在没有设置 `RUST_LOG` 时生效，例如 `"info"` 或
/// `"balancebot_driver=debug,info"`。重复调用返回错误，不会 panic。
pub fn init_logging(default_directive: &str) -> Result<(), LoggingError> {
    let directive = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(env) if !env.trim().is_empty() => env,
        _ => default_directive.to_string(),
    };
    let filter =
        EnvFilter::try_new(&directive).map_err(|e| LoggingError::InvalidDirective {
            directive: directive.clone(),
            message: e.to_string(),
        })?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|_| LoggingError::AlreadyInitialized)?;

    tracing_log::LogTracer::init()?;
    Ok(())
}
