//! 行为层错误类型定义

use balancebot_driver::DriverError;
use balancebot_hal::HalError;
use thiserror::Error;

/// 行为层错误类型
#[derive(Error, Debug)]
pub enum BehaviorError {
    /// 硬件错误（传感器读取、确认输入断开）
    #[error("Hardware error: {0}")]
    Hal(#[from] HalError),

    /// 控制循环错误
    #[error("Control loop error: {0}")]
    Driver(#[from] DriverError),

    /// 行为执行时 panic
    #[error("Behavior '{behavior}' panicked: {message}")]
    Panicked { behavior: String, message: String },

    /// 配置无效
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}
