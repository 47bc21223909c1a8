//! 驱动层错误类型定义

use balancebot_hal::HalError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 硬件错误
    #[error("Hardware error: {0}")]
    Hal(#[from] HalError),

    /// 控制线程创建失败
    #[error("Failed to spawn control thread: {0}")]
    ThreadSpawn(String),

    /// 配置无效
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// 锁被毒化（线程 panic）
    #[error("Poisoned lock (thread panic)")]
    PoisonedLock,

    /// 操作超时
    #[error("Operation timeout")]
    Timeout,
}

#[cfg(test)]
mod tests {
    use super::DriverError;
    use balancebot_hal::HalError;

    #[test]
    fn test_driver_error_display() {
        let driver_error = DriverError::Hal(HalError::Timeout);
        let msg = format!("{}", driver_error);
        assert!(msg.contains("Hardware error") && msg.contains("Read timeout"));

        let msg = format!("{}", DriverError::InvalidConfig("period_ms".to_string()));
        assert!(msg.contains("Invalid config") && msg.contains("period_ms"));

        let msg = format!("{}", DriverError::ThreadSpawn("EAGAIN".to_string()));
        assert!(msg.contains("spawn") && msg.contains("EAGAIN"));

        assert_eq!(format!("{}", DriverError::Timeout), "Operation timeout");
    }

    #[test]
    fn test_from_hal_error() {
        let driver_error: DriverError = HalError::Disconnected.into();
        match driver_error {
            DriverError::Hal(e) => assert!(matches!(e, HalError::Disconnected)),
            _ => panic!("Expected Hal variant"),
        }
    }
}
