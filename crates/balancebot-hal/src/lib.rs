//! # BalanceBot Hardware Abstraction Layer
//!
//! 硬件抽象层，为控制循环和行为层提供统一的设备接口。
//!
//! 所有设备都以显式对象的形式在构造时传入，不存在进程级的全局硬件单例。
//!
//! - 执行器：[`MotorActuator`]（左右轮各一个）
//! - 传感器：[`GyroSensor`]、[`ProximitySensor`]、[`BatteryMonitor`]
//! - 人机交互：[`ConfirmationInput`]、[`OperatorDisplay`]、[`AudioSignal`]
//!
//! 启用 `mock` feature 后可使用 [`mock`] 模块中的模拟设备（测试与仿真）。

use thiserror::Error;

pub mod feedback;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use feedback::OperatorFeedback;

/// 硬件层统一错误类型
#[derive(Error, Debug)]
pub enum HalError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] HalDeviceError),
    #[error("Read timeout")]
    Timeout,
    #[error("Reading out of range: {value}")]
    OutOfRange { value: f64 },
    #[error("Device disconnected")]
    Disconnected,
}

/// 设备错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalDeviceErrorKind {
    Unknown,
    NotFound,
    NoDevice,
    Busy,
    Rejected,
    InvalidResponse,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct HalDeviceError {
    pub kind: HalDeviceErrorKind,
    pub message: String,
}

impl HalDeviceError {
    pub fn new(kind: HalDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            HalDeviceErrorKind::NoDevice | HalDeviceErrorKind::NotFound
        )
    }
}

impl From<String> for HalDeviceError {
    fn from(message: String) -> Self {
        Self::new(HalDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for HalDeviceError {
    fn from(message: &str) -> Self {
        Self::new(HalDeviceErrorKind::Unknown, message)
    }
}

/// 轮毂电机（无调速，直接设置功率百分比）
pub trait MotorActuator {
    /// 设置功率（-100..=100）
    fn set_power(&mut self, percent: i32) -> Result<(), HalError>;
    /// 转角计数清零
    fn reset_position(&mut self) -> Result<(), HalError>;
    /// 累计转角（度）
    fn position(&mut self) -> Result<f64, HalError>;
}

/// 陀螺仪（角速度模式）
pub trait GyroSensor {
    fn reset(&mut self) -> Result<(), HalError>;
    /// 角速度（deg/s），正方向为前倾
    fn read_angular_rate(&mut self) -> Result<f64, HalError>;
}

/// 前向测距传感器
pub trait ProximitySensor {
    /// 距离（米）
    fn read_distance(&mut self) -> Result<f64, HalError>;
}

/// 电池电压监测
pub trait BatteryMonitor {
    /// 电压（伏特）
    fn read_voltage(&mut self) -> Result<f64, HalError>;
}

/// 操作员确认输入（如 Enter 键按下并释放）
///
/// 多个行为共享同一个输入，因此要求 `Sync`，方法只需 `&self`。
pub trait ConfirmationInput: Send + Sync {
    /// 阻塞直到收到确认信号
    fn wait_for_confirmation(&self) -> Result<(), HalError>;
}

/// 状态指示灯模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Indicator {
    #[default]
    Off,
    /// 避障机动中
    Avoiding,
    /// 已倒下，等待确认
    Fallen,
    /// 警告（低电量、故障）
    Warning,
}

/// 文本显示屏
pub trait OperatorDisplay {
    fn show_message(&mut self, text: &str, line: u8);
    fn clear_line(&mut self, line: u8);
    fn clear(&mut self);
    /// 设置指示灯（没有指示灯的设备可忽略）
    fn set_indicator(&mut self, _indicator: Indicator) {}
}

/// 蜂鸣器
pub trait AudioSignal {
    fn beep(&mut self);
    fn beep_sequence_up(&mut self);
}

// 装箱设备（运行时选择的实现）同样满足设备 trait

impl<T: MotorActuator + ?Sized> MotorActuator for Box<T> {
    fn set_power(&mut self, percent: i32) -> Result<(), HalError> {
        (**self).set_power(percent)
    }

    fn reset_position(&mut self) -> Result<(), HalError> {
        (**self).reset_position()
    }

    fn position(&mut self) -> Result<f64, HalError> {
        (**self).position()
    }
}

impl<T: GyroSensor + ?Sized> GyroSensor for Box<T> {
    fn reset(&mut self) -> Result<(), HalError> {
        (**self).reset()
    }

    fn read_angular_rate(&mut self) -> Result<f64, HalError> {
        (**self).read_angular_rate()
    }
}

impl<T: ProximitySensor + ?Sized> ProximitySensor for Box<T> {
    fn read_distance(&mut self) -> Result<f64, HalError> {
        (**self).read_distance()
    }
}

impl<T: BatteryMonitor + ?Sized> BatteryMonitor for Box<T> {
    fn read_voltage(&mut self) -> Result<f64, HalError> {
        (**self).read_voltage()
    }
}
