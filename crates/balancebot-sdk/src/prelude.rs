//! 常用类型

pub use crate::config::{ConfigError, RobotConfig};
pub use crate::logging::init_logging;
pub use crate::robot::{Robot, RobotDevices, rank};
pub use balancebot_behavior::{Arbitrated, BehaviorConfig, CycleOutcome};
pub use balancebot_driver::{BalanceConfig, BalanceLoop, ControlCommand, LoopFault, LoopHardware};
pub use balancebot_hal::{
    AudioSignal, BatteryMonitor, ConfirmationInput, GyroSensor, Indicator, MotorActuator,
    OperatorDisplay, OperatorFeedback, ProximitySensor,
};
