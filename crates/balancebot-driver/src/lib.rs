//! # BalanceBot Driver
//!
//! 实时控制层：
//! - 运动状态估计（[`MotionEstimator`]）
//! - 平衡控制律（[`BalanceController`]，纯函数）
//! - 固定周期控制线程（[`BalanceLoop`]，挂起/恢复、设定值、故障锁存）
//! - 跨线程共享状态（原子变量 + ArcSwap 无锁读取）
//!
//! # 特性
//!
//! - `realtime`: 控制线程提升到最高优先级（需要系统权限）
//! - `mock`: 导出 `balancebot-hal` 的模拟设备

mod balance_loop;
pub mod config;
pub mod controller;
mod error;
pub mod estimator;
pub mod metrics;
pub mod pipeline;
pub mod state;

pub use balance_loop::BalanceLoop;
pub use config::{BalanceConfig, BalanceGains, VELOCITY_WINDOW};
pub use controller::{BalanceController, ControlCommand, MAX_POWER, Setpoints};
pub use error::DriverError;
pub use estimator::{MotionEstimator, RobotState, SampleError, SensorSample};
pub use metrics::{LoopMetrics, MetricsSnapshot};
pub use pipeline::{ControlTask, LoopHardware, TickOutcome, control_loop};
pub use state::{LoopContext, LoopControl, LoopFault, SharedSetpoints};
