//! # BalanceBot SDK
//!
//! 两轮自平衡机器人的统一入口。分层结构：
//!
//! - **硬件层** (`hal`): 设备 trait、错误类型、模拟设备（`mock` feature）
//! - **驱动层** (`driver`): 状态估计、平衡控制律、实时控制线程
//! - **行为层** (`behavior`): 优先级仲裁器和四种行为
//!
//! 本 crate 提供配置文件加载、日志初始化和 [`Robot`] 装配。
//!
//! ```rust,no_run
//! use balancebot_sdk::prelude::*;
//! use std::sync::atomic::AtomicBool;
//!
//! # fn example(devices: RobotDevices) -> Result<(), Box<dyn std::error::Error>> {
//! init_logging("info")?;
//! let config = RobotConfig::load_from_file("robot.toml")?;
//! let mut robot = Robot::new(config, devices)?;
//! let stop = AtomicBool::new(false);
//! robot.run(&stop);
//! robot.shutdown()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod logging;
pub mod prelude;
pub mod robot;

pub use balancebot_behavior as behavior;
pub use balancebot_driver as driver;
pub use balancebot_hal as hal;

pub use balancebot_behavior::{Arbiter, Behavior, BehaviorConfig, BehaviorError, CycleOutcome};
pub use balancebot_driver::{BalanceConfig, BalanceLoop, DriverError, LoopHardware, RobotState};
pub use balancebot_hal::{HalError, OperatorFeedback};
pub use config::{ConfigError, RobotConfig};
pub use logging::{LoggingError, init_logging};
pub use robot::{Robot, RobotDevices};
