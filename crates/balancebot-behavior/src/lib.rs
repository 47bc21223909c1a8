//! # BalanceBot Behavior
//!
//! 决策层：subsumption 风格的优先级仲裁器和四种行为。
//!
//! 仲裁线程只通过 [`BalanceLoop`](balancebot_driver::BalanceLoop) 的公开方法
//! （设定值、挂起/恢复、最新倾角）与控制线程交互。

pub mod arbiter;
pub mod behaviors;
pub mod config;
mod error;

pub use arbiter::{Arbiter, Arbitrated, CycleOutcome};
pub use behaviors::{
    Behavior, FallDetection, Forward, LowBatteryGuard, ObstacleAvoidance, is_fallen,
};
pub use config::BehaviorConfig;
pub use error::BehaviorError;
