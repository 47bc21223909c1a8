//! 行为变体
//!
//! 封闭集合的四种行为，用 [`Behavior`] 枚举统一分发给仲裁器。
//! 每个变体都显式实现 `wants_control` / `act` / `suppress`，即使 `suppress` 为空。

mod fall;
mod forward;
mod low_battery;
mod obstacle;

pub use fall::{FallDetection, is_fallen};
pub use forward::Forward;
pub use low_battery::LowBatteryGuard;
pub use obstacle::ObstacleAvoidance;

use crate::arbiter::Arbitrated;
use crate::error::BehaviorError;

/// 机器人行为
pub enum Behavior {
    Forward(Forward),
    ObstacleAvoidance(ObstacleAvoidance),
    FallDetection(FallDetection),
    LowBatteryGuard(LowBatteryGuard),
}

impl Arbitrated for Behavior {
    fn name(&self) -> &str {
        match self {
            Behavior::Forward(_) => Forward::NAME,
            Behavior::ObstacleAvoidance(_) => ObstacleAvoidance::NAME,
            Behavior::FallDetection(_) => FallDetection::NAME,
            Behavior::LowBatteryGuard(_) => LowBatteryGuard::NAME,
        }
    }

    fn wants_control(&mut self) -> bool {
        match self {
            Behavior::Forward(b) => b.wants_control(),
            Behavior::ObstacleAvoidance(b) => b.wants_control(),
            Behavior::FallDetection(b) => b.wants_control(),
            Behavior::LowBatteryGuard(b) => b.wants_control(),
        }
    }

    fn act(&mut self) -> Result<(), BehaviorError> {
        match self {
            Behavior::Forward(b) => b.act(),
            Behavior::ObstacleAvoidance(b) => b.act(),
            Behavior::FallDetection(b) => b.act(),
            Behavior::LowBatteryGuard(b) => b.act(),
        }
    }

    fn suppress(&mut self) {
        match self {
            Behavior::Forward(b) => b.suppress(),
            Behavior::ObstacleAvoidance(b) => b.suppress(),
            Behavior::FallDetection(b) => b.suppress(),
            Behavior::LowBatteryGuard(b) => b.suppress(),
        }
    }
}

impl From<Forward> for Behavior {
    fn from(b: Forward) -> Self {
        Behavior::Forward(b)
    }
}

impl From<ObstacleAvoidance> for Behavior {
    fn from(b: ObstacleAvoidance) -> Self {
        Behavior::ObstacleAvoidance(b)
    }
}

impl From<FallDetection> for Behavior {
    fn from(b: FallDetection) -> Self {
        Behavior::FallDetection(b)
    }
}

impl From<LowBatteryGuard> for Behavior {
    fn from(b: LowBatteryGuard) -> Self {
        Behavior::LowBatteryGuard(b)
    }
}

impl std::fmt::Debug for Behavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Behavior").field(&self.name()).finish()
    }
}
