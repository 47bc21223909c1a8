//! 平衡控制律
//!
//! 纯函数：给定 [`RobotState`] 和 [`Setpoints`]，输出左右轮功率。
//! 不访问硬件，不持有可变状态，可以脱离线程和设备做确定性测试。

use crate::config::BalanceGains;
use crate::estimator::RobotState;

/// 电机功率上限（百分比）
pub const MAX_POWER: f64 = 100.0;

/// 外部设定值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Setpoints {
    /// 速度偏置（作用于位置误差，不是速度目标）
    pub speed: f64,
    /// 转向差速，正值减小右轮功率
    pub turn: f64,
}

/// 左右轮功率命令，范围 [-100, 100]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlCommand {
    pub left: i32,
    pub right: i32,
}

impl ControlCommand {
    /// 两轮零功率
    pub const ZERO: Self = Self { left: 0, right: 0 };

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

/// 线性反馈控制器
#[derive(Debug, Clone, Copy)]
pub struct BalanceController {
    gains: BalanceGains,
}

impl BalanceController {
    pub fn new(gains: BalanceGains) -> Self {
        Self { gains }
    }

    pub fn gains(&self) -> &BalanceGains {
        &self.gains
    }

    /// 限幅前的合成功率
    pub fn raw_power(&self, state: &RobotState, setpoints: &Setpoints) -> f64 {
        let pos_error = state.motor_position - setpoints.speed;
        self.gains.k_speed * state.motor_velocity
            + self.gains.k_pos * pos_error
            + self.gains.k_gyro_speed * state.angular_rate
            + self.gains.k_gyro_angle * state.angle
    }

    /// 计算本 tick 的电机命令
    pub fn compute(&self, state: &RobotState, setpoints: &Setpoints) -> ControlCommand {
        let power = clamp_power(self.raw_power(state, setpoints));
        ControlCommand {
            left: to_wheel_power(power + setpoints.turn),
            right: to_wheel_power(power - setpoints.turn),
        }
    }
}

fn clamp_power(power: f64) -> f64 {
    // NaN 只可能来自 inf - inf，按零功率处理
    if power.is_nan() {
        return 0.0;
    }
    power.clamp(-MAX_POWER, MAX_POWER)
}

fn to_wheel_power(power: f64) -> i32 {
    // `as` 向零截断
    clamp_power(power) as i32
}
