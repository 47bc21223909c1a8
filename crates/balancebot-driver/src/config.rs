//! 平衡控制配置
//!
//! 反馈增益是整个系统最敏感的参数，只在这里定义一次，
//! 控制律和控制循环都从 [`BalanceConfig`] 读取。

use crate::error::DriverError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 速度滤波窗口（固定为 4 个样本）
pub const VELOCITY_WINDOW: usize = 4;

/// 反馈增益
///
/// `power = k_speed * motor_velocity + k_pos * pos_error
///        + k_gyro_speed * angular_rate + k_gyro_angle * angle`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceGains {
    /// 轮速增益
    pub k_speed: f64,
    /// 轮位置增益
    pub k_pos: f64,
    /// 角速度增益
    pub k_gyro_speed: f64,
    /// 倾角增益
    pub k_gyro_angle: f64,
}

impl Default for BalanceGains {
    fn default() -> Self {
        Self {
            k_speed: 0.08,
            k_pos: 0.12,
            k_gyro_speed: 0.8,
            k_gyro_angle: 15.0,
        }
    }
}

/// 控制循环配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    /// 反馈增益
    pub gains: BalanceGains,

    /// 每次循环（重新）启动时的初始倾角（度）
    ///
    /// 补偿陀螺仪安装偏差，只在代次开始时应用一次。
    pub starting_angle: f64,

    /// 默认速度设定值
    pub default_speed: f64,

    /// 速度设定值上限（对称）
    pub max_speed: f64,

    /// 转向设定值上限（对称）
    pub max_turn: f64,

    /// 控制周期（毫秒）
    pub period_ms: u64,

    /// 每代开始时强制零输出的 tick 数
    pub priming_ticks: u32,

    /// 陀螺仪读数上限（deg/s），超过视为瞬时故障
    pub max_gyro_rate: f64,

    /// 连续传感器故障上限，达到后挂起循环并提示操作员
    pub max_consecutive_sensor_faults: u32,

    /// 是否尝试把控制线程提升到最高优先级（需要 `realtime` feature）
    pub realtime_priority: bool,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            gains: BalanceGains::default(),
            starting_angle: -0.25,
            default_speed: 3.0,
            max_speed: 5.0,
            max_turn: 5.0,
            period_ms: 10,
            priming_ticks: 10,
            max_gyro_rate: 440.0,
            max_consecutive_sensor_faults: 50,
            realtime_priority: true,
        }
    }
}

impl BalanceConfig {
    /// 控制周期
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    /// 检查配置的合法性
    pub fn validate(&self) -> Result<(), DriverError> {
        let gains = [
            ("k_speed", self.gains.k_speed),
            ("k_pos", self.gains.k_pos),
            ("k_gyro_speed", self.gains.k_gyro_speed),
            ("k_gyro_angle", self.gains.k_gyro_angle),
            ("starting_angle", self.starting_angle),
        ];
        for (name, value) in gains {
            if !value.is_finite() {
                return Err(DriverError::InvalidConfig(format!(
                    "{} must be finite, got {}",
                    name, value
                )));
            }
        }

        if self.period_ms == 0 {
            return Err(DriverError::InvalidConfig(
                "period_ms must be > 0".to_string(),
            ));
        }

        for (name, value) in [
            ("max_speed", self.max_speed),
            ("max_turn", self.max_turn),
            ("max_gyro_rate", self.max_gyro_rate),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(DriverError::InvalidConfig(format!(
                    "{} must be a positive finite number, got {}",
                    name, value
                )));
            }
        }

        if !self.default_speed.is_finite() || self.default_speed.abs() > self.max_speed {
            return Err(DriverError::InvalidConfig(format!(
                "default_speed {} outside [-{}, {}]",
                self.default_speed, self.max_speed, self.max_speed
            )));
        }

        if self.max_consecutive_sensor_faults == 0 {
            return Err(DriverError::InvalidConfig(
                "max_consecutive_sensor_faults must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}
