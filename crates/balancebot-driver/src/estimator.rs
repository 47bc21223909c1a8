//! 运动状态估计
//!
//! 把陀螺仪角速度和左右轮累计转角融合成 [`RobotState`]：
//!
//! - `angle`：角速度对真实经过时间的积分，代次开始时以 `starting_angle` 为初值
//! - `motor_position`：左右轮转角之和的累计
//! - `motor_velocity`：最近 4 个转角增量的平均值除以 `dt`
//!
//! `dt` 始终由单调时钟测得，不假设周期恒定。

use crate::config::VELOCITY_WINDOW;
use std::time::Instant;
use thiserror::Error;

/// 机器人运动状态（每个 tick 由估计器更新一次）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobotState {
    /// 倾角（度）
    pub angle: f64,
    /// 角速度（deg/s）
    pub angular_rate: f64,
    /// 左右轮转角之和（度）
    pub motor_position: f64,
    /// 滤波后的轮速（deg/s）
    pub motor_velocity: f64,
    /// 采样时刻
    pub timestamp: Instant,
}

impl RobotState {
    /// 代次起点：只有初始倾角，其余量为零
    pub fn initial(starting_angle: f64, timestamp: Instant) -> Self {
        Self {
            angle: starting_angle,
            angular_rate: 0.0,
            motor_position: 0.0,
            motor_velocity: 0.0,
            timestamp,
        }
    }
}

/// 一次原始采样
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    /// 陀螺仪角速度（deg/s）
    pub angular_rate: f64,
    /// 左右轮累计转角之和（度）
    pub wheel_sum: f64,
}

/// 采样被拒绝的原因（估计器状态保持不变）
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum SampleError {
    #[error("Non-finite sample (rate: {angular_rate}, wheels: {wheel_sum})")]
    NonFinite { angular_rate: f64, wheel_sum: f64 },

    #[error("Angular rate {rate} deg/s exceeds limit {limit} deg/s")]
    RateOutOfRange { rate: f64, limit: f64 },

    #[error("Sample clock did not advance")]
    ClockNotAdvanced,
}

/// 运动状态估计器
#[derive(Debug, Clone)]
pub struct MotionEstimator {
    state: RobotState,
    starting_angle: f64,
    max_rate: f64,
    last_wheel_sum: f64,
    deltas: [f64; VELOCITY_WINDOW],
    cursor: usize,
}

impl MotionEstimator {
    /// 创建估计器，`start` 为代次起点（第一个 tick 的 `dt` 从这里量起）
    pub fn new(starting_angle: f64, max_rate: f64, start: Instant) -> Self {
        Self {
            state: RobotState::initial(starting_angle, start),
            starting_angle,
            max_rate,
            last_wheel_sum: 0.0,
            deltas: [0.0; VELOCITY_WINDOW],
            cursor: 0,
        }
    }

    /// 开始新的代次：清空积分、位置和滤波历史
    ///
    /// 调用方需要同时把轮子编码器清零（`last_wheel_sum` 从 0 开始计）。
    pub fn reset(&mut self, start: Instant) {
        self.state = RobotState::initial(self.starting_angle, start);
        self.last_wheel_sum = 0.0;
        self.deltas = [0.0; VELOCITY_WINDOW];
        self.cursor = 0;
    }

    pub fn state(&self) -> &RobotState {
        &self.state
    }

    /// 用一次采样推进状态
    ///
    /// 采样无效时返回错误且不修改状态，下一次有效采样会积分整段经过时间。
    pub fn step(&mut self, sample: SensorSample, now: Instant) -> Result<RobotState, SampleError> {
        if !sample.angular_rate.is_finite() || !sample.wheel_sum.is_finite() {
            return Err(SampleError::NonFinite {
                angular_rate: sample.angular_rate,
                wheel_sum: sample.wheel_sum,
            });
        }
        if sample.angular_rate.abs() > self.max_rate {
            return Err(SampleError::RateOutOfRange {
                rate: sample.angular_rate,
                limit: self.max_rate,
            });
        }
        if now <= self.state.timestamp {
            return Err(SampleError::ClockNotAdvanced);
        }

        let dt = now.duration_since(self.state.timestamp).as_secs_f64();

        let delta = sample.wheel_sum - self.last_wheel_sum;
        self.last_wheel_sum = sample.wheel_sum;
        self.deltas[self.cursor] = delta;
        self.cursor = (self.cursor + 1) % VELOCITY_WINDOW;
        let window_sum: f64 = self.deltas.iter().sum();

        self.state = RobotState {
            angle: self.state.angle + sample.angular_rate * dt,
            angular_rate: sample.angular_rate,
            motor_position: self.state.motor_position + delta,
            motor_velocity: window_sum / VELOCITY_WINDOW as f64 / dt,
            timestamp: now,
        };
        Ok(self.state)
    }
}
