//! 行为层配置

use crate::error::BehaviorError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 行为参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// 触发避障的前方距离（米）
    pub obstacle_distance: f64,
    /// 避障后退速度
    pub reverse_speed: f64,
    /// 后退时长（毫秒）
    pub reverse_duration_ms: u64,
    /// 避障转向差速
    pub avoid_turn: f64,
    /// 转向时长（毫秒）
    pub turn_duration_ms: u64,
    /// 判定倒下的倾角（度）
    pub tilt_threshold: f64,
    /// 操作员确认后等待稳定的时间（毫秒）
    pub settle_delay_ms: u64,
    /// 低电量阈值（伏特）
    pub min_voltage: f64,
    /// 没有行为请求控制时仲裁循环的轮询间隔（毫秒）
    pub idle_poll_ms: u64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            obstacle_distance: 0.30,
            reverse_speed: -3.0,
            reverse_duration_ms: 2000,
            avoid_turn: 5.0,
            turn_duration_ms: 3000,
            tilt_threshold: 45.0,
            settle_delay_ms: 1000,
            min_voltage: 6.1,
            idle_poll_ms: 20,
        }
    }
}

impl BehaviorConfig {
    pub fn reverse_duration(&self) -> Duration {
        Duration::from_millis(self.reverse_duration_ms)
    }

    pub fn turn_duration(&self) -> Duration {
        Duration::from_millis(self.turn_duration_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn validate(&self) -> Result<(), BehaviorError> {
        for (name, value) in [
            ("obstacle_distance", self.obstacle_distance),
            ("tilt_threshold", self.tilt_threshold),
            ("min_voltage", self.min_voltage),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(BehaviorError::InvalidConfig(format!(
                    "{} must be a positive finite number, got {}",
                    name, value
                )));
            }
        }
        if !self.reverse_speed.is_finite() || !self.avoid_turn.is_finite() {
            return Err(BehaviorError::InvalidConfig(
                "reverse_speed and avoid_turn must be finite".to_string(),
            ));
        }
        if self.idle_poll_ms == 0 {
            return Err(BehaviorError::InvalidConfig(
                "idle_poll_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BehaviorConfig::default();
        assert_eq!(config.obstacle_distance, 0.30);
        assert_eq!(config.reverse_duration(), Duration::from_secs(2));
        assert_eq!(config.turn_duration(), Duration::from_secs(3));
        assert_eq!(config.settle_delay(), Duration::from_secs(1));
        assert_eq!(config.min_voltage, 6.1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        let config = BehaviorConfig {
            tilt_threshold: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BehaviorError::InvalidConfig(_))
        ));

        let config = BehaviorConfig {
            idle_poll_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = BehaviorConfig {
            reverse_speed: f64::NEG_INFINITY,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
