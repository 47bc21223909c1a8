//! 避障行为
//!
//! 前方距离不超过阈值时请求控制：后退一段时间，然后边后退边转向，最后恢复默认设定值。
//! 每次扫描都会把测得的距离显示在第 3 行。

use crate::config::BehaviorConfig;
use crate::error::BehaviorError;
use balancebot_driver::BalanceLoop;
use balancebot_hal::{Indicator, OperatorFeedback, ProximitySensor};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

const DISTANCE_LINE: u8 = 3;
const MANEUVER_LINE: u8 = 4;

pub struct ObstacleAvoidance {
    proximity: Box<dyn ProximitySensor + Send>,
    balance_loop: BalanceLoop,
    feedback: OperatorFeedback,
    threshold: f64,
    reverse_speed: f64,
    reverse_duration: Duration,
    avoid_turn: f64,
    turn_duration: Duration,
}

impl ObstacleAvoidance {
    pub const NAME: &'static str = "obstacle-avoidance";

    pub fn new(
        proximity: impl ProximitySensor + Send + 'static,
        balance_loop: BalanceLoop,
        feedback: OperatorFeedback,
        config: &BehaviorConfig,
    ) -> Self {
        Self {
            proximity: Box::new(proximity),
            balance_loop,
            feedback,
            threshold: config.obstacle_distance,
            reverse_speed: config.reverse_speed,
            reverse_duration: config.reverse_duration(),
            avoid_turn: config.avoid_turn,
            turn_duration: config.turn_duration(),
        }
    }

    pub fn wants_control(&mut self) -> bool {
        let distance = match self.proximity.read_distance() {
            Ok(distance) if distance.is_finite() => distance,
            Ok(distance) => {
                warn!("Ignoring non-finite distance reading: {}", distance);
                return false;
            },
            Err(e) => {
                warn!("Proximity sensor read failed: {}", e);
                return false;
            },
        };

        self.feedback
            .show_message(&format!("dist: {:.2}", distance), DISTANCE_LINE);
        distance <= self.threshold
    }

    /// 阻塞执行避障机动
    pub fn act(&mut self) -> Result<(), BehaviorError> {
        info!("Obstacle ahead, reversing");
        self.feedback.set_indicator(Indicator::Avoiding);
        self.feedback.show_message("R E V E R S I N G !", MANEUVER_LINE);

        self.balance_loop.set_speed(self.reverse_speed);
        thread::sleep(self.reverse_duration);

        self.balance_loop.set_turn(self.avoid_turn);
        thread::sleep(self.turn_duration);

        self.finish();
        info!("Obstacle maneuver complete");
        Ok(())
    }

    pub fn suppress(&mut self) {
        self.finish();
    }

    fn finish(&self) {
        self.balance_loop.restore_defaults();
        self.feedback.clear_line(MANEUVER_LINE);
        self.feedback.set_indicator(Indicator::Off);
    }
}
