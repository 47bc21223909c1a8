//! 倒地检测行为
//!
//! 两次连续采样的平均倾角绝对值达到阈值即判定倒下。
//! 控制循环锁存故障（传感器/电机）时同样请求控制，走同一条恢复流程：
//! 挂起 → 提示操作员 → 等待确认 → 稳定延时 → 恢复 → 默认设定值。
//!
//! `act()` 在等待确认期间阻塞，不会被更高优先级的行为打断。

use crate::config::BehaviorConfig;
use crate::error::BehaviorError;
use balancebot_driver::BalanceLoop;
use balancebot_hal::{ConfirmationInput, Indicator, OperatorFeedback};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

const STATUS_LINE: u8 = 2;
const FAULT_LINE: u8 = 5;

/// 两个连续采样的平均倾角是否达到阈值
pub fn is_fallen(first: f64, second: f64, threshold: f64) -> bool {
    ((first + second) / 2.0).abs() >= threshold
}

pub struct FallDetection {
    balance_loop: BalanceLoop,
    confirmation: Arc<dyn ConfirmationInput>,
    feedback: OperatorFeedback,
    tilt_threshold: f64,
    settle_delay: Duration,
    previous_angle: Option<f64>,
}

impl FallDetection {
    pub const NAME: &'static str = "fall-detection";

    pub fn new(
        balance_loop: BalanceLoop,
        confirmation: Arc<dyn ConfirmationInput>,
        feedback: OperatorFeedback,
        config: &BehaviorConfig,
    ) -> Self {
        Self {
            balance_loop,
            confirmation,
            feedback,
            tilt_threshold: config.tilt_threshold,
            settle_delay: config.settle_delay(),
            previous_angle: None,
        }
    }

    pub fn wants_control(&mut self) -> bool {
        if self.balance_loop.fault().is_fault() {
            return true;
        }

        let angle = self.balance_loop.angle();
        match self.previous_angle.replace(angle) {
            Some(previous) => is_fallen(previous, angle, self.tilt_threshold),
            None => false,
        }
    }

    /// 挂起循环并阻塞等待操作员确认
    pub fn act(&mut self) -> Result<(), BehaviorError> {
        let fault = self.balance_loop.fault();
        if fault.is_fault() {
            warn!("Control loop reported {:?} fault, waiting for operator", fault);
        } else {
            info!(
                "Robot has fallen (angle {:.1}), suspending balance loop",
                self.balance_loop.angle()
            );
        }

        self.balance_loop.suspend()?;
        self.feedback.show_message("S U S P E N D E D !", STATUS_LINE);
        self.feedback.set_indicator(Indicator::Fallen);
        self.feedback.beep();

        self.confirmation.wait_for_confirmation()?;
        self.feedback.beep_sequence_up();

        thread::sleep(self.settle_delay);
        self.feedback.beep_sequence_up();

        self.balance_loop.resume();
        self.previous_angle = None;
        self.feedback.beep_sequence_up();

        self.feedback.clear_line(STATUS_LINE);
        if fault.is_fault() {
            self.feedback.clear_line(FAULT_LINE);
        }
        self.feedback.set_indicator(Indicator::Off);
        self.balance_loop.restore_defaults();
        info!("Balance loop resumed after operator confirmation");
        Ok(())
    }

    pub fn suppress(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use balancebot_driver::{BalanceConfig, LoopHardware};
    use balancebot_hal::mock::{
        AudioLog, ChannelConfirmation, ConfirmationTrigger, DisplayLog, MockGyro, MockMotor,
        MotorProbe, RecordingAudio, RecordingDisplay,
    };
    use std::time::Instant;

    #[test]
    fn test_is_fallen_averages_two_samples() {
        assert!(is_fallen(50.0, 44.0, 45.0));
        assert!(is_fallen(-50.0, -44.0, 45.0));
        assert!(is_fallen(45.0, 45.0, 45.0));
        assert!(!is_fallen(50.0, 30.0, 45.0));
        assert!(!is_fallen(10.0, 10.0, 45.0));
    }

    struct Rig {
        behavior: FallDetection,
        balance_loop: BalanceLoop,
        trigger: ConfirmationTrigger,
        left: Arc<MotorProbe>,
        display: DisplayLog,
        audio: Arc<AudioLog>,
    }

    fn rig() -> Rig {
        let (left_motor, left) = MockMotor::new();
        let (right_motor, _) = MockMotor::new();
        let (gyro, _) = MockGyro::new();
        let balance_loop = BalanceLoop::new(
            LoopHardware::new(left_motor, right_motor, gyro),
            BalanceConfig::default(),
        )
        .unwrap();
        let (trigger, confirmation) = ChannelConfirmation::new();
        let (display, display_log) = RecordingDisplay::new();
        let (audio, audio_log) = RecordingAudio::new();
        let config = BehaviorConfig {
            settle_delay_ms: 10,
            ..Default::default()
        };
        Rig {
            behavior: FallDetection::new(
                balance_loop.clone(),
                Arc::new(confirmation),
                OperatorFeedback::new(display, audio),
                &config,
            ),
            balance_loop,
            trigger,
            left,
            display: display_log,
            audio: audio_log,
        }
    }

    #[test]
    fn test_upright_robot_does_not_trigger() {
        let mut rig = rig();
        assert!(!rig.behavior.wants_control());
        assert!(!rig.behavior.wants_control());
    }

    #[test]
    fn test_act_suspends_until_confirmed() {
        let Rig {
            mut behavior,
            balance_loop,
            trigger,
            left,
            display,
            audio,
        } = rig();
        balance_loop.set_speed(-2.0);

        let worker = thread::spawn(move || {
            let result = behavior.act();
            (behavior, result)
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        while trigger.waiting() == 0 {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(1));
        }
        // 等待确认期间：循环挂起，两轮为零，提示已显示
        assert!(balance_loop.is_suspended());
        assert_eq!(left.power(), 0);
        assert_eq!(display.line(2).as_deref(), Some("S U S P E N D E D !"));
        assert_eq!(display.indicator(), Indicator::Fallen);
        assert_eq!(audio.beeps(), 1);

        trigger.confirm();
        let (_behavior, result) = worker.join().unwrap();
        result.unwrap();

        assert!(!balance_loop.is_suspended());
        assert_eq!(audio.sequences_up(), 3);
        assert_eq!(display.line(2), None);
        assert_eq!(display.indicator(), Indicator::Off);
        assert_eq!(balance_loop.speed(), 3.0);
        assert_eq!(balance_loop.angle(), -0.25);
    }

    #[test]
    fn test_disconnected_confirmation_is_error() {
        let Rig {
            mut behavior,
            balance_loop,
            trigger,
            ..
        } = rig();
        drop(trigger);
        assert!(matches!(
            behavior.act(),
            Err(BehaviorError::Hal(balancebot_hal::HalError::Disconnected))
        ));
        // 没有确认就不恢复
        assert!(balance_loop.is_suspended());
    }
}
