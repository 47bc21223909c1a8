//! 低电量保护（最高优先级）
//!
//! 电压不高于阈值时请求控制，显示充电提示并阻塞等待操作员确认，
//! 期间所有低优先级行为都不会运行。

use crate::config::BehaviorConfig;
use crate::error::BehaviorError;
use balancebot_hal::{BatteryMonitor, ConfirmationInput, Indicator, OperatorFeedback};
use std::sync::Arc;
use tracing::warn;

const WARNING_LINE: u8 = 3;

pub struct LowBatteryGuard {
    battery: Box<dyn BatteryMonitor + Send>,
    confirmation: Arc<dyn ConfirmationInput>,
    feedback: OperatorFeedback,
    min_voltage: f64,
    last_voltage: Option<f64>,
}

impl LowBatteryGuard {
    pub const NAME: &'static str = "low-battery";

    pub fn new(
        battery: impl BatteryMonitor + Send + 'static,
        confirmation: Arc<dyn ConfirmationInput>,
        feedback: OperatorFeedback,
        config: &BehaviorConfig,
    ) -> Self {
        Self {
            battery: Box::new(battery),
            confirmation,
            feedback,
            min_voltage: config.min_voltage,
            last_voltage: None,
        }
    }

    /// 最近一次成功读取的电压
    pub fn last_voltage(&self) -> Option<f64> {
        self.last_voltage
    }

    pub fn wants_control(&mut self) -> bool {
        match self.battery.read_voltage() {
            Ok(voltage) if voltage.is_finite() => {
                self.last_voltage = Some(voltage);
                voltage <= self.min_voltage
            },
            Ok(voltage) => {
                warn!("Ignoring non-finite battery reading: {}", voltage);
                false
            },
            Err(e) => {
                warn!("Battery read failed: {}", e);
                false
            },
        }
    }

    pub fn act(&mut self) -> Result<(), BehaviorError> {
        warn!(
            "Battery low ({:?} V <= {} V), waiting for operator",
            self.last_voltage, self.min_voltage
        );
        self.feedback.beep_sequence_up();
        self.feedback.clear();
        self.feedback.show_message("LOW BATTERY! CHARGE NOW", WARNING_LINE);
        self.feedback.set_indicator(Indicator::Warning);

        self.confirmation.wait_for_confirmation()?;
        Ok(())
    }

    /// 清除充电提示
    pub fn suppress(&mut self) {
        self.feedback.clear_line(WARNING_LINE);
        self.feedback.set_indicator(Indicator::Off);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use balancebot_hal::mock::{ChannelConfirmation, MockBattery, RecordingAudio, RecordingDisplay};
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_threshold() {
        let (battery, voltage) = MockBattery::new(7.0);
        let (_trigger, confirmation) = ChannelConfirmation::new();
        let (display, _) = RecordingDisplay::new();
        let (audio, _) = RecordingAudio::new();
        let mut guard = LowBatteryGuard::new(
            battery,
            Arc::new(confirmation),
            OperatorFeedback::new(display, audio),
            &BehaviorConfig::default(),
        );

        assert!(!guard.wants_control());
        assert_eq!(guard.last_voltage(), Some(7.0));
        voltage.set(6.1);
        assert!(guard.wants_control());
        voltage.set(6.0);
        assert!(guard.wants_control());
        voltage.set(f64::NAN);
        assert!(!guard.wants_control());
        voltage.set(5.0);
        voltage.set_fail_read(true);
        assert!(!guard.wants_control());
    }

    #[test]
    fn test_act_blocks_until_confirmed_and_suppress_clears() {
        let (battery, _voltage) = MockBattery::new(6.0);
        let (trigger, confirmation) = ChannelConfirmation::new();
        let (display, display_log) = RecordingDisplay::new();
        let (audio, audio_log) = RecordingAudio::new();
        let mut guard = LowBatteryGuard::new(
            battery,
            Arc::new(confirmation),
            OperatorFeedback::new(display, audio),
            &BehaviorConfig::default(),
        );
        assert!(guard.wants_control());

        let worker = thread::spawn(move || {
            guard.act().unwrap();
            guard
        });
        let deadline = Instant::now() + Duration::from_secs(5);
        while trigger.waiting() == 0 {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(
            display_log.line(3).as_deref(),
            Some("LOW BATTERY! CHARGE NOW")
        );
        assert_eq!(audio_log.sequences_up(), 1);
        assert!(!worker.is_finished());

        trigger.confirm();
        let mut guard = worker.join().unwrap();
        guard.suppress();
        assert_eq!(display_log.line(3), None);
        assert_eq!(display_log.indicator(), Indicator::Off);
    }
}
