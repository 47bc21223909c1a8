//! 集成测试公共工具：全部使用 mock 设备装配的机器人

#![allow(dead_code)]

use balancebot_sdk::driver::BalanceConfig;
use balancebot_sdk::hal::OperatorFeedback;
use balancebot_sdk::hal::mock::{
    AudioLog, ChannelConfirmation, ConfirmationTrigger, DisplayLog, GyroProbe, MockBattery,
    MockGyro, MockMotor, MockProximity, MotorProbe, ReadingProbe, RecordingAudio,
    RecordingDisplay,
};
use balancebot_sdk::{
    BehaviorConfig, BehaviorError, LoopHardware, Robot, RobotConfig, RobotDevices,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// 短周期、短机动时长的配置
pub fn fast_config() -> RobotConfig {
    RobotConfig {
        balance: BalanceConfig {
            period_ms: 2,
            max_consecutive_sensor_faults: 5,
            realtime_priority: false,
            ..Default::default()
        },
        behavior: BehaviorConfig {
            reverse_duration_ms: 20,
            turn_duration_ms: 20,
            settle_delay_ms: 5,
            idle_poll_ms: 1,
            ..Default::default()
        },
    }
}

pub struct MockRobot {
    pub robot: Robot,
    pub left: Arc<MotorProbe>,
    pub right: Arc<MotorProbe>,
    pub gyro: Arc<GyroProbe>,
    pub proximity: Arc<ReadingProbe>,
    pub battery: Arc<ReadingProbe>,
    pub trigger: ConfirmationTrigger,
    pub display: DisplayLog,
    pub audio: Arc<AudioLog>,
}

/// 前方 1 米无障碍、电池 7.2V 的机器人
pub fn mock_robot() -> MockRobot {
    mock_robot_with(fast_config())
}

pub fn mock_robot_with(config: RobotConfig) -> MockRobot {
    try_mock_robot(config).unwrap()
}

pub fn try_mock_robot(config: RobotConfig) -> Result<MockRobot, BehaviorError> {
    let (left_motor, left) = MockMotor::new();
    let (right_motor, right) = MockMotor::new();
    let (gyro_sensor, gyro) = MockGyro::new();
    let (proximity_sensor, proximity) = MockProximity::new(1.0);
    let (battery_monitor, battery) = MockBattery::new(7.2);
    let (trigger, confirmation) = ChannelConfirmation::new();
    let (display_device, display) = RecordingDisplay::new();
    let (audio_device, audio) = RecordingAudio::new();

    let devices = RobotDevices {
        hardware: LoopHardware::new(left_motor, right_motor, gyro_sensor),
        proximity: Box::new(proximity_sensor),
        battery: Box::new(battery_monitor),
        confirmation: Arc::new(confirmation),
        feedback: OperatorFeedback::new(display_device, audio_device),
    };

    Ok(MockRobot {
        robot: Robot::new(config, devices)?,
        left,
        right,
        gyro,
        proximity,
        battery,
        trigger,
        display,
        audio,
    })
}

/// 轮询直到条件成立，超时则 panic
pub fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(1));
    }
}
