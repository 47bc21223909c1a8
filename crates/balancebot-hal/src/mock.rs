//! Mock 硬件
//!
//! 无硬件依赖的模拟设备，用于单元测试、集成测试和仿真程序。
//! 每个设备构造时返回一个共享的 probe，测试代码通过 probe 注入读数、
//! 注入故障并观察设备收到的命令。

use crate::{
    AudioSignal, BatteryMonitor, ConfirmationInput, GyroSensor, HalDeviceError,
    HalDeviceErrorKind, HalError, Indicator, MotorActuator, OperatorDisplay, ProximitySensor,
};
use crossbeam_channel::{Receiver, Sender};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// f64 的原子存储（按位存入 AtomicU64）
#[derive(Debug, Default)]
struct AtomicReading(AtomicU64);

impl AtomicReading {
    fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

// ============================================================
// 电机
// ============================================================

/// 模拟电机的观测/注入接口
#[derive(Debug, Default)]
pub struct MotorProbe {
    power: AtomicI32,
    position: AtomicReading,
    spin_per_read: AtomicReading,
    fail_power: AtomicBool,
    fail_read: AtomicBool,
    resets: AtomicU64,
    commands: AtomicU64,
    history: Mutex<Vec<i32>>,
}

impl MotorProbe {
    /// 最近一次成功设置的功率
    pub fn power(&self) -> i32 {
        self.power.load(Ordering::Relaxed)
    }

    /// 成功执行的功率命令次数
    pub fn command_count(&self) -> u64 {
        self.commands.load(Ordering::Relaxed)
    }

    /// 全部功率命令历史
    pub fn power_history(&self) -> Vec<i32> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    pub fn set_position(&self, degrees: f64) {
        self.position.set(degrees);
    }

    /// 每次读取位置时自动累加的转角（模拟轮子转动）
    pub fn set_spin_per_read(&self, degrees: f64) {
        self.spin_per_read.set(degrees);
    }

    pub fn set_fail_power(&self, fail: bool) {
        self.fail_power.store(fail, Ordering::Relaxed);
    }

    pub fn set_fail_read(&self, fail: bool) {
        self.fail_read.store(fail, Ordering::Relaxed);
    }

    pub fn reset_count(&self) -> u64 {
        self.resets.load(Ordering::Relaxed)
    }
}

/// 模拟电机
pub struct MockMotor {
    probe: Arc<MotorProbe>,
}

impl MockMotor {
    pub fn new() -> (Self, Arc<MotorProbe>) {
        let probe = Arc::new(MotorProbe::default());
        (
            Self {
                probe: probe.clone(),
            },
            probe,
        )
    }
}

impl MotorActuator for MockMotor {
    fn set_power(&mut self, percent: i32) -> Result<(), HalError> {
        if self.probe.fail_power.load(Ordering::Relaxed) {
            return Err(HalError::Device(HalDeviceError::new(
                HalDeviceErrorKind::Rejected,
                "power command rejected",
            )));
        }
        self.probe.power.store(percent, Ordering::Relaxed);
        self.probe.commands.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut history) = self.probe.history.lock() {
            history.push(percent);
        }
        Ok(())
    }

    fn reset_position(&mut self) -> Result<(), HalError> {
        self.probe.position.set(0.0);
        self.probe.resets.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn position(&mut self) -> Result<f64, HalError> {
        if self.probe.fail_read.load(Ordering::Relaxed) {
            return Err(HalError::Timeout);
        }
        let next = self.probe.position.get() + self.probe.spin_per_read.get();
        self.probe.position.set(next);
        Ok(next)
    }
}

// ============================================================
// 陀螺仪
// ============================================================

/// 模拟陀螺仪的观测/注入接口
#[derive(Debug, Default)]
pub struct GyroProbe {
    rate: AtomicReading,
    fail_read: AtomicBool,
    resets: AtomicU64,
    reads: AtomicU64,
}

impl GyroProbe {
    pub fn set_rate(&self, deg_per_sec: f64) {
        self.rate.set(deg_per_sec);
    }

    pub fn set_fail_read(&self, fail: bool) {
        self.fail_read.store(fail, Ordering::Relaxed);
    }

    pub fn reset_count(&self) -> u64 {
        self.resets.load(Ordering::Relaxed)
    }

    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}

/// 模拟陀螺仪
pub struct MockGyro {
    probe: Arc<GyroProbe>,
}

impl MockGyro {
    pub fn new() -> (Self, Arc<GyroProbe>) {
        let probe = Arc::new(GyroProbe::default());
        (
            Self {
                probe: probe.clone(),
            },
            probe,
        )
    }
}

impl GyroSensor for MockGyro {
    fn reset(&mut self) -> Result<(), HalError> {
        self.probe.resets.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn read_angular_rate(&mut self) -> Result<f64, HalError> {
        self.probe.reads.fetch_add(1, Ordering::Relaxed);
        if self.probe.fail_read.load(Ordering::Relaxed) {
            return Err(HalError::Timeout);
        }
        Ok(self.probe.rate.get())
    }
}

// ============================================================
// 标量传感器（测距 / 电压）
// ============================================================

/// 标量读数的观测/注入接口
#[derive(Debug)]
pub struct ReadingProbe {
    value: AtomicReading,
    fail_read: AtomicBool,
    reads: AtomicU64,
}

impl ReadingProbe {
    fn new(initial: f64) -> Self {
        Self {
            value: AtomicReading::new(initial),
            fail_read: AtomicBool::new(false),
            reads: AtomicU64::new(0),
        }
    }

    pub fn set(&self, value: f64) {
        self.value.set(value);
    }

    pub fn get(&self) -> f64 {
        self.value.get()
    }

    pub fn set_fail_read(&self, fail: bool) {
        self.fail_read.store(fail, Ordering::Relaxed);
    }

    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    fn read(&self) -> Result<f64, HalError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        if self.fail_read.load(Ordering::Relaxed) {
            return Err(HalError::Timeout);
        }
        Ok(self.value.get())
    }
}

/// 模拟超声波测距
pub struct MockProximity {
    probe: Arc<ReadingProbe>,
}

impl MockProximity {
    /// 初始距离（米）
    pub fn new(distance: f64) -> (Self, Arc<ReadingProbe>) {
        let probe = Arc::new(ReadingProbe::new(distance));
        (
            Self {
                probe: probe.clone(),
            },
            probe,
        )
    }
}

impl ProximitySensor for MockProximity {
    fn read_distance(&mut self) -> Result<f64, HalError> {
        self.probe.read()
    }
}

/// 模拟电池
pub struct MockBattery {
    probe: Arc<ReadingProbe>,
}

impl MockBattery {
    /// 初始电压（伏特）
    pub fn new(voltage: f64) -> (Self, Arc<ReadingProbe>) {
        let probe = Arc::new(ReadingProbe::new(voltage));
        (
            Self {
                probe: probe.clone(),
            },
            probe,
        )
    }
}

impl BatteryMonitor for MockBattery {
    fn read_voltage(&mut self) -> Result<f64, HalError> {
        self.probe.read()
    }
}

// ============================================================
// 确认输入
// ============================================================

/// 确认信号的发送端（测试代码/仿真程序持有）
#[derive(Clone)]
pub struct ConfirmationTrigger {
    tx: Sender<()>,
    waiting: Arc<AtomicUsize>,
}

impl ConfirmationTrigger {
    /// 发送一次确认
    pub fn confirm(&self) {
        let _ = self.tx.send(());
    }

    /// 当前阻塞在 `wait_for_confirmation()` 上的调用方数量
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }
}

/// 基于 channel 的确认输入
///
/// 所有 trigger 被丢弃后，`wait_for_confirmation()` 返回 `HalError::Disconnected`。
pub struct ChannelConfirmation {
    rx: Receiver<()>,
    waiting: Arc<AtomicUsize>,
    auto_confirm_after: Option<Duration>,
}

impl ChannelConfirmation {
    pub fn new() -> (ConfirmationTrigger, Self) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let waiting = Arc::new(AtomicUsize::new(0));
        (
            ConfirmationTrigger {
                tx,
                waiting: waiting.clone(),
            },
            Self {
                rx,
                waiting,
                auto_confirm_after: None,
            },
        )
    }

    /// 超过指定时间未收到确认时自动确认（仿真用）
    pub fn with_auto_confirm(mut self, after: Duration) -> Self {
        self.auto_confirm_after = Some(after);
        self
    }
}

impl ConfirmationInput for ChannelConfirmation {
    fn wait_for_confirmation(&self) -> Result<(), HalError> {
        self.waiting.fetch_add(1, Ordering::AcqRel);
        let result = match self.auto_confirm_after {
            Some(after) => match self.rx.recv_timeout(after) {
                Ok(()) | Err(crossbeam_channel::RecvTimeoutError::Timeout) => Ok(()),
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    Err(HalError::Disconnected)
                },
            },
            None => self.rx.recv().map_err(|_| HalError::Disconnected),
        };
        self.waiting.fetch_sub(1, Ordering::AcqRel);
        result
    }
}

// ============================================================
// 显示屏 / 蜂鸣器
// ============================================================

/// 显示屏事件
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayEvent {
    Show { text: String, line: u8 },
    ClearLine(u8),
    Clear,
    Indicator(Indicator),
}

#[derive(Debug, Default)]
struct DisplayState {
    lines: BTreeMap<u8, String>,
    indicator: Indicator,
    events: Vec<DisplayEvent>,
}

/// 显示屏内容的观测接口
#[derive(Debug, Clone, Default)]
pub struct DisplayLog {
    state: Arc<Mutex<DisplayState>>,
}

impl DisplayLog {
    /// 指定行当前显示的文本
    pub fn line(&self, line: u8) -> Option<String> {
        self.state.lock().ok()?.lines.get(&line).cloned()
    }

    pub fn indicator(&self) -> Indicator {
        self.state.lock().map(|s| s.indicator).unwrap_or_default()
    }

    pub fn events(&self) -> Vec<DisplayEvent> {
        self.state.lock().map(|s| s.events.clone()).unwrap_or_default()
    }

    fn record(&self, event: DisplayEvent) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        match &event {
            DisplayEvent::Show { text, line } => {
                state.lines.insert(*line, text.clone());
            },
            DisplayEvent::ClearLine(line) => {
                state.lines.remove(line);
            },
            DisplayEvent::Clear => state.lines.clear(),
            DisplayEvent::Indicator(indicator) => state.indicator = *indicator,
        }
        state.events.push(event);
    }
}

/// 记录所有操作的显示屏
pub struct RecordingDisplay {
    log: DisplayLog,
}

impl RecordingDisplay {
    pub fn new() -> (Self, DisplayLog) {
        let log = DisplayLog::default();
        (Self { log: log.clone() }, log)
    }
}

impl OperatorDisplay for RecordingDisplay {
    fn show_message(&mut self, text: &str, line: u8) {
        self.log.record(DisplayEvent::Show {
            text: text.to_string(),
            line,
        });
    }

    fn clear_line(&mut self, line: u8) {
        self.log.record(DisplayEvent::ClearLine(line));
    }

    fn clear(&mut self) {
        self.log.record(DisplayEvent::Clear);
    }

    fn set_indicator(&mut self, indicator: Indicator) {
        self.log.record(DisplayEvent::Indicator(indicator));
    }
}

/// 蜂鸣器计数
#[derive(Debug, Default)]
pub struct AudioLog {
    beeps: AtomicU64,
    sequences: AtomicU64,
}

impl AudioLog {
    pub fn beeps(&self) -> u64 {
        self.beeps.load(Ordering::Relaxed)
    }

    pub fn sequences_up(&self) -> u64 {
        self.sequences.load(Ordering::Relaxed)
    }
}

/// 记录调用次数的蜂鸣器
pub struct RecordingAudio {
    log: Arc<AudioLog>,
}

impl RecordingAudio {
    pub fn new() -> (Self, Arc<AudioLog>) {
        let log = Arc::new(AudioLog::default());
        (Self { log: log.clone() }, log)
    }
}

impl AudioSignal for RecordingAudio {
    fn beep(&mut self) {
        self.log.beeps.fetch_add(1, Ordering::Relaxed);
    }

    fn beep_sequence_up(&mut self) {
        self.log.sequences.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_mock_motor_records_commands() {
        let (mut motor, probe) = MockMotor::new();
        motor.set_power(40).unwrap();
        motor.set_power(-12).unwrap();
        assert_eq!(probe.power(), -12);
        assert_eq!(probe.power_history(), vec![40, -12]);
        assert_eq!(probe.command_count(), 2);

        probe.set_fail_power(true);
        assert!(motor.set_power(10).is_err());
        assert_eq!(probe.power(), -12);
    }

    #[test]
    fn test_mock_motor_spin_and_reset() {
        let (mut motor, probe) = MockMotor::new();
        probe.set_spin_per_read(2.5);
        assert_eq!(motor.position().unwrap(), 2.5);
        assert_eq!(motor.position().unwrap(), 5.0);

        motor.reset_position().unwrap();
        assert_eq!(probe.reset_count(), 1);
        assert_eq!(motor.position().unwrap(), 2.5);

        probe.set_fail_read(true);
        assert!(matches!(motor.position(), Err(HalError::Timeout)));
    }

    #[test]
    fn test_mock_gyro() {
        let (mut gyro, probe) = MockGyro::new();
        probe.set_rate(12.5);
        assert_eq!(gyro.read_angular_rate().unwrap(), 12.5);
        gyro.reset().unwrap();
        assert_eq!(probe.reset_count(), 1);
        probe.set_fail_read(true);
        assert!(gyro.read_angular_rate().is_err());
        assert_eq!(probe.read_count(), 2);
    }

    #[test]
    fn test_scalar_sensors() {
        let (mut sonar, distance) = MockProximity::new(1.2);
        let (mut battery, voltage) = MockBattery::new(7.4);
        assert_eq!(sonar.read_distance().unwrap(), 1.2);
        assert_eq!(battery.read_voltage().unwrap(), 7.4);

        distance.set(0.2);
        voltage.set(6.0);
        assert_eq!(sonar.read_distance().unwrap(), 0.2);
        assert_eq!(battery.read_voltage().unwrap(), 6.0);
    }

    #[test]
    fn test_channel_confirmation_blocks_until_confirmed() {
        let (trigger, input) = ChannelConfirmation::new();

        let waiter = thread::spawn(move || input.wait_for_confirmation());
        while trigger.waiting() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        trigger.confirm();
        assert!(waiter.join().unwrap().is_ok());
        assert_eq!(trigger.waiting(), 0);
    }

    #[test]
    fn test_channel_confirmation_disconnected() {
        let (trigger, input) = ChannelConfirmation::new();
        drop(trigger);
        assert!(matches!(
            input.wait_for_confirmation(),
            Err(HalError::Disconnected)
        ));
    }

    #[test]
    fn test_auto_confirm() {
        let (_trigger, input) = ChannelConfirmation::new();
        let input = input.with_auto_confirm(Duration::from_millis(5));
        assert!(input.wait_for_confirmation().is_ok());
    }

    #[test]
    fn test_recording_display() {
        let (mut display, log) = RecordingDisplay::new();
        display.show_message("dist: 0.5", 3);
        display.show_message("R E V E R S I N G !", 4);
        display.set_indicator(Indicator::Avoiding);
        assert_eq!(log.line(3).as_deref(), Some("dist: 0.5"));
        assert_eq!(log.indicator(), Indicator::Avoiding);

        display.clear_line(3);
        assert_eq!(log.line(3), None);
        display.clear();
        assert_eq!(log.line(4), None);
        assert_eq!(log.events().len(), 5);
    }

    #[test]
    fn test_recording_audio() {
        let (mut audio, log) = RecordingAudio::new();
        audio.beep();
        audio.beep_sequence_up();
        audio.beep_sequence_up();
        assert_eq!(log.beeps(), 1);
        assert_eq!(log.sequences_up(), 2);
    }
}
