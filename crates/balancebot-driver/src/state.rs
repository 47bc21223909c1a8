//! 跨线程共享状态
//!
//! 控制线程和仲裁线程之间只通过这里的字段通信：
//!
//! - [`SharedSetpoints`]：速度/转向设定值，每个字段独立原子读写
//! - [`LoopControl`]：挂起标志、代次计数、挂起确认、故障锁存
//! - [`LoopContext`]：控制线程发布的最新 [`RobotState`] 和 [`ControlCommand`]（ArcSwap 无锁读取）
//!
//! 没有需要整体原子化的多字段事务，因此不使用锁。

use crate::controller::{ControlCommand, Setpoints};
use crate::estimator::RobotState;
use arc_swap::ArcSwap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::Instant;
use tracing::warn;

/// f64 的原子存储（按位存入 AtomicU64）
#[derive(Debug, Default)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn load(&self, ordering: Ordering) -> f64 {
        f64::from_bits(self.0.load(ordering))
    }

    pub fn store(&self, value: f64, ordering: Ordering) {
        self.0.store(value.to_bits(), ordering);
    }
}

/// 速度/转向设定值
///
/// 仲裁线程写，控制线程每个 tick 读。写入前先限幅，非有限值直接忽略。
#[derive(Debug)]
pub struct SharedSetpoints {
    speed: AtomicF64,
    turn: AtomicF64,
    max_speed: f64,
    max_turn: f64,
}

impl SharedSetpoints {
    pub fn new(default_speed: f64, max_speed: f64, max_turn: f64) -> Self {
        Self {
            speed: AtomicF64::new(default_speed.clamp(-max_speed, max_speed)),
            turn: AtomicF64::new(0.0),
            max_speed,
            max_turn,
        }
    }

    pub fn set_speed(&self, speed: f64) {
        if !speed.is_finite() {
            warn!("Ignoring non-finite speed setpoint: {}", speed);
            return;
        }
        self.speed
            .store(speed.clamp(-self.max_speed, self.max_speed), Ordering::Release);
    }

    pub fn set_turn(&self, turn: f64) {
        if !turn.is_finite() {
            warn!("Ignoring non-finite turn setpoint: {}", turn);
            return;
        }
        self.turn
            .store(turn.clamp(-self.max_turn, self.max_turn), Ordering::Release);
    }

    pub fn speed(&self) -> f64 {
        self.speed.load(Ordering::Acquire)
    }

    pub fn turn(&self) -> f64 {
        self.turn.load(Ordering::Acquire)
    }

    /// 当前设定值快照（两个字段分别读取）
    pub fn snapshot(&self) -> Setpoints {
        Setpoints {
            speed: self.speed(),
            turn: self.turn(),
        }
    }
}

/// 控制循环锁存的故障
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum LoopFault {
    /// 无故障
    #[default]
    None = 0,
    /// 传感器连续读取失败
    Sensor = 1,
    /// 电机拒绝命令
    Actuator = 2,
}

impl LoopFault {
    /// 从 u8 转换，无效值视为 None
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Sensor,
            2 => Self::Actuator,
            _ => Self::None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_fault(self) -> bool {
        self != Self::None
    }

    /// 显示在操作员屏幕上的文本
    pub fn operator_message(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Sensor => Some("SENSOR FAULT"),
            Self::Actuator => Some("MOTOR FAULT"),
        }
    }
}

/// 循环控制字段
///
/// - `suspended`：为 true 时控制线程保持零输出、跳过反馈计算
/// - `generation`：每次 `resume()` 加一，控制线程发现变化即重新进入预热阶段
/// - `suspend_requests` / `suspend_acks`：`suspend()` 等待控制线程确认两轮已清零
/// - `fault`：控制线程自行挂起时锁存的原因
#[derive(Debug, Default)]
pub struct LoopControl {
    suspended: AtomicBool,
    generation: AtomicU64,
    suspend_requests: AtomicU64,
    suspend_acks: AtomicU64,
    fault: AtomicU8,
}

impl LoopControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    /// 请求挂起，返回本次请求的序号（用于等待确认）
    ///
    /// 先置挂起标志再发放序号：控制线程看到序号时必然也看到标志，
    /// 确认只会在两轮清零且不再计算输出之后发生。
    pub fn request_suspend(&self) -> u64 {
        self.raise_suspend_flag();
        self.issue_suspend_ticket()
    }

    pub(crate) fn raise_suspend_flag(&self) {
        self.suspended.store(true, Ordering::Release);
    }

    pub(crate) fn issue_suspend_ticket(&self) -> u64 {
        self.suspend_requests.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// 控制线程：是否有尚未确认的挂起请求
    pub fn pending_suspend(&self) -> Option<u64> {
        let requested = self.suspend_requests.load(Ordering::Acquire);
        (requested > self.suspend_acks.load(Ordering::Acquire)).then_some(requested)
    }

    /// 控制线程：两轮已清零
    pub fn acknowledge_suspend(&self, ticket: u64) {
        self.suspend_acks.fetch_max(ticket, Ordering::AcqRel);
    }

    pub fn is_acknowledged(&self, ticket: u64) -> bool {
        self.suspend_acks.load(Ordering::Acquire) >= ticket
    }

    /// 清除挂起标志和故障，开启新代次
    pub fn resume(&self) -> u64 {
        self.fault.store(LoopFault::None.as_u8(), Ordering::Release);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.suspended.store(false, Ordering::Release);
        generation
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// 控制线程锁存故障并挂起
    pub fn latch_fault(&self, fault: LoopFault) {
        self.fault.store(fault.as_u8(), Ordering::Release);
        self.suspended.store(true, Ordering::Release);
    }

    pub fn fault(&self) -> LoopFault {
        LoopFault::from_u8(self.fault.load(Ordering::Acquire))
    }
}

/// 控制线程发布的数据
#[derive(Debug)]
pub struct LoopContext {
    pub setpoints: SharedSetpoints,
    pub control: LoopControl,
    state: ArcSwap<RobotState>,
    command: ArcSwap<ControlCommand>,
}

impl LoopContext {
    pub fn new(setpoints: SharedSetpoints, starting_angle: f64) -> Self {
        Self {
            setpoints,
            control: LoopControl::new(),
            state: ArcSwap::from_pointee(RobotState::initial(starting_angle, Instant::now())),
            command: ArcSwap::from_pointee(ControlCommand::ZERO),
        }
    }

    /// 最新状态（无锁）
    pub fn state(&self) -> RobotState {
        **self.state.load()
    }

    pub fn publish_state(&self, state: RobotState) {
        self.state.store(Arc::new(state));
    }

    /// 最近一次写入电机的命令（无锁）
    pub fn last_command(&self) -> ControlCommand {
        **self.command.load()
    }

    pub fn publish_command(&self, command: ControlCommand) {
        self.command.store(Arc::new(command));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_setpoints_clamp_and_ignore_non_finite() {
        let setpoints = SharedSetpoints::new(3.0, 5.0, 5.0);
        assert_eq!(setpoints.speed(), 3.0);
        assert_eq!(setpoints.turn(), 0.0);

        setpoints.set_speed(12.0);
        assert_eq!(setpoints.speed(), 5.0);
        setpoints.set_speed(-7.5);
        assert_eq!(setpoints.speed(), -5.0);
        setpoints.set_turn(2.0);
        assert_eq!(setpoints.turn(), 2.0);

        setpoints.set_speed(f64::NAN);
        setpoints.set_turn(f64::INFINITY);
        assert_eq!(
            setpoints.snapshot(),
            Setpoints {
                speed: -5.0,
                turn: 2.0
            }
        );
    }

    #[test]
    fn test_setpoints_concurrent_writes_stay_in_bounds() {
        let setpoints = Arc::new(SharedSetpoints::new(3.0, 5.0, 5.0));
        let writer = {
            let setpoints = setpoints.clone();
            thread::spawn(move || {
                for i in 0..10_000 {
                    setpoints.set_speed((i % 21) as f64 - 10.0);
                    setpoints.set_turn(10.0 - (i % 21) as f64);
                }
            })
        };
        for _ in 0..10_000 {
            let sp = setpoints.snapshot();
            assert!((-5.0..=5.0).contains(&sp.speed));
            assert!((-5.0..=5.0).contains(&sp.turn));
        }
        writer.join().unwrap();
    }

    #[test]
    fn test_loop_fault_conversions() {
        for fault in [LoopFault::None, LoopFault::Sensor, LoopFault::Actuator] {
            assert_eq!(LoopFault::from_u8(fault.as_u8()), fault);
        }
        assert_eq!(LoopFault::from_u8(200), LoopFault::None);
        assert_eq!(LoopFault::Sensor.operator_message(), Some("SENSOR FAULT"));
        assert_eq!(LoopFault::Actuator.operator_message(), Some("MOTOR FAULT"));
        assert!(!LoopFault::None.is_fault());
    }

    #[test]
    fn test_suspend_ack_protocol() {
        let control = LoopControl::new();
        assert!(!control.is_suspended());
        assert_eq!(control.pending_suspend(), None);

        let ticket = control.request_suspend();
        assert!(control.is_suspended());
        assert_eq!(control.pending_suspend(), Some(ticket));
        assert!(!control.is_acknowledged(ticket));

        control.acknowledge_suspend(ticket);
        assert!(control.is_acknowledged(ticket));
        assert_eq!(control.pending_suspend(), None);
    }

    #[test]
    fn test_resume_bumps_generation_and_clears_fault() {
        let control = LoopControl::new();
        control.latch_fault(LoopFault::Sensor);
        assert!(control.is_suspended());
        assert_eq!(control.fault(), LoopFault::Sensor);

        let generation = control.resume();
        assert_eq!(generation, 1);
        assert_eq!(control.generation(), 1);
        assert!(!control.is_suspended());
        assert_eq!(control.fault(), LoopFault::None);
    }

    #[test]
    fn test_context_publishing() {
        let ctx = LoopContext::new(SharedSetpoints::new(3.0, 5.0, 5.0), -0.25);
        assert_eq!(ctx.state().angle, -0.25);
        assert!(ctx.last_command().is_zero());

        let mut state = ctx.state();
        state.angle = 12.0;
        ctx.publish_state(state);
        ctx.publish_command(ControlCommand { left: 5, right: -5 });
        assert_eq!(ctx.state().angle, 12.0);
        assert_eq!(ctx.last_command(), ControlCommand { left: 5, right: -5 });
    }
}
