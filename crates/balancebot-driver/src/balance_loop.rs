//! 平衡控制循环（对外 API）
//!
//! [`BalanceLoop`] 是一个可 Clone 的句柄，行为层持有它来启动循环、挂起/恢复、
//! 修改设定值和读取最新状态。最后一个句柄被丢弃时控制线程退出并把两轮清零。

use crate::config::BalanceConfig;
use crate::controller::ControlCommand;
use crate::error::DriverError;
use crate::estimator::RobotState;
use crate::metrics::{LoopMetrics, MetricsSnapshot};
use crate::pipeline::{ControlTask, LoopHardware, control_loop};
use crate::state::{LoopContext, LoopFault, SharedSetpoints};
use balancebot_hal::OperatorFeedback;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{JoinHandle, spawn};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// `suspend()` 等待控制线程确认的周期数
const SUSPEND_ACK_PERIODS: u32 = 5;

/// 控制线程退出等待时间
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// 带超时的 thread join
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // 看门狗线程代为 join，主线程只等待通道
        spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

struct LoopInner {
    config: BalanceConfig,
    ctx: Arc<LoopContext>,
    metrics: Arc<LoopMetrics>,
    feedback: Option<OperatorFeedback>,
    /// 启动前持有硬件；`start()` 把它移交给控制线程
    hardware: Mutex<Option<LoopHardware>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    is_running: Arc<AtomicBool>,
}

impl LoopInner {
    fn stop(&self) -> Result<(), DriverError> {
        // Release: 确保之前的写入对控制线程可见
        self.is_running.store(false, Ordering::Release);

        // 从未启动：硬件还在这里，直接清零
        if let Ok(mut hardware) = self.hardware.lock()
            && let Some(hw) = hardware.as_mut()
            && let Err(e) = hw.zero_motors()
        {
            warn!("Failed to zero motors of an idle loop: {}", e);
        }

        let handle = match self.thread.lock() {
            Ok(mut thread) => thread.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle
            && let Err(_e) = handle.join_timeout(JOIN_TIMEOUT)
        {
            error!(
                "Control thread panicked or failed to shut down within {:?}",
                JOIN_TIMEOUT
            );
            return Err(DriverError::Timeout);
        }
        Ok(())
    }
}

impl Drop for LoopInner {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// 平衡控制循环句柄
#[derive(Clone)]
pub struct BalanceLoop {
    inner: Arc<LoopInner>,
}

impl BalanceLoop {
    /// 创建控制循环（不启动线程）
    ///
    /// # 错误
    /// - `DriverError::InvalidConfig`: 配置非法
    pub fn new(hardware: LoopHardware, config: BalanceConfig) -> Result<Self, DriverError> {
        config.validate()?;

        let setpoints =
            SharedSetpoints::new(config.default_speed, config.max_speed, config.max_turn);
        let ctx = Arc::new(LoopContext::new(setpoints, config.starting_angle));

        Ok(Self {
            inner: Arc::new(LoopInner {
                config,
                ctx,
                metrics: Arc::new(LoopMetrics::new()),
                feedback: None,
                hardware: Mutex::new(Some(hardware)),
                thread: Mutex::new(None),
                is_running: Arc::new(AtomicBool::new(true)),
            }),
        })
    }

    /// 附加操作员反馈（启动提示音、故障提示），必须在第一次 clone 之前调用
    pub fn with_feedback(mut self, feedback: OperatorFeedback) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.feedback = Some(feedback),
            None => warn!("BalanceLoop already shared, feedback not attached"),
        }
        self
    }

    /// 启动控制线程
    ///
    /// 幂等：已经启动时直接返回 `Ok(())`，不会创建第二个线程。
    pub fn start(&self) -> Result<(), DriverError> {
        let mut thread = self.inner.thread.lock().map_err(|_| DriverError::PoisonedLock)?;
        let hardware = self
            .inner
            .hardware
            .lock()
            .map_err(|_| DriverError::PoisonedLock)?
            .take();

        let Some(hardware) = hardware else {
            debug!("Control loop already started, ignoring start()");
            return Ok(());
        };

        let task = ControlTask::new(
            hardware,
            self.inner.ctx.clone(),
            self.inner.metrics.clone(),
            &self.inner.config,
            self.inner.feedback.clone(),
        );
        let period = self.inner.config.period();
        let realtime_priority = self.inner.config.realtime_priority;
        let is_running = self.inner.is_running.clone();

        let handle = std::thread::Builder::new()
            .name("balancebot-control".to_string())
            .spawn(move || control_loop(task, period, realtime_priority, is_running))
            .map_err(|e| DriverError::ThreadSpawn(e.to_string()))?;
        *thread = Some(handle);

        info!("Control loop started (period {:?})", period);
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.inner.hardware.lock().map(|hw| hw.is_none()).unwrap_or(true)
    }

    /// 挂起：两轮立即清零，停止反馈计算（控制线程继续按周期运行）
    ///
    /// 控制线程运行时，等待它确认清零，最多等待 5 个周期。
    pub fn suspend(&self) -> Result<(), DriverError> {
        let control = &self.inner.ctx.control;
        let ticket = control.request_suspend();

        {
            let mut hardware = self.inner.hardware.lock().map_err(|_| DriverError::PoisonedLock)?;
            if let Some(hw) = hardware.as_mut() {
                hw.zero_motors()?;
                control.acknowledge_suspend(ticket);
                self.inner.ctx.publish_command(ControlCommand::ZERO);
                info!("Control loop suspended before start");
                return Ok(());
            }
        }

        let period = self.inner.config.period();
        let deadline = Instant::now() + period * SUSPEND_ACK_PERIODS;
        while !control.is_acknowledged(ticket) {
            if Instant::now() >= deadline {
                warn!(
                    "Control thread did not acknowledge suspend within {:?}",
                    period * SUSPEND_ACK_PERIODS
                );
                return Ok(());
            }
            spin_sleep::sleep(period / 10);
        }

        info!("Control loop suspended");
        Ok(())
    }

    /// 恢复：清除挂起标志和锁存故障，下一个 tick 重新进入预热阶段
    pub fn resume(&self) {
        self.inner.ctx.publish_state(RobotState::initial(
            self.inner.config.starting_angle,
            Instant::now(),
        ));
        let generation = self.inner.ctx.control.resume();
        info!("Control loop resumed (generation {})", generation);
    }

    pub fn is_suspended(&self) -> bool {
        self.inner.ctx.control.is_suspended()
    }

    /// 设置速度偏置，限幅到 [-max_speed, max_speed]
    pub fn set_speed(&self, speed: f64) {
        self.inner.ctx.setpoints.set_speed(speed);
    }

    /// 设置转向差速，限幅到 [-max_turn, max_turn]
    pub fn set_turn(&self, turn: f64) {
        self.inner.ctx.setpoints.set_turn(turn);
    }

    /// 恢复默认速度和零转向
    pub fn restore_defaults(&self) {
        self.set_speed(self.inner.config.default_speed);
        self.set_turn(0.0);
    }

    pub fn speed(&self) -> f64 {
        self.inner.ctx.setpoints.speed()
    }

    pub fn turn(&self) -> f64 {
        self.inner.ctx.setpoints.turn()
    }

    /// 最新倾角（度）
    pub fn angle(&self) -> f64 {
        self.inner.ctx.state().angle
    }

    /// 最新运动状态（无锁）
    pub fn state(&self) -> RobotState {
        self.inner.ctx.state()
    }

    /// 最近一次写入电机的命令（无锁）
    pub fn last_command(&self) -> ControlCommand {
        self.inner.ctx.last_command()
    }

    /// 控制线程锁存的故障
    pub fn fault(&self) -> LoopFault {
        self.inner.ctx.control.fault()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn config(&self) -> &BalanceConfig {
        &self.inner.config
    }

    /// 停止控制线程并等待退出（两轮清零）
    ///
    /// 之后句柄仍可读取状态，但不能再次启动。
    pub fn shutdown(&self) -> Result<(), DriverError> {
        self.inner.stop()
    }
}

impl std::fmt::Debug for BalanceLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceLoop")
            .field("started", &self.is_started())
            .field("suspended", &self.is_suspended())
            .field("fault", &self.fault())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use balancebot_hal::mock::{GyroProbe, MockGyro, MockMotor, MotorProbe};
    use std::thread;

    struct Probes {
        left: Arc<MotorProbe>,
        right: Arc<MotorProbe>,
        gyro: Arc<GyroProbe>,
    }

    fn fast_config() -> BalanceConfig {
        BalanceConfig {
            period_ms: 2,
            realtime_priority: false,
            ..Default::default()
        }
    }

    fn build(config: BalanceConfig) -> (BalanceLoop, Probes) {
        let (left_motor, left) = MockMotor::new();
        let (right_motor, right) = MockMotor::new();
        let (gyro_sensor, gyro) = MockGyro::new();
        let balance_loop = BalanceLoop::new(
            LoopHardware::new(left_motor, right_motor, gyro_sensor),
            config,
        )
        .unwrap();
        (balance_loop, Probes { left, right, gyro })
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met within 5s");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let (left_motor, _) = MockMotor::new();
        let (right_motor, _) = MockMotor::new();
        let (gyro_sensor, _) = MockGyro::new();
        let result = BalanceLoop::new(
            LoopHardware::new(left_motor, right_motor, gyro_sensor),
            BalanceConfig {
                period_ms: 0,
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(DriverError::InvalidConfig(_))));
    }

    #[test]
    fn test_start_is_idempotent() {
        let (balance_loop, probes) = build(fast_config());
        assert!(!balance_loop.is_started());

        balance_loop.start().unwrap();
        balance_loop.start().unwrap();
        balance_loop.clone().start().unwrap();
        assert!(balance_loop.is_started());

        wait_until(|| balance_loop.metrics().ticks_total >= 20);
        // 只有一个控制线程：只开始过一个代次，只复位过一次硬件
        assert_eq!(balance_loop.metrics().generations, 1);
        assert_eq!(probes.gyro.reset_count(), 1);
    }

    #[test]
    fn test_suspend_before_start_zeroes_directly() {
        let (balance_loop, probes) = build(fast_config());
        balance_loop.suspend().unwrap();
        assert!(balance_loop.is_suspended());
        assert_eq!(probes.left.power_history(), vec![0]);
        assert_eq!(probes.right.power_history(), vec![0]);
    }

    #[test]
    fn test_suspend_and_resume_running_loop() {
        let (balance_loop, probes) = build(fast_config());
        probes.gyro.set_rate(150.0);
        balance_loop.start().unwrap();
        wait_until(|| !balance_loop.last_command().is_zero());

        balance_loop.suspend().unwrap();
        assert_eq!(probes.left.power(), 0);
        assert_eq!(probes.right.power(), 0);
        assert!(balance_loop.last_command().is_zero());

        let commands = probes.left.command_count();
        let suspended = balance_loop.metrics().suspended_ticks;
        wait_until(|| balance_loop.metrics().suspended_ticks >= suspended + 5);
        assert_eq!(probes.left.command_count(), commands);

        probes.gyro.set_rate(0.0);
        balance_loop.resume();
        assert_eq!(balance_loop.angle(), -0.25);
        wait_until(|| balance_loop.metrics().generations == 2);
        assert_eq!(probes.left.reset_count(), 2);
    }

    #[test]
    fn test_setpoints_clamped() {
        let (balance_loop, _probes) = build(fast_config());
        assert_eq!(balance_loop.speed(), 3.0);

        balance_loop.set_speed(9.0);
        balance_loop.set_turn(-9.0);
        assert_eq!(balance_loop.speed(), 5.0);
        assert_eq!(balance_loop.turn(), -5.0);

        balance_loop.set_speed(f64::NAN);
        assert_eq!(balance_loop.speed(), 5.0);

        balance_loop.restore_defaults();
        assert_eq!(balance_loop.speed(), 3.0);
        assert_eq!(balance_loop.turn(), 0.0);
    }

    #[test]
    fn test_drop_stops_thread_and_zeroes() {
        let (balance_loop, probes) = build(fast_config());
        probes.gyro.set_rate(150.0);
        balance_loop.start().unwrap();
        wait_until(|| probes.left.power() != 0);

        let clone = balance_loop.clone();
        drop(balance_loop);
        // 仍有句柄存活，线程继续运行
        let ticks = clone.metrics().ticks_total;
        wait_until(|| clone.metrics().ticks_total > ticks);

        drop(clone);
        assert_eq!(probes.left.power(), 0);
        assert_eq!(probes.right.power(), 0);
        let commands = probes.left.command_count();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(probes.left.command_count(), commands);
    }

    #[test]
    fn test_shutdown_is_explicit_and_repeatable() {
        let (balance_loop, probes) = build(fast_config());
        balance_loop.start().unwrap();
        wait_until(|| balance_loop.metrics().ticks_total >= 5);

        balance_loop.shutdown().unwrap();
        balance_loop.shutdown().unwrap();
        assert_eq!(probes.left.power(), 0);
        // 已经启动过，不会重新启动
        balance_loop.start().unwrap();
        assert!(balance_loop.is_started());
    }
}
