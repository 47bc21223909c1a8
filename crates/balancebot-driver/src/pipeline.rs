//! 控制线程
//!
//! 每个 tick 的顺序固定：采样 → 估计 → 控制律 → 写电机。
//!
//! [`ControlTask`] 封装单个 tick 的全部逻辑，不依赖真实时间，测试可以直接注入时间戳；
//! [`control_loop`] 负责周期调度（绝对时间锚点 + spin_sleep）和线程生命周期。
//!
//! 代次（generation）：控制线程第一次运行，以及每次 `resume()` 之后，都会开始新代次：
//! 清零轮子编码器和陀螺仪、重置估计器，前 `priming_ticks` 个 tick 强制零输出。

use crate::config::BalanceConfig;
use crate::controller::{BalanceController, ControlCommand};
use crate::estimator::{MotionEstimator, SensorSample};
use crate::metrics::LoopMetrics;
use crate::state::{LoopContext, LoopFault};
use balancebot_hal::{GyroSensor, HalError, MotorActuator, OperatorFeedback};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// 每隔多少次超时打印一次警告
const OVERRUN_LOG_INTERVAL: u64 = 100;

/// 控制线程独占的硬件
pub struct LoopHardware {
    pub left: Box<dyn MotorActuator + Send>,
    pub right: Box<dyn MotorActuator + Send>,
    pub gyro: Box<dyn GyroSensor + Send>,
}

impl LoopHardware {
    pub fn new(
        left: impl MotorActuator + Send + 'static,
        right: impl MotorActuator + Send + 'static,
        gyro: impl GyroSensor + Send + 'static,
    ) -> Self {
        Self {
            left: Box::new(left),
            right: Box::new(right),
            gyro: Box::new(gyro),
        }
    }

    /// 两轮写零（尽力而为，返回第一个错误）
    pub fn zero_motors(&mut self) -> Result<(), HalError> {
        let left = self.left.set_power(0);
        let right = self.right.set_power(0);
        left.and(right)
    }

    fn apply(&mut self, command: ControlCommand) -> Result<(), HalError> {
        self.left.set_power(command.left)?;
        self.right.set_power(command.right)
    }

    fn sample(&mut self) -> Result<SensorSample, HalError> {
        let angular_rate = self.gyro.read_angular_rate()?;
        let left = self.left.position()?;
        let right = self.right.position()?;
        Ok(SensorSample {
            angular_rate,
            wheel_sum: left + right,
        })
    }

    fn reset(&mut self) -> Result<(), HalError> {
        self.left.reset_position()?;
        self.right.reset_position()?;
        self.gyro.reset()
    }
}

impl std::fmt::Debug for LoopHardware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopHardware").finish_non_exhaustive()
    }
}

/// 单个 tick 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// 循环挂起，未计算也未写电机
    Suspended,
    /// 预热阶段，两轮写零
    Priming,
    /// 正常输出
    Active(ControlCommand),
    /// 本 tick 锁存了故障并挂起
    Faulted(LoopFault),
}

/// 控制线程状态
pub struct ControlTask {
    hw: LoopHardware,
    ctx: Arc<LoopContext>,
    metrics: Arc<LoopMetrics>,
    feedback: Option<OperatorFeedback>,
    controller: BalanceController,
    estimator: MotionEstimator,
    priming_ticks: u32,
    max_consecutive_sensor_faults: u32,
    seen_generation: Option<u64>,
    generation_tick: u32,
    consecutive_sensor_faults: u32,
    pending_alert: Option<&'static str>,
    pending_start_signal: bool,
}

impl ControlTask {
    pub fn new(
        hw: LoopHardware,
        ctx: Arc<LoopContext>,
        metrics: Arc<LoopMetrics>,
        config: &BalanceConfig,
        feedback: Option<OperatorFeedback>,
    ) -> Self {
        Self {
            hw,
            ctx,
            metrics,
            feedback,
            controller: BalanceController::new(config.gains),
            estimator: MotionEstimator::new(
                config.starting_angle,
                config.max_gyro_rate,
                Instant::now(),
            ),
            priming_ticks: config.priming_ticks,
            max_consecutive_sensor_faults: config.max_consecutive_sensor_faults,
            seen_generation: None,
            generation_tick: 0,
            consecutive_sensor_faults: 0,
            pending_alert: None,
            pending_start_signal: false,
        }
    }

    /// 执行一个 tick
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        self.metrics.ticks_total.fetch_add(1, Ordering::Relaxed);
        self.flush_feedback();

        let control = &self.ctx.control;
        if control.is_suspended() {
            // 只有在挂起标志可见时才确认：确认之后本代次不会再写非零功率
            if let Some(ticket) = control.pending_suspend() {
                if let Err(e) = self.hw.zero_motors() {
                    error!("Failed to zero motors on suspend: {}", e);
                }
                self.ctx.publish_command(ControlCommand::ZERO);
                control.acknowledge_suspend(ticket);
                debug!("Suspend request {} acknowledged, motors zeroed", ticket);
            }
            self.metrics.suspended_ticks.fetch_add(1, Ordering::Relaxed);
            return TickOutcome::Suspended;
        }

        let generation = control.generation();
        let fresh = self.seen_generation != Some(generation);
        if fresh {
            self.begin_generation(generation, now);
        } else {
            self.estimate(now);
        }
        self.generation_tick = self.generation_tick.saturating_add(1);

        if self.consecutive_sensor_faults >= self.max_consecutive_sensor_faults {
            return self.fault(LoopFault::Sensor);
        }

        let priming = self.generation_tick <= self.priming_ticks;
        let command = if priming {
            ControlCommand::ZERO
        } else {
            let setpoints = self.ctx.setpoints.snapshot();
            self.controller.compute(self.estimator.state(), &setpoints)
        };

        if let Err(e) = self.hw.apply(command) {
            error!("Motor rejected command {:?}: {}", command, e);
            self.metrics.actuator_faults.fetch_add(1, Ordering::Relaxed);
            return self.fault(LoopFault::Actuator);
        }
        self.ctx.publish_command(command);

        if priming {
            self.metrics.priming_ticks.fetch_add(1, Ordering::Relaxed);
            TickOutcome::Priming
        } else {
            TickOutcome::Active(command)
        }
    }

    /// 线程退出：两轮写零
    pub fn shutdown(&mut self) {
        match self.hw.zero_motors() {
            Ok(()) => info!("Control task stopped, motors zeroed"),
            Err(e) => error!("Control task stopped, failed to zero motors: {}", e),
        }
        self.ctx.publish_command(ControlCommand::ZERO);
    }

    fn begin_generation(&mut self, generation: u64, now: Instant) {
        let first = self.seen_generation.is_none();
        self.seen_generation = Some(generation);
        self.generation_tick = 0;
        self.consecutive_sensor_faults = 0;

        if let Err(e) = self.hw.reset() {
            warn!("Hardware reset failed at generation start: {}", e);
            self.metrics.sensor_faults.fetch_add(1, Ordering::Relaxed);
        }
        self.estimator.reset(now);
        self.ctx.publish_state(*self.estimator.state());
        self.metrics.generations.fetch_add(1, Ordering::Relaxed);
        info!("Control generation {} started", generation);

        if first {
            self.pending_start_signal = true;
            self.flush_feedback();
        }
    }

    fn estimate(&mut self, now: Instant) {
        let result = self
            .hw
            .sample()
            .map_err(|e| e.to_string())
            .and_then(|sample| self.estimator.step(sample, now).map_err(|e| e.to_string()));

        match result {
            Ok(state) => {
                if self.consecutive_sensor_faults > 0 {
                    debug!(
                        "Sensors recovered after {} faulty ticks",
                        self.consecutive_sensor_faults
                    );
                }
                self.consecutive_sensor_faults = 0;
                self.ctx.publish_state(state);
            },
            Err(reason) => {
                self.metrics.sensor_faults.fetch_add(1, Ordering::Relaxed);
                self.consecutive_sensor_faults += 1;
                if self.consecutive_sensor_faults == 1 {
                    warn!("Transient sensor fault, keeping previous state: {}", reason);
                } else {
                    trace!(
                        "Sensor fault ({} consecutive): {}",
                        self.consecutive_sensor_faults, reason
                    );
                }
            },
        }
    }

    fn fault(&mut self, fault: LoopFault) -> TickOutcome {
        if let Err(e) = self.hw.zero_motors() {
            error!("Failed to zero motors after {:?} fault: {}", fault, e);
        }
        self.ctx.publish_command(ControlCommand::ZERO);
        self.ctx.control.latch_fault(fault);
        error!(
            "Control loop suspended by {:?} fault (consecutive sensor faults: {})",
            fault, self.consecutive_sensor_faults
        );

        self.pending_alert = fault.operator_message();
        self.flush_feedback();
        TickOutcome::Faulted(fault)
    }

    /// 发送挂起的操作员提示（显示屏被占用时留到下个 tick）
    fn flush_feedback(&mut self) {
        let Some(feedback) = &self.feedback else {
            self.pending_alert = None;
            self.pending_start_signal = false;
            return;
        };

        if let Some(text) = self.pending_alert
            && feedback.try_alert(text, 5)
        {
            self.pending_alert = None;
        }
        if self.pending_start_signal && feedback.try_beep_sequence_up() {
            self.pending_start_signal = false;
        }
    }
}

/// 控制线程主循环
///
/// # 参数
/// - `task`: tick 逻辑和硬件
/// - `period`: 控制周期
/// - `realtime_priority`: 是否尝试提升线程优先级（需要 `realtime` feature）
/// - `is_running`: 运行标志（Drop 时置 false）
pub fn control_loop(
    mut task: ControlTask,
    period: Duration,
    realtime_priority: bool,
    is_running: Arc<AtomicBool>,
) {
    if realtime_priority {
        raise_priority();
    }

    // 使用绝对时间锚点消除累积漂移
    let mut next_tick = Instant::now();

    loop {
        next_tick += period;

        let now = Instant::now();
        if next_tick > now {
            spin_sleep::sleep(next_tick - now);
        } else {
            let overruns = task.metrics.overruns.fetch_add(1, Ordering::Relaxed) + 1;
            if overruns % OVERRUN_LOG_INTERVAL == 1 {
                warn!(
                    "Control loop overrun: tick took {:?} (period {:?}), {} overruns so far",
                    now.duration_since(next_tick - period),
                    period,
                    overruns
                );
            }
            // 重置锚点，避免后续累积延迟
            next_tick = now;
        }

        // Acquire: 看到 false 时必须同时看到其他线程的清理写入
        if !is_running.load(Ordering::Acquire) {
            trace!("Control thread: is_running flag is false, exiting");
            break;
        }

        task.tick(Instant::now());
    }

    task.shutdown();
}

#[cfg(feature = "realtime")]
fn raise_priority() {
    use thread_priority::*;

    match set_current_thread_priority(ThreadPriority::Max) {
        Ok(_) => {
            info!("Control thread priority set to MAX (realtime)");
        },
        Err(e) => {
            warn!(
                "Failed to set control thread priority: {:?}. \
                On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                e
            );
        },
    }
}

#[cfg(not(feature = "realtime"))]
fn raise_priority() {
    debug!("Built without `realtime` feature, control thread keeps default priority");
}
