//! 机器人装配
//!
//! 把设备、控制循环和四种行为按固定优先级组装起来：
//! LowBatteryGuard > FallDetection > ObstacleAvoidance > Forward。
//! 所有设备都由调用方构造后传入，没有进程级的全局硬件。

use crate::config::RobotConfig;
use balancebot_behavior::{
    Arbiter, Behavior, BehaviorError, CycleOutcome, FallDetection, Forward, LowBatteryGuard,
    ObstacleAvoidance,
};
use balancebot_driver::{BalanceLoop, DriverError, LoopHardware, MetricsSnapshot};
use balancebot_hal::{BatteryMonitor, ConfirmationInput, OperatorFeedback, ProximitySensor};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::info;

/// 行为在仲裁器中的位置（优先级从高到低）
pub mod rank {
    pub const LOW_BATTERY: usize = 0;
    pub const FALL_DETECTION: usize = 1;
    pub const OBSTACLE_AVOIDANCE: usize = 2;
    pub const FORWARD: usize = 3;
}

/// 机器人所需的全部设备
pub struct RobotDevices {
    /// 控制线程独占的电机和陀螺仪
    pub hardware: LoopHardware,
    pub proximity: Box<dyn ProximitySensor + Send>,
    pub battery: Box<dyn BatteryMonitor + Send>,
    /// 倒地和低电量行为共享的确认输入
    pub confirmation: Arc<dyn ConfirmationInput>,
    /// 显示屏和蜂鸣器（控制线程和仲裁线程共享）
    pub feedback: OperatorFeedback,
}

/// 装配完成的机器人
pub struct Robot {
    balance_loop: BalanceLoop,
    arbiter: Arbiter<Behavior>,
}

impl Robot {
    pub fn new(config: RobotConfig, devices: RobotDevices) -> Result<Self, BehaviorError> {
        config.behavior.validate()?;

        let RobotDevices {
            hardware,
            proximity,
            battery,
            confirmation,
            feedback,
        } = devices;

        let balance_loop =
            BalanceLoop::new(hardware, config.balance)?.with_feedback(feedback.clone());

        let behaviors: Vec<Behavior> = vec![
            LowBatteryGuard::new(
                battery,
                confirmation.clone(),
                feedback.clone(),
                &config.behavior,
            )
            .into(),
            FallDetection::new(
                balance_loop.clone(),
                confirmation,
                feedback.clone(),
                &config.behavior,
            )
            .into(),
            ObstacleAvoidance::new(proximity, balance_loop.clone(), feedback, &config.behavior)
                .into(),
            Forward::new(balance_loop.clone()).into(),
        ];

        let arbiter = Arbiter::new(behaviors).with_idle_poll(config.behavior.idle_poll());
        info!("Robot assembled with {} behaviors", arbiter.behaviors().len());

        Ok(Self {
            balance_loop,
            arbiter,
        })
    }

    pub fn balance_loop(&self) -> &BalanceLoop {
        &self.balance_loop
    }

    pub fn arbiter(&self) -> &Arbiter<Behavior> {
        &self.arbiter
    }

    pub fn arbiter_mut(&mut self) -> &mut Arbiter<Behavior> {
        &mut self.arbiter
    }

    /// 选择步骤（不执行动作）
    pub fn select(&mut self) -> Option<usize> {
        self.arbiter.select()
    }

    /// 执行一个仲裁周期
    pub fn cycle(&mut self) -> CycleOutcome {
        self.arbiter.cycle()
    }

    /// 在当前线程上仲裁，直到 `stop` 被置位
    pub fn run(&mut self, stop: &AtomicBool) {
        self.arbiter.run(stop);
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.balance_loop.metrics()
    }

    /// 停止控制线程，两轮清零
    pub fn shutdown(&self) -> Result<(), DriverError> {
        self.balance_loop.shutdown()
    }
}
