//! 优先级仲裁器（subsumption）
//!
//! 每个仲裁周期：
//! 1. 从高到低扫描行为，选出第一个 `wants_control()` 为 true 的行为；
//! 2. 如果与当前活动行为不同，先对旧行为调用 `suppress()`；
//! 3. 调用新行为的 `act()`（可能长时间阻塞）；
//! 4. `act()` 返回后开始下一个周期。
//!
//! 仲裁器本身是单线程、严格顺序执行的，不会在 `act()` 阻塞期间抢占它。

use crate::error::BehaviorError;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// 同一行为连续失败时，每隔多少次记录一次 error 日志
const FAILURE_LOG_INTERVAL: u64 = 50;

/// 连续失败退避的上限（idle_poll 的倍数）
const MAX_FAILURE_BACKOFF: u32 = 50;

/// 仲裁器对行为的要求
///
/// 三个操作都必须实现，没有默认方法。
pub trait Arbitrated {
    /// 行为名称（日志用）
    fn name(&self) -> &str;

    /// 是否请求控制权（可以读取传感器，但不应阻塞）
    fn wants_control(&mut self) -> bool;

    /// 执行动作，允许阻塞
    fn act(&mut self) -> Result<(), BehaviorError>;

    /// 被更高优先级行为替换时调用，必须幂等且不阻塞
    fn suppress(&mut self);
}

/// 单个仲裁周期的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// 没有行为请求控制
    Idle,
    /// 行为 `index` 的 `act()` 正常返回
    Acted { index: usize },
    /// 行为 `index` 的 `act()` 返回错误或 panic，已被视为 suppress
    Failed { index: usize },
}

/// 优先级仲裁器
///
/// `behaviors[0]` 优先级最高，顺序在构造后固定。
pub struct Arbiter<B: Arbitrated> {
    behaviors: Vec<B>,
    active: Option<usize>,
    idle_poll: Duration,
    /// 连续失败的行为及次数
    failures: Option<(usize, u64)>,
}

impl<B: Arbitrated> Arbiter<B> {
    /// 创建仲裁器，`behaviors` 按优先级从高到低排列
    pub fn new(behaviors: Vec<B>) -> Self {
        Self {
            behaviors,
            active: None,
            idle_poll: Duration::from_millis(20),
            failures: None,
        }
    }

    /// 设置空闲周期的轮询间隔
    pub fn with_idle_poll(mut self, idle_poll: Duration) -> Self {
        self.idle_poll = idle_poll;
        self
    }

    /// 当前活动行为的索引
    pub fn active(&self) -> Option<usize> {
        self.active
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.map(|index| self.behaviors[index].name())
    }

    /// 行为 `index` 当前的连续失败次数
    pub fn failure_streak(&self, index: usize) -> u64 {
        match self.failures {
            Some((failed, count)) if failed == index => count,
            _ => 0,
        }
    }

    /// 下一次仲裁前的等待时间：空闲时为 `idle_poll`，连续失败时线性退避
    pub fn backoff(&self) -> Duration {
        match self.failures {
            Some((_, count)) => {
                let factor = u32::try_from(count)
                    .unwrap_or(MAX_FAILURE_BACKOFF)
                    .clamp(1, MAX_FAILURE_BACKOFF);
                self.idle_poll * factor
            },
            None => self.idle_poll,
        }
    }

    pub fn behaviors(&self) -> &[B] {
        &self.behaviors
    }

    pub fn behaviors_mut(&mut self) -> &mut [B] {
        &mut self.behaviors
    }

    /// 选择步骤：返回优先级最高的请求控制的行为
    ///
    /// 找到第一个后停止扫描，更低优先级的行为不会被询问。
    pub fn select(&mut self) -> Option<usize> {
        self.behaviors
            .iter_mut()
            .position(|behavior| behavior.wants_control())
    }

    /// 执行一个仲裁周期
    pub fn cycle(&mut self) -> CycleOutcome {
        let Some(index) = self.select() else {
            trace!("No behavior wants control");
            self.failures = None;
            return CycleOutcome::Idle;
        };

        if self.active != Some(index) {
            if let Some(previous) = self.active {
                debug!(
                    "Suppressing '{}' in favor of '{}'",
                    self.behaviors[previous].name(),
                    self.behaviors[index].name()
                );
                self.suppress(previous);
            }
            info!(
                "Behavior selected: '{}' (priority rank {})",
                self.behaviors[index].name(),
                index
            );
            self.active = Some(index);
        }

        let behavior = &mut self.behaviors[index];
        let failure = match catch_unwind(AssertUnwindSafe(|| behavior.act())) {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(panic) => Some(BehaviorError::Panicked {
                behavior: behavior.name().to_string(),
                message: panic_message(panic.as_ref()),
            }),
        };

        match failure {
            None => {
                if let Some((failed, count)) = self.failures.take() {
                    info!(
                        "Behavior '{}' recovered after {} consecutive failures",
                        self.behaviors[failed].name(),
                        count
                    );
                }
                CycleOutcome::Acted { index }
            },
            Some(e) => {
                let count = match self.failures {
                    Some((failed, count)) if failed == index => count + 1,
                    _ => 1,
                };
                self.failures = Some((index, count));

                let name = self.behaviors[index].name();
                if count % FAILURE_LOG_INTERVAL == 1 {
                    error!(
                        "Behavior '{}' failed, treating it as suppressed: {} ({} consecutive failures)",
                        name, e, count
                    );
                } else if count == 2 {
                    warn!(
                        "Behavior '{}' keeps failing, backing off (logging every {} failures)",
                        name, FAILURE_LOG_INTERVAL
                    );
                } else {
                    trace!("Behavior '{}' failed again ({}): {}", name, count, e);
                }
                self.suppress(index);
                self.active = None;
                CycleOutcome::Failed { index }
            },
        }
    }

    /// 持续仲裁直到 `stop` 被置位
    ///
    /// `act()` 阻塞期间不会检查 `stop`。
    pub fn run(&mut self, stop: &AtomicBool) {
        info!("Arbiter started with {} behaviors", self.behaviors.len());
        while !stop.load(Ordering::Acquire) {
            match self.cycle() {
                CycleOutcome::Acted { .. } => {},
                CycleOutcome::Idle | CycleOutcome::Failed { .. } => {
                    std::thread::sleep(self.backoff());
                },
            }
        }
        if let Some(active) = self.active.take() {
            self.suppress(active);
        }
        info!("Arbiter stopped");
    }

    fn suppress(&mut self, index: usize) {
        let behavior = &mut self.behaviors[index];
        if catch_unwind(AssertUnwindSafe(|| behavior.suppress())).is_err() {
            error!("Behavior '{}' panicked in suppress()", behavior.name());
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
