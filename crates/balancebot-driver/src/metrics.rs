//! 控制循环运行指标
//!
//! 所有计数器都是原子变量，控制线程写入时不加锁；
//! 外部通过 [`LoopMetrics::snapshot`] 读取一致性要求不高的快照。

use std::sync::atomic::{AtomicU64, Ordering};

/// 控制循环指标（原子计数器）
#[derive(Debug, Default)]
pub struct LoopMetrics {
    /// 总 tick 数（包括预热和挂起）
    pub ticks_total: AtomicU64,
    /// 预热阶段强制零输出的 tick 数
    pub priming_ticks: AtomicU64,
    /// 挂起期间的 tick 数
    pub suspended_ticks: AtomicU64,
    /// 传感器读取失败或读数无效的次数
    pub sensor_faults: AtomicU64,
    /// 电机拒绝命令的次数
    pub actuator_faults: AtomicU64,
    /// 超出控制周期的 tick 数
    pub overruns: AtomicU64,
    /// 已开始的代次数
    pub generations: AtomicU64,
}

impl LoopMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks_total: self.ticks_total.load(Ordering::Relaxed),
            priming_ticks: self.priming_ticks.load(Ordering::Relaxed),
            suspended_ticks: self.suspended_ticks.load(Ordering::Relaxed),
            sensor_faults: self.sensor_faults.load(Ordering::Relaxed),
            actuator_faults: self.actuator_faults.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            generations: self.generations.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.ticks_total.store(0, Ordering::Relaxed);
        self.priming_ticks.store(0, Ordering::Relaxed);
        self.suspended_ticks.store(0, Ordering::Relaxed);
        self.sensor_faults.store(0, Ordering::Relaxed);
        self.actuator_faults.store(0, Ordering::Relaxed);
        self.overruns.store(0, Ordering::Relaxed);
        self.generations.store(0, Ordering::Relaxed);
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub ticks_total: u64,
    pub priming_ticks: u64,
    pub suspended_ticks: u64,
    pub sensor_faults: u64,
    pub actuator_faults: u64,
    pub overruns: u64,
    pub generations: u64,
}

impl MetricsSnapshot {
    /// 正常输出控制命令的 tick 数
    pub fn active_ticks(&self) -> u64 {
        self.ticks_total
            .saturating_sub(self.priming_ticks)
            .saturating_sub(self.suspended_ticks)
    }

    /// 超时率（百分比）
    pub fn overrun_rate(&self) -> f64 {
        if self.ticks_total == 0 {
            return 0.0;
        }
        (self.overruns as f64 / self.ticks_total as f64) * 100.0
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ticks={} (active={}, priming={}, suspended={}), generations={}, \
             sensor_faults={}, actuator_faults={}, overruns={} ({:.2}%)",
            self.ticks_total,
            self.active_ticks(),
            self.priming_ticks,
            self.suspended_ticks,
            self.generations,
            self.sensor_faults,
            self.actuator_faults,
            self.overruns,
            self.overrun_rate()
        )
    }
}
