//! 控制循环性能指标
//!
//! 所有计数器都使用原子操作，可以在任何线程读取，不会与控制循环产生锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 控制循环实时指标
///
/// # 使用示例
///
/// ```rust
/// use motorloop_core::LoopMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = LoopMetrics::new();
/// metrics.ticks.fetch_add(1, Ordering::Relaxed);
///
/// let snapshot = metrics.snapshot();
/// assert_eq!(snapshot.ticks, 1);
/// ```
#[derive(Debug, Default)]
pub struct LoopMetrics {
    /// 已执行的周期数
    pub ticks: AtomicU64,

    /// 超时周期数（单次 tick 耗时超过周期）
    ///
    /// 如果这个值快速增长，说明单元数量或后端延迟已经超出周期预算。
    pub overruns: AtomicU64,

    /// 单元故障次数（每个单元每周期最多计 1 次）
    pub unit_faults: AtomicU64,

    /// 已应用的队列命令数
    pub commands_applied: AtomicU64,

    /// 被拒绝的队列命令数（配置错误、跟随环等）
    pub commands_rejected: AtomicU64,

    /// 单次 tick 的最大耗时（微秒）
    pub max_tick_us: AtomicU64,
}

impl LoopMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> LoopMetricsSnapshot {
        LoopMetricsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            unit_faults: self.unit_faults.load(Ordering::Relaxed),
            commands_applied: self.commands_applied.load(Ordering::Relaxed),
            commands_rejected: self.commands_rejected.load(Ordering::Relaxed),
            max_tick_us: self.max_tick_us.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器（用于性能测试）
    pub fn reset(&self) {
        self.ticks.store(0, Ordering::Relaxed);
        self.overruns.store(0, Ordering::Relaxed);
        self.unit_faults.store(0, Ordering::Relaxed);
        self.commands_applied.store(0, Ordering::Relaxed);
        self.commands_rejected.store(0, Ordering::Relaxed);
        self.max_tick_us.store(0, Ordering::Relaxed);
    }

    pub(crate) fn record_tick_duration(&self, micros: u64) {
        self.max_tick_us.fetch_max(micros, Ordering::Relaxed);
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopMetricsSnapshot {
    pub ticks: u64,
    pub overruns: u64,
    pub unit_faults: u64,
    pub commands_applied: u64,
    pub commands_rejected: u64,
    pub max_tick_us: u64,
}

impl LoopMetricsSnapshot {
    /// 超时周期占比（百分比），没有周期时返回 0.0
    pub fn overrun_rate(&self) -> f64 {
        if self.ticks == 0 {
            return 0.0;
        }
        (self.overruns as f64 / self.ticks as f64) * 100.0
    }
}
