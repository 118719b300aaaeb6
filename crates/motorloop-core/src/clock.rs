//! 控制循环时钟
//!
//! 调度器通过 [`Clock`] 读取时间和等待下一个周期，生产环境使用
//! [`SpinClock`]（`spin_sleep` 混合睡眠，亚毫秒精度），测试使用
//! [`ManualClock`]（时间只在显式推进时前进）。

use spin_sleep::SpinSleeper;
use std::time::{Duration, Instant};

/// 时钟抽象
pub trait Clock: Send {
    fn now(&mut self) -> Instant;

    fn sleep(&mut self, duration: Duration);
}

/// 高精度自旋睡眠时钟
///
/// 操作系统睡眠的精度通常在 1ms 左右，对 2ms 周期来说不够。
/// `SpinSleeper` 先睡眠再在最后一段时间内自旋。
#[derive(Debug, Clone)]
pub struct SpinClock {
    sleeper: SpinSleeper,
}

impl SpinClock {
    pub fn new() -> Self {
        Self {
            sleeper: SpinSleeper::default(),
        }
    }
}

impl Default for SpinClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SpinClock {
    fn now(&mut self) -> Instant {
        Instant::now()
    }

    fn sleep(&mut self, duration: Duration) {
        self.sleeper.sleep(duration);
    }
}

/// 手动时钟（测试用）
///
/// 每次 `now()` 推进 `cost_per_read`，用来模拟 tick 的执行耗时；
/// `sleep()` 直接推进时间并记录睡眠时长。
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Instant,
    cost_per_read: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::with_cost(Duration::ZERO)
    }

    pub fn with_cost(cost_per_read: Duration) -> Self {
        Self {
            now: Instant::now(),
            cost_per_read,
            sleeps: Vec::new(),
        }
    }

    pub fn sleeps(&self) -> &[Duration] {
        &self.sleeps
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&mut self) -> Instant {
        self.now += self.cost_per_read;
        self.now
    }

    fn sleep(&mut self, duration: Duration) {
        self.sleeps.push(duration);
        self.now += duration;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let mut clock = ManualClock::with_cost(Duration::from_micros(100));
        let t0 = clock.now();
        let t1 = clock.now();
        assert_eq!(t1 - t0, Duration::from_micros(100));

        clock.sleep(Duration::from_millis(1));
        let t2 = clock.now();
        assert_eq!(t2 - t1, Duration::from_micros(1100));
        assert_eq!(clock.sleeps(), &[Duration::from_millis(1)]);
    }

    #[test]
    fn test_spin_clock_sleeps_at_least_requested() {
        let mut clock = SpinClock::new();
        let start = clock.now();
        clock.sleep(Duration::from_micros(500));
        assert!(clock.now() - start >= Duration::from_micros(500));
    }
}
