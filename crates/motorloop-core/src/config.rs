//! 调度器配置

use crate::error::ControlError;
use std::time::Duration;

/// 单元故障时写入后端的输出策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultPolicy {
    /// 输出 0（默认）
    #[default]
    Neutral,
    /// 保持上一周期的输出
    HoldLastOutput,
}

/// 调度器配置
///
/// # Example
///
/// ```
/// use motorloop_core::{FaultPolicy, SchedulerConfig};
/// use std::time::Duration;
///
/// // 默认配置（2ms 周期，输出钳位到 [-1, 1]）
/// let config = SchedulerConfig::default();
/// assert_eq!(config.period, Duration::from_millis(2));
///
/// let config = SchedulerConfig {
///     period: Duration::from_millis(5),
///     fault_policy: FaultPolicy::HoldLastOutput,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// 控制周期
    pub period: Duration,
    /// 输出钳位范围 `[-output_limit, output_limit]`
    pub output_limit: f64,
    pub fault_policy: FaultPolicy,
    /// 命令队列容量
    pub command_queue_capacity: usize,
    /// 每周期采样位置/速度/电流并写入遥测
    pub sample_feedback: bool,
    /// 超时警告的最小间隔
    pub overrun_warn_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(2),
            output_limit: 1.0,
            fault_policy: FaultPolicy::Neutral,
            command_queue_capacity: 256,
            sample_feedback: true,
            overrun_warn_interval: Duration::from_secs(1),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.period.is_zero() {
            return Err(ControlError::InvalidConfig(
                "period must be > 0".to_string(),
            ));
        }
        if !self.output_limit.is_finite() || self.output_limit <= 0.0 {
            return Err(ControlError::InvalidConfig(format!(
                "output_limit must be finite and > 0, got {}",
                self.output_limit
            )));
        }
        if self.command_queue_capacity == 0 {
            return Err(ControlError::InvalidConfig(
                "command_queue_capacity must be > 0".to_string(),
            ));
        }
        if self.period > Duration::from_millis(100) {
            tracing::warn!(
                "Very long control period: {:?}. Closed-loop response will be sluggish.",
                self.period
            );
        }
        Ok(())
    }

    /// 周期（毫秒），积分与微分项使用此单位
    pub fn period_ms(&self) -> f64 {
        self.period.as_secs_f64() * 1000.0
    }
}
