//! 单元遥测快照
//!
//! 控制循环在每次更新单元后发布一份不可变快照（`ArcSwap` 无锁存储），
//! 应用线程随时读取，不会阻塞控制循环。

use crate::mode::ControlMode;
use arc_swap::ArcSwap;
use motorloop_backend::Capabilities;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 单元状态快照（每个周期的最终值）
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UnitTelemetry {
    /// 该单元已执行的更新次数
    pub tick: u64,
    pub mode: ControlMode,
    pub setpoint: f64,
    pub auxiliary_setpoint: f64,
    pub auxiliary_enabled: bool,
    /// 平滑后的主通道误差
    pub error: f64,
    /// 平滑后的辅助通道误差
    pub auxiliary_error: f64,
    pub integral: f64,
    pub auxiliary_integral: f64,
    /// 钳位前的输出（已应用反转）
    pub raw_output: f64,
    /// 实际写入后端的输出
    pub output: f64,
    /// 已乘以转换系数的位置
    pub position: Option<f64>,
    /// 已乘以转换系数的速度
    pub velocity: Option<f64>,
    pub current: Option<f64>,
    /// 连续故障周期数（0 表示健康）
    pub consecutive_faults: u32,
}

/// 控制线程与应用线程共享的单元信息
#[derive(Debug)]
pub(crate) struct UnitShared {
    pub(crate) name: String,
    pub(crate) capabilities: Capabilities,
    pub(crate) telemetry: ArcSwap<UnitTelemetry>,
    has_sensor_source: AtomicBool,
    has_auxiliary_source: AtomicBool,
}

impl UnitShared {
    pub(crate) fn new(name: String, capabilities: Capabilities) -> Self {
        Self {
            name,
            capabilities,
            telemetry: ArcSwap::from_pointee(UnitTelemetry::default()),
            has_sensor_source: AtomicBool::new(false),
            has_auxiliary_source: AtomicBool::new(false),
        }
    }

    pub(crate) fn publish(&self, telemetry: UnitTelemetry) {
        self.telemetry.store(Arc::new(telemetry));
    }

    pub(crate) fn snapshot(&self) -> Arc<UnitTelemetry> {
        self.telemetry.load_full()
    }

    pub(crate) fn has_sensor_source(&self) -> bool {
        self.has_sensor_source.load(Ordering::Acquire)
    }

    pub(crate) fn mark_sensor_source(&self) {
        self.has_sensor_source.store(true, Ordering::Release);
    }

    pub(crate) fn has_auxiliary_source(&self) -> bool {
        self.has_auxiliary_source.load(Ordering::Acquire)
    }

    pub(crate) fn mark_auxiliary_source(&self) {
        self.has_auxiliary_source.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_replaces_snapshot() {
        let shared = UnitShared::new("m".to_string(), Capabilities::basic());
        assert_eq!(shared.snapshot().tick, 0);

        let old = shared.snapshot();
        shared.publish(UnitTelemetry {
            tick: 5,
            output: 0.25,
            ..Default::default()
        });

        // 旧快照保持不变
        assert_eq!(old.tick, 0);
        assert_eq!(shared.snapshot().tick, 5);
        assert_eq!(shared.snapshot().output, 0.25);
    }

    #[test]
    fn test_source_flags() {
        let shared = UnitShared::new("m".to_string(), Capabilities::basic());
        assert!(!shared.has_sensor_source());
        assert!(!shared.has_auxiliary_source());
        shared.mark_sensor_source();
        shared.mark_auxiliary_source();
        assert!(shared.has_sensor_source());
        assert!(shared.has_auxiliary_source());
    }
}
