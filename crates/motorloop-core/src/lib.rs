//! # Motorloop Core
//!
//! 固定周期闭环电机控制引擎：
//! - 电机控制单元（模式、4 槽位增益表、3 点误差平滑、带积分冻结的 PID + 前馈）
//! - 控制循环调度器（固定 2ms 周期、主从跟随排序、故障隔离）
//! - 跨线程控制（`UnitController` 命令队列 + ArcSwap 遥测快照）
//!
//! # 使用场景
//!
//! 同步调用 [`Scheduler::tick`] 适用于测试和仿真；
//! 实际运行时使用 [`ControlLoop::spawn`] 把调度器移到专用线程上。

mod clock;
mod command;
mod config;
mod control_loop;
mod controller;
mod error;
pub mod filter;
mod gains;
pub mod metrics;
mod mode;
mod scheduler;
mod source;
mod telemetry;
mod unit;

pub use clock::{Clock, ManualClock, SpinClock};
pub use config::{FaultPolicy, SchedulerConfig};
pub use control_loop::ControlLoop;
pub use controller::UnitController;
pub use error::ControlError;
pub use filter::{ERROR_HISTORY_LEN, ErrorHistory, RollingAverage};
pub use gains::{GainTable, PidGains, Slot};
pub use metrics::{LoopMetrics, LoopMetricsSnapshot};
pub use mode::ControlMode;
pub use scheduler::{Scheduler, TickReport, UnitId};
pub use source::{FallibleSource, SignalSource};
pub use telemetry::UnitTelemetry;
pub use unit::MotorUnit;

// 后端层常用类型
pub use motorloop_backend::{
    BackendError, BackendFactory, BrakeMode, Capabilities, Capability, MockBackend, MockHandle,
    MotorBackend, SimBackend, SimFactory, SimHandle, SimPlant, Vendor,
};
