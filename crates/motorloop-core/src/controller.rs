//! 跨线程单元控制句柄
//!
//! 控制循环运行在独立线程上并独占所有单元，应用线程通过 [`UnitController`]
//! 修改目标值和配置。所有修改都作为命令进入有界队列，在下一个周期开始时应用；
//! 读取（误差、遥测）直接访问控制循环发布的最新快照。
//!
//! 能在调用点判断的错误（非法目标值、缺少信号源等）会立即返回，
//! 其余错误（如跟随环）在应用时被拒绝并计入 `commands_rejected`。

use crate::command::{Envelope, UnitCommand};
use crate::error::ControlError;
use crate::gains::{PidGains, Slot};
use crate::mode::ControlMode;
use crate::scheduler::UnitId;
use crate::source::SignalSource;
use crate::telemetry::{UnitShared, UnitTelemetry};
use crate::unit::validate_setpoint;
use crossbeam_channel::{Sender, TrySendError};
use motorloop_backend::{BackendError, BrakeMode, Capabilities, Capability};
use std::sync::Arc;

/// 单元控制句柄（可克隆，可跨线程）
#[derive(Clone)]
pub struct UnitController {
    id: UnitId,
    shared: Arc<UnitShared>,
    tx: Sender<Envelope>,
}

impl UnitController {
    pub(crate) fn new(id: UnitId, shared: Arc<UnitShared>, tx: Sender<Envelope>) -> Self {
        Self { id, shared, tx }
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn capabilities(&self) -> Capabilities {
        self.shared.capabilities
    }

    fn send(&self, command: UnitCommand) -> Result<(), ControlError> {
        self.tx
            .try_send(Envelope {
                unit: self.id,
                command,
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => ControlError::QueueFull,
                TrySendError::Disconnected(_) => ControlError::LoopStopped,
            })
    }

    // ==================== 目标值 ====================

    pub fn set(&self, mode: ControlMode, target: f64) -> Result<(), ControlError> {
        self.send_setpoint(mode, target, None)
    }

    pub fn set_with_auxiliary(
        &self,
        mode: ControlMode,
        target: f64,
        auxiliary_target: f64,
    ) -> Result<(), ControlError> {
        self.send_setpoint(mode, target, Some(auxiliary_target))
    }

    pub fn set_percent(&self, percent: f64) -> Result<(), ControlError> {
        self.set(ControlMode::PercentOutput, percent)
    }

    fn send_setpoint(
        &self,
        mode: ControlMode,
        target: f64,
        auxiliary: Option<f64>,
    ) -> Result<(), ControlError> {
        validate_setpoint(
            mode,
            target,
            auxiliary,
            self.shared.has_sensor_source(),
            self.shared.has_auxiliary_source(),
        )?;
        self.send(UnitCommand::Set {
            mode,
            target,
            auxiliary,
        })
    }

    pub fn follow(&self, master: UnitId) -> Result<(), ControlError> {
        if master == self.id {
            return Err(ControlError::SelfFollow(self.id.index()));
        }
        self.send(UnitCommand::Follow(master))
    }

    // ==================== 配置 ====================

    pub fn set_gains(&self, slot: Slot, gains: PidGains) -> Result<(), ControlError> {
        gains.validate()?;
        self.send(UnitCommand::SetGains { slot, gains })
    }

    /// 只设置 P/I/D，保留该槽位的前馈和积分阈值
    pub fn set_pid(&self, slot: Slot, kp: f64, ki: f64, kd: f64) -> Result<(), ControlError> {
        PidGains::pid(kp, ki, kd).validate()?;
        self.send(UnitCommand::SetPid { slot, kp, ki, kd })
    }

    pub fn set_conversion_factor(&self, factor: f64) -> Result<(), ControlError> {
        if !factor.is_finite() {
            return Err(ControlError::InvalidConfig(format!(
                "conversion factor must be finite, got {factor}"
            )));
        }
        self.send(UnitCommand::SetConversionFactor(factor))
    }

    pub fn invert_encoder(&self) -> Result<(), ControlError> {
        self.send(UnitCommand::InvertEncoder)
    }

    pub fn invert_motor(&self) -> Result<(), ControlError> {
        self.send(UnitCommand::InvertMotor)
    }

    /// 设置传感器信号源
    ///
    /// 设置后立即可以在此句柄上使用 Sensor 模式（命令按顺序应用）。
    pub fn set_sensor_source(
        &self,
        source: impl SignalSource + 'static,
    ) -> Result<(), ControlError> {
        self.send(UnitCommand::SetSensorSource(Box::new(source)))?;
        self.shared.mark_sensor_source();
        Ok(())
    }

    pub fn set_auxiliary_source(
        &self,
        source: impl SignalSource + 'static,
    ) -> Result<(), ControlError> {
        self.send(UnitCommand::SetAuxiliarySource(Box::new(source)))?;
        self.shared.mark_auxiliary_source();
        Ok(())
    }

    pub fn reset_encoder(&self) -> Result<(), ControlError> {
        if !self.shared.capabilities.supports(Capability::EncoderReset) {
            return Err(ControlError::Backend(BackendError::Unsupported(
                Capability::EncoderReset,
            )));
        }
        self.send(UnitCommand::ResetEncoder)
    }

    pub fn reset_pid(&self) -> Result<(), ControlError> {
        self.send(UnitCommand::ResetPid)
    }

    pub fn set_brake_mode(&self, mode: BrakeMode) -> Result<(), ControlError> {
        self.send(UnitCommand::SetBrakeMode(mode))
    }

    pub fn set_current_limit(&self, amps: u32) -> Result<(), ControlError> {
        self.send(UnitCommand::SetCurrentLimit(amps))
    }

    pub fn set_voltage_compensation(&self, volts: f64) -> Result<(), ControlError> {
        self.send(UnitCommand::SetVoltageCompensation(volts))
    }

    // ==================== 读取 ====================

    /// 最近一个周期的平滑主通道误差
    pub fn error(&self) -> f64 {
        self.shared.snapshot().error
    }

    pub fn auxiliary_error(&self) -> f64 {
        self.shared.snapshot().auxiliary_error
    }

    pub fn last_output(&self) -> f64 {
        self.shared.snapshot().output
    }

    /// 最近一个周期的完整快照
    pub fn telemetry(&self) -> Arc<UnitTelemetry> {
        self.shared.snapshot()
    }
}

impl std::fmt::Debug for UnitController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitController")
            .field("id", &self.id)
            .field("name", &self.shared.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::SchedulerConfig;
    use crate::error::ControlError;
    use crate::gains::{PidGains, Slot};
    use crate::mode::ControlMode;
    use crate::scheduler::Scheduler;
    use motorloop_backend::{BackendError, BrakeMode, Capabilities, MockBackend};

    #[test]
    fn test_validation_happens_at_call_site() {
        let mut s = Scheduler::new(SchedulerConfig::default()).unwrap();
        let (backend, _) = MockBackend::new("m");
        let id = s.add_unit(backend);
        let c = s.controller(id).unwrap();

        assert_eq!(
            c.set(ControlMode::Sensor, 1.0),
            Err(ControlError::MissingSensorSource)
        );
        assert_eq!(
            c.set(ControlMode::Follow, 1.0),
            Err(ControlError::FollowRequiresMaster)
        );
        assert_eq!(c.follow(id), Err(ControlError::SelfFollow(0)));
        assert!(c.set_gains(Slot::Position, PidGains::new(f64::NAN, 0.0, 0.0, 0.0, 0.0)).is_err());

        // 设置信号源后即可使用 Sensor 模式
        c.set_sensor_source(|| 1.0).unwrap();
        c.set(ControlMode::Sensor, 1.0).unwrap();
        s.tick();
        assert_eq!(s.unit(id).unwrap().mode(), ControlMode::Sensor);
    }

    #[test]
    fn test_reset_encoder_capability_check() {
        let mut s = Scheduler::new(SchedulerConfig::default()).unwrap();
        let (backend, _) = MockBackend::with_capabilities("venom", Capabilities::basic());
        let id = s.add_unit(backend);
        let c = s.controller(id).unwrap();
        assert!(matches!(
            c.reset_encoder(),
            Err(ControlError::Backend(BackendError::Unsupported(_)))
        ));
    }

    #[test]
    fn test_queue_full() {
        let config = SchedulerConfig {
            command_queue_capacity: 2,
            ..Default::default()
        };
        let mut s = Scheduler::new(config).unwrap();
        let (backend, _) = MockBackend::new("m");
        let id = s.add_unit(backend);
        let c = s.controller(id).unwrap();

        c.set_percent(0.1).unwrap();
        c.set_percent(0.2).unwrap();
        assert_eq!(c.set_percent(0.3), Err(ControlError::QueueFull));

        s.tick();
        c.set_percent(0.3).unwrap();
    }

    #[test]
    fn test_loop_stopped_after_scheduler_dropped() {
        let mut s = Scheduler::new(SchedulerConfig::default()).unwrap();
        let (backend, _) = MockBackend::new("m");
        let id = s.add_unit(backend);
        let c = s.controller(id).unwrap();
        drop(s);
        assert_eq!(c.set_percent(0.1), Err(ControlError::LoopStopped));
    }

    #[test]
    fn test_config_commands_reach_backend() {
        let mut s = Scheduler::new(SchedulerConfig::default()).unwrap();
        let (backend, handle) = MockBackend::new("m");
        let id = s.add_unit(backend);
        let c = s.controller(id).unwrap();

        c.set_brake_mode(BrakeMode::Brake).unwrap();
        c.set_current_limit(40).unwrap();
        c.set_voltage_compensation(12.0).unwrap();
        c.set_pid(Slot::Velocity, 0.5, 0.0, 0.0).unwrap();
        s.tick();

        assert_eq!(handle.brake_mode(), Some(BrakeMode::Brake));
        assert_eq!(handle.current_limit(), Some(40));
        assert_eq!(handle.voltage_compensation(), Some(12.0));
        assert_eq!(s.unit(id).unwrap().gains(Slot::Velocity).kp, 0.5);
    }

    #[test]
    fn test_telemetry_reflects_last_tick() {
        let mut s = Scheduler::new(SchedulerConfig::default()).unwrap();
        let (backend, handle) = MockBackend::new("m");
        let id = s.add_unit(backend);
        let c = s.controller(id).unwrap();
        handle.set_position(0.0);

        c.set_gains(Slot::Position, PidGains::pid(0.01, 0.0, 0.0))
            .unwrap();
        c.set(ControlMode::Position, 3.0).unwrap();
        for _ in 0..3 {
            s.tick();
        }

        let telemetry = c.telemetry();
        assert_eq!(telemetry.tick, 3);
        assert_eq!(telemetry.mode, ControlMode::Position);
        assert!((c.error() - 3.0).abs() < 1e-12);
        assert!((c.last_output() - 0.03).abs() < 1e-12);
    }
}
