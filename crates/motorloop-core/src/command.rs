//! 跨线程命令
//!
//! 应用线程通过 [`UnitController`](crate::UnitController) 发送命令，控制循环在每个
//! 周期开始时统一应用，保证一个周期内单元状态不会被中途修改。

use crate::error::ControlError;
use crate::gains::{PidGains, Slot};
use crate::mode::ControlMode;
use crate::scheduler::UnitId;
use crate::source::SignalSource;
use crate::unit::MotorUnit;
use motorloop_backend::BrakeMode;

pub(crate) enum UnitCommand {
    Set {
        mode: ControlMode,
        target: f64,
        auxiliary: Option<f64>,
    },
    SetGains {
        slot: Slot,
        gains: PidGains,
    },
    SetPid {
        slot: Slot,
        kp: f64,
        ki: f64,
        kd: f64,
    },
    SetConversionFactor(f64),
    InvertEncoder,
    InvertMotor,
    SetSensorSource(Box<dyn SignalSource>),
    SetAuxiliarySource(Box<dyn SignalSource>),
    ResetEncoder,
    ResetPid,
    /// 跟随关系需要调度器重排，由调度器处理
    Follow(UnitId),
    SetBrakeMode(BrakeMode),
    SetCurrentLimit(u32),
    SetVoltageCompensation(f64),
}

impl UnitCommand {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            UnitCommand::Set { .. } => "set",
            UnitCommand::SetGains { .. } => "set_gains",
            UnitCommand::SetPid { .. } => "set_pid",
            UnitCommand::SetConversionFactor(_) => "set_conversion_factor",
            UnitCommand::InvertEncoder => "invert_encoder",
            UnitCommand::InvertMotor => "invert_motor",
            UnitCommand::SetSensorSource(_) => "set_sensor_source",
            UnitCommand::SetAuxiliarySource(_) => "set_auxiliary_source",
            UnitCommand::ResetEncoder => "reset_encoder",
            UnitCommand::ResetPid => "reset_pid",
            UnitCommand::Follow(_) => "follow",
            UnitCommand::SetBrakeMode(_) => "set_brake_mode",
            UnitCommand::SetCurrentLimit(_) => "set_current_limit",
            UnitCommand::SetVoltageCompensation(_) => "set_voltage_compensation",
        }
    }

    /// 应用到单元（`Follow` 除外）
    pub(crate) fn apply(self, unit: &mut MotorUnit) -> Result<(), ControlError> {
        match self {
            UnitCommand::Set {
                mode,
                target,
                auxiliary: Some(aux),
            } => unit.set_with_auxiliary(mode, target, aux),
            UnitCommand::Set {
                mode,
                target,
                auxiliary: None,
            } => unit.set(mode, target),
            UnitCommand::SetGains { slot, gains } => unit.set_gains(slot, gains),
            UnitCommand::SetPid { slot, kp, ki, kd } => unit.set_pid(slot, kp, ki, kd),
            UnitCommand::SetConversionFactor(factor) => unit.set_conversion_factor(factor),
            UnitCommand::InvertEncoder => {
                unit.invert_encoder();
                Ok(())
            },
            UnitCommand::InvertMotor => {
                unit.invert_motor();
                Ok(())
            },
            UnitCommand::SetSensorSource(source) => {
                unit.set_sensor_source_boxed(source);
                Ok(())
            },
            UnitCommand::SetAuxiliarySource(source) => {
                unit.set_auxiliary_source_boxed(source);
                Ok(())
            },
            UnitCommand::ResetEncoder => unit.reset_encoder(),
            UnitCommand::ResetPid => {
                unit.reset_pid();
                Ok(())
            },
            UnitCommand::Follow(_) => Err(ControlError::InvalidConfig(
                "follow must be applied by the scheduler".to_string(),
            )),
            UnitCommand::SetBrakeMode(mode) => unit.set_brake_mode(mode),
            UnitCommand::SetCurrentLimit(amps) => unit.set_current_limit(amps),
            UnitCommand::SetVoltageCompensation(volts) => unit.set_voltage_compensation(volts),
        }
    }
}

/// 带目标单元的命令
pub(crate) struct Envelope {
    pub(crate) unit: UnitId,
    pub(crate) command: UnitCommand,
}
