//! # Motorloop Device Backend Layer
//!
//! 电机控制器硬件抽象层，为控制循环提供统一的设备接口。
//!
//! 每个厂商实现一个 [`MotorBackend`]，在构造时一次性解决所有厂商差异；
//! 控制核心从不根据后端类型分支。
//!
//! # 能力模型
//!
//! - 读取：位置、速度、电流
//! - 输出：占空比（percent output）、刹车/滑行模式
//! - 可选：电流限制、电压补偿（不支持时记录警告并忽略）
//! - 可选：编码器清零（不支持时返回 [`BackendError::Unsupported`]）

use thiserror::Error;
use tracing::warn;

pub mod mock;
pub mod sim;
pub mod vendor;

pub use mock::{MockBackend, MockHandle};
pub use sim::{SimBackend, SimFactory, SimHandle, SimPlant};
pub use vendor::Vendor;

/// 后端统一错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// 通信错误（瞬态，下一周期重试）
    #[error("IO Error: {0}")]
    Io(String),
    /// 设备响应超时
    #[error("Device timeout")]
    Timeout,
    /// 设备断开
    #[error("Device disconnected")]
    Disconnected,
    /// 设备不支持该能力
    #[error("Capability not supported: {0}")]
    Unsupported(Capability),
}

impl BackendError {
    /// 是否为可重试的瞬态错误
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Io(_) | BackendError::Timeout)
    }
}

/// 可选能力
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    CurrentLimit,
    VoltageCompensation,
    EncoderReset,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Capability::CurrentLimit => "current limiting",
            Capability::VoltageCompensation => "voltage compensation",
            Capability::EncoderReset => "encoder reset",
        };
        f.write_str(name)
    }
}

/// 后端能力集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub current_limit: bool,
    pub voltage_compensation: bool,
    pub encoder_reset: bool,
}

impl Capabilities {
    /// 只有必需能力（读取 + 输出）
    pub const fn basic() -> Self {
        Self {
            current_limit: false,
            voltage_compensation: false,
            encoder_reset: false,
        }
    }

    /// 所有可选能力
    pub const fn full() -> Self {
        Self {
            current_limit: true,
            voltage_compensation: true,
            encoder_reset: true,
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::CurrentLimit => self.current_limit,
            Capability::VoltageCompensation => self.voltage_compensation,
            Capability::EncoderReset => self.encoder_reset,
        }
    }
}

/// 电机空闲模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BrakeMode {
    Brake,
    #[default]
    Coast,
}

/// 电机控制器后端
///
/// 控制循环线程独占持有后端，因此所有方法都使用 `&mut self`。
///
/// # 默认实现
///
/// `set_current_limit` / `set_voltage_compensation` 的默认实现是
/// “记录警告 + 空操作”，不支持这些能力的后端无需覆盖。
/// `reset_encoder` 默认返回 [`BackendError::Unsupported`]。
pub trait MotorBackend: Send {
    /// 用于日志的设备描述（如 `"Falcon500@41"`）
    fn describe(&self) -> String {
        "motor".to_string()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::basic()
    }

    /// 原始位置（设备原生单位）
    fn position(&mut self) -> Result<f64, BackendError>;

    /// 原始速度（设备原生单位）
    fn velocity(&mut self) -> Result<f64, BackendError>;

    /// 输出电流（A）
    fn current(&mut self) -> Result<f64, BackendError>;

    /// 设置占空比输出
    fn set_output(&mut self, percent: f64) -> Result<(), BackendError>;

    fn set_brake_mode(&mut self, mode: BrakeMode) -> Result<(), BackendError>;

    fn set_current_limit(&mut self, amps: u32) -> Result<(), BackendError> {
        warn!(
            "{} does not support current limiting, ignoring limit of {} A",
            self.describe(),
            amps
        );
        Ok(())
    }

    fn set_voltage_compensation(&mut self, volts: f64) -> Result<(), BackendError> {
        warn!(
            "{} does not support voltage compensation, ignoring {} V",
            self.describe(),
            volts
        );
        Ok(())
    }

    fn reset_encoder(&mut self) -> Result<(), BackendError> {
        Err(BackendError::Unsupported(Capability::EncoderReset))
    }
}

impl<B: MotorBackend + ?Sized> MotorBackend for Box<B> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn capabilities(&self) -> Capabilities {
        (**self).capabilities()
    }

    fn position(&mut self) -> Result<f64, BackendError> {
        (**self).position()
    }

    fn velocity(&mut self) -> Result<f64, BackendError> {
        (**self).velocity()
    }

    fn current(&mut self) -> Result<f64, BackendError> {
        (**self).current()
    }

    fn set_output(&mut self, percent: f64) -> Result<(), BackendError> {
        (**self).set_output(percent)
    }

    fn set_brake_mode(&mut self, mode: BrakeMode) -> Result<(), BackendError> {
        (**self).set_brake_mode(mode)
    }

    fn set_current_limit(&mut self, amps: u32) -> Result<(), BackendError> {
        (**self).set_current_limit(amps)
    }

    fn set_voltage_compensation(&mut self, volts: f64) -> Result<(), BackendError> {
        (**self).set_voltage_compensation(volts)
    }

    fn reset_encoder(&mut self) -> Result<(), BackendError> {
        (**self).reset_encoder()
    }
}

/// 后端工厂（每个厂商/环境一个实现）
///
/// 接收厂商类型和硬件地址（CAN ID / PWM 端口），返回已绑定的后端。
pub trait BackendFactory {
    fn create(&self, vendor: Vendor, port: u16) -> Result<Box<dyn MotorBackend>, BackendError>;
}
