//! 仿真后端
//!
//! 使用一阶电机模型模拟真实控制器，用于无硬件开发、CLI 演示和集成测试。
//!
//! # 模型
//!
//! ```text
//! dv/dt = (output * free_speed - v) / tau
//! dx/dt = v
//! ```
//!
//! 每次 `set_output()` 推进一个仿真步长（`SimPlant::step`），
//! 与控制循环周期保持一致即可得到确定性的闭环行为。

use crate::{BackendError, BackendFactory, BrakeMode, Capabilities, MotorBackend, Vendor};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// 仿真电机参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimPlant {
    /// 满输出时的稳态速度（原生单位/秒）
    pub free_speed: f64,
    /// 机械时间常数（秒）
    pub time_constant: f64,
    /// 堵转电流（A）
    pub stall_current: f64,
    /// 单步仿真时长
    pub step: Duration,
}

impl Default for SimPlant {
    fn default() -> Self {
        Self {
            free_speed: 6000.0,
            time_constant: 0.05,
            stall_current: 250.0,
            step: Duration::from_millis(2),
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    position: f64,
    velocity: f64,
    current: f64,
    output: f64,
    outputs_written: u64,
    brake_mode: BrakeMode,
    current_limit: Option<u32>,
    voltage_compensation: Option<f64>,
    encoder_offset: f64,
    disconnected: bool,
}

/// 仿真状态观察句柄（可跨线程克隆）
#[derive(Debug, Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimHandle {
    /// 编码器位置（含清零偏移）
    pub fn position(&self) -> f64 {
        let state = self.state.lock();
        state.position - state.encoder_offset
    }

    pub fn velocity(&self) -> f64 {
        self.state.lock().velocity
    }

    /// 最近一次写入的占空比
    pub fn last_output(&self) -> f64 {
        self.state.lock().output
    }

    pub fn outputs_written(&self) -> u64 {
        self.state.lock().outputs_written
    }

    pub fn brake_mode(&self) -> BrakeMode {
        self.state.lock().brake_mode
    }

    pub fn current_limit(&self) -> Option<u32> {
        self.state.lock().current_limit
    }

    pub fn voltage_compensation(&self) -> Option<f64> {
        self.state.lock().voltage_compensation
    }

    /// 施加外部扰动（直接覆盖速度）
    pub fn disturb_velocity(&self, velocity: f64) {
        self.state.lock().velocity = velocity;
    }

    /// 模拟线缆断开 / 恢复
    pub fn set_disconnected(&self, disconnected: bool) {
        self.state.lock().disconnected = disconnected;
    }
}

/// 仿真电机后端
pub struct SimBackend {
    vendor: Vendor,
    port: u16,
    plant: SimPlant,
    state: Arc<Mutex<SimState>>,
}

impl SimBackend {
    pub fn new(vendor: Vendor, port: u16, plant: SimPlant) -> Self {
        Self {
            vendor,
            port,
            plant,
            state: Arc::new(Mutex::new(SimState::default())),
        }
    }

    pub fn handle(&self) -> SimHandle {
        SimHandle {
            state: self.state.clone(),
        }
    }

    fn check_link(&self) -> Result<(), BackendError> {
        if self.state.lock().disconnected {
            return Err(BackendError::Disconnected);
        }
        Ok(())
    }

    fn advance(&self, state: &mut SimState) {
        let dt = self.plant.step.as_secs_f64();
        let mut tau = self.plant.time_constant.max(1e-6);
        if state.output == 0.0 && state.brake_mode == BrakeMode::Brake {
            tau /= 4.0;
        }
        let target = state.output * self.plant.free_speed;
        state.velocity += (target - state.velocity) * (dt / tau).min(1.0);
        state.position += state.velocity * dt;

        let back_emf = if self.plant.free_speed != 0.0 {
            state.velocity / self.plant.free_speed
        } else {
            0.0
        };
        let mut current = self.plant.stall_current * (state.output - back_emf).abs();
        if let Some(limit) = state.current_limit {
            current = current.min(f64::from(limit));
        }
        state.current = current;
    }
}

impl MotorBackend for SimBackend {
    fn describe(&self) -> String {
        format!("{}@{} (sim)", self.vendor, self.port)
    }

    fn capabilities(&self) -> Capabilities {
        self.vendor.capabilities()
    }

    fn position(&mut self) -> Result<f64, BackendError> {
        self.check_link()?;
        let state = self.state.lock();
        Ok(state.position - state.encoder_offset)
    }

    fn velocity(&mut self) -> Result<f64, BackendError> {
        self.check_link()?;
        Ok(self.state.lock().velocity)
    }

    fn current(&mut self) -> Result<f64, BackendError> {
        self.check_link()?;
        Ok(self.state.lock().current)
    }

    fn set_output(&mut self, percent: f64) -> Result<(), BackendError> {
        self.check_link()?;
        let mut state = self.state.lock();
        state.output = percent;
        state.outputs_written += 1;
        self.advance(&mut state);
        Ok(())
    }

    fn set_brake_mode(&mut self, mode: BrakeMode) -> Result<(), BackendError> {
        self.check_link()?;
        self.state.lock().brake_mode = mode;
        Ok(())
    }

    fn set_current_limit(&mut self, amps: u32) -> Result<(), BackendError> {
        if !self.capabilities().current_limit {
            warn!("{} motors do not support current limiting", self.vendor);
            return Ok(());
        }
        self.check_link()?;
        debug!("{}: current limit set to {} A", self.describe(), amps);
        self.state.lock().current_limit = Some(amps);
        Ok(())
    }

    fn set_voltage_compensation(&mut self, volts: f64) -> Result<(), BackendError> {
        if !self.capabilities().voltage_compensation {
            warn!("{} motors do not support voltage compensation", self.vendor);
            return Ok(());
        }
        self.check_link()?;
        self.state.lock().voltage_compensation = Some(volts);
        Ok(())
    }

    fn reset_encoder(&mut self) -> Result<(), BackendError> {
        if !self.capabilities().encoder_reset {
            return Err(BackendError::Unsupported(crate::Capability::EncoderReset));
        }
        self.check_link()?;
        let mut state = self.state.lock();
        state.encoder_offset = state.position;
        Ok(())
    }
}

/// 仿真工厂
///
/// 记录每个创建的后端句柄，便于上层按端口查看仿真状态。
#[derive(Debug, Default)]
pub struct SimFactory {
    plant: SimPlant,
    created: Mutex<Vec<(Vendor, u16, SimHandle)>>,
}

impl SimFactory {
    pub fn new(plant: SimPlant) -> Self {
        Self {
            plant,
            created: Mutex::new(Vec::new()),
        }
    }

    /// 按端口查找已创建的仿真句柄
    pub fn handle(&self, port: u16) -> Option<SimHandle> {
        self.created
            .lock()
            .iter()
            .find(|(_, p, _)| *p == port)
            .map(|(_, _, handle)| handle.clone())
    }
}

impl BackendFactory for SimFactory {
    fn create(&self, vendor: Vendor, port: u16) -> Result<Box<dyn MotorBackend>, BackendError> {
        let backend = SimBackend::new(vendor, port, self.plant);
        self.created.lock().push((vendor, port, backend.handle()));
        Ok(Box::new(backend))
    }
}
