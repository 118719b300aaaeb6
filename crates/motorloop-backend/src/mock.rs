//! Mock 后端
//!
//! 读取值由测试脚本直接设置，所有写入都会被记录，可注入读/写故障。
//! 不做任何物理仿真，适合精确验证控制律的数值。

use crate::{BackendError, BrakeMode, Capabilities, Capability, MotorBackend};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// 保留的最近输出数量（后台循环中长时间运行时丢弃更早的记录）
pub const OUTPUT_HISTORY: usize = 4096;

#[derive(Debug, Default)]
struct MockState {
    position: f64,
    velocity: f64,
    current: f64,
    outputs: VecDeque<f64>,
    outputs_written: u64,
    brake_mode: Option<BrakeMode>,
    current_limit: Option<u32>,
    voltage_compensation: Option<f64>,
    encoder_resets: u32,
    /// 剩余需要失败的读取次数
    failing_reads: u32,
    /// 剩余需要失败的写入次数
    failing_writes: u32,
}

/// Mock 后端的测试侧句柄
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    pub fn set_position(&self, position: f64) {
        self.state.lock().position = position;
    }

    pub fn set_velocity(&self, velocity: f64) {
        self.state.lock().velocity = velocity;
    }

    pub fn set_current(&self, current: f64) {
        self.state.lock().current = current;
    }

    /// 最近 [`OUTPUT_HISTORY`] 个写入的输出（按时间顺序）
    pub fn outputs(&self) -> Vec<f64> {
        self.state.lock().outputs.iter().copied().collect()
    }

    pub fn last_output(&self) -> Option<f64> {
        self.state.lock().outputs.back().copied()
    }

    /// 成功写入的输出总数（不受记录上限影响）
    pub fn outputs_written(&self) -> u64 {
        self.state.lock().outputs_written
    }

    pub fn brake_mode(&self) -> Option<BrakeMode> {
        self.state.lock().brake_mode
    }

    pub fn current_limit(&self) -> Option<u32> {
        self.state.lock().current_limit
    }

    pub fn voltage_compensation(&self) -> Option<f64> {
        self.state.lock().voltage_compensation
    }

    pub fn encoder_resets(&self) -> u32 {
        self.state.lock().encoder_resets
    }

    /// 接下来的 `count` 次读取返回 `BackendError::Io`
    pub fn fail_next_reads(&self, count: u32) {
        self.state.lock().failing_reads = count;
    }

    /// 接下来的 `count` 次写入返回 `BackendError::Io`
    pub fn fail_next_writes(&self, count: u32) {
        self.state.lock().failing_writes = count;
    }
}

/// Mock 后端
pub struct MockBackend {
    name: String,
    capabilities: Capabilities,
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// 创建支持全部可选能力的 Mock 后端
    pub fn new(name: impl Into<String>) -> (Self, MockHandle) {
        Self::with_capabilities(name, Capabilities::full())
    }

    pub fn with_capabilities(
        name: impl Into<String>,
        capabilities: Capabilities,
    ) -> (Self, MockHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let handle = MockHandle {
            state: state.clone(),
        };
        (
            Self {
                name: name.into(),
                capabilities,
                state,
            },
            handle,
        )
    }

    fn read(&self, pick: impl FnOnce(&MockState) -> f64) -> Result<f64, BackendError> {
        let mut state = self.state.lock();
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(BackendError::Io(format!("{}: injected read fault", self.name)));
        }
        Ok(pick(&*state))
    }

    fn write(&self, apply: impl FnOnce(&mut MockState)) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(BackendError::Io(format!("{}: injected write fault", self.name)));
        }
        apply(&mut *state);
        Ok(())
    }
}

impl MotorBackend for MockBackend {
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn position(&mut self) -> Result<f64, BackendError> {
        self.read(|s| s.position)
    }

    fn velocity(&mut self) -> Result<f64, BackendError> {
        self.read(|s| s.velocity)
    }

    fn current(&mut self) -> Result<f64, BackendError> {
        self.read(|s| s.current)
    }

    fn set_output(&mut self, percent: f64) -> Result<(), BackendError> {
        self.write(|s| {
            if s.outputs.len() == OUTPUT_HISTORY {
                s.outputs.pop_front();
            }
            s.outputs.push_back(percent);
            s.outputs_written += 1;
        })
    }

    fn set_brake_mode(&mut self, mode: BrakeMode) -> Result<(), BackendError> {
        self.write(|s| s.brake_mode = Some(mode))
    }

    fn set_current_limit(&mut self, amps: u32) -> Result<(), BackendError> {
        if !self.capabilities.current_limit {
            tracing::warn!("{} does not support current limiting", self.name);
            return Ok(());
        }
        self.write(|s| s.current_limit = Some(amps))
    }

    fn set_voltage_compensation(&mut self, volts: f64) -> Result<(), BackendError> {
        if !self.capabilities.voltage_compensation {
            tracing::warn!("{} does not support voltage compensation", self.name);
            return Ok(());
        }
        self.write(|s| s.voltage_compensation = Some(volts))
    }

    fn reset_encoder(&mut self) -> Result<(), BackendError> {
        if !self.capabilities.encoder_reset {
            return Err(BackendError::Unsupported(Capability::EncoderReset));
        }
        self.write(|s| {
            s.position = 0.0;
            s.encoder_resets += 1;
        })
    }
}
