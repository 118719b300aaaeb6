//! Motor Control Unit - 电机控制单元
//!
//! 每个单元独占一个设备后端，保存 4 槽位增益表、当前模式/目标值以及
//! 滤波器和积分器状态，每个控制周期计算一次输出。
//!
//! # 单周期算法
//!
//! ```text
//! Follow:         output = master.last_output
//! PercentOutput:  output = setpoint
//! 闭环模式:
//!   e_raw      = setpoint - measurement
//!   e          = mean(最近 3 个 e_raw)
//!   integral  += e * period_ms          （仅当 |integral| < izone）
//!   derivative = (e - e_prev) / period_ms
//!   output     = kp*e + ki*integral + kd*derivative + kf*setpoint
//!   (+ 辅助通道同样的计算，使用槽位 3)
//! ```
//!
//! 输出再乘以反转符号，钳位到 `[-output_limit, output_limit]` 后写入后端。
//!
//! 更新步骤只由调度器调用，应用代码通过 `set()` 系列方法修改目标值。

use crate::config::FaultPolicy;
use crate::error::ControlError;
use crate::filter::ErrorHistory;
use crate::gains::{GainTable, PidGains, Slot};
use crate::mode::ControlMode;
use crate::scheduler::UnitId;
use crate::source::SignalSource;
use crate::telemetry::{UnitShared, UnitTelemetry};
use motorloop_backend::{BackendError, BrakeMode, Capabilities, MotorBackend};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// 单个 PID 通道的运行状态
#[derive(Debug, Clone, Default)]
struct PidChannel {
    history: ErrorHistory,
    integral: f64,
    /// 上一周期的平滑误差
    prev_error: f64,
}

impl PidChannel {
    fn step(&mut self, raw_error: f64, gains: &PidGains, setpoint: f64, period_ms: f64) -> f64 {
        let error = self.history.push(raw_error);

        // 积分冻结：达到阈值后停止累积，但不回退
        if self.integral.abs() < gains.izone {
            self.integral += error * period_ms;
        }

        let derivative = (error - self.prev_error) / period_ms;
        self.prev_error = error;

        gains.kp * error + gains.ki * self.integral + gains.kd * derivative + setpoint * gains.kf
    }

    fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = 0.0;
    }
}

/// 单周期的调度器输入
#[derive(Debug, Clone, Copy)]
pub(crate) struct TickInput {
    pub(crate) period_ms: f64,
    pub(crate) output_limit: f64,
    pub(crate) fault_policy: FaultPolicy,
    pub(crate) sample_feedback: bool,
    /// 主单元本周期的输出（仅 Follow 模式使用）
    pub(crate) master_output: Option<f64>,
}

/// 单元在某个周期内的故障
#[derive(Error, Debug, Clone, PartialEq)]
pub(crate) enum UnitFault {
    #[error("backend fault: {0}")]
    Backend(#[from] BackendError),
    #[error("signal source missing")]
    MissingSource,
    #[error("non-finite output: {0}")]
    NonFiniteOutput(f64),
}

#[derive(Debug, Clone, Copy, Default)]
struct Feedback {
    position: Option<f64>,
    velocity: Option<f64>,
    current: Option<f64>,
}

/// 目标值校验（单元和 `UnitController` 共用）
pub(crate) fn validate_setpoint(
    mode: ControlMode,
    target: f64,
    auxiliary: Option<f64>,
    has_sensor_source: bool,
    has_auxiliary_source: bool,
) -> Result<(), ControlError> {
    if mode == ControlMode::Follow {
        return Err(ControlError::FollowRequiresMaster);
    }
    if !target.is_finite() {
        return Err(ControlError::InvalidSetpoint(target));
    }
    if mode == ControlMode::Sensor && !has_sensor_source {
        return Err(ControlError::MissingSensorSource);
    }
    if let Some(aux_target) = auxiliary {
        if !aux_target.is_finite() {
            return Err(ControlError::InvalidSetpoint(aux_target));
        }
        if !has_auxiliary_source {
            return Err(ControlError::MissingAuxiliarySource);
        }
    }
    Ok(())
}

/// 电机控制单元
///
/// 只能通过 [`Scheduler::add_unit`](crate::Scheduler::add_unit) 创建，
/// 创建即注册，生命周期内不会被移除。
pub struct MotorUnit {
    id: UnitId,
    backend: Box<dyn MotorBackend>,
    shared: Arc<UnitShared>,

    mode: ControlMode,
    setpoint: f64,
    auxiliary_setpoint: f64,
    auxiliary_enabled: bool,

    gains: GainTable,
    primary: PidChannel,
    auxiliary: PidChannel,

    conversion_factor: f64,
    motor_inverted: bool,
    encoder_inverted: bool,

    master: Option<UnitId>,
    sensor_source: Option<Box<dyn SignalSource>>,
    auxiliary_source: Option<Box<dyn SignalSource>>,

    raw_output: f64,
    last_output: f64,
    feedback: Feedback,
    consecutive_faults: u32,
    ticks: u64,
}

impl MotorUnit {
    pub(crate) fn new(id: UnitId, name: String, backend: Box<dyn MotorBackend>) -> Self {
        let shared = Arc::new(UnitShared::new(name, backend.capabilities()));
        Self {
            id,
            backend,
            shared,
            mode: ControlMode::PercentOutput,
            setpoint: 0.0,
            auxiliary_setpoint: 0.0,
            auxiliary_enabled: false,
            gains: GainTable::new(),
            primary: PidChannel::default(),
            auxiliary: PidChannel::default(),
            conversion_factor: 1.0,
            motor_inverted: false,
            encoder_inverted: false,
            master: None,
            sensor_source: None,
            auxiliary_source: None,
            raw_output: 0.0,
            last_output: 0.0,
            feedback: Feedback::default(),
            consecutive_faults: 0,
            ticks: 0,
        }
    }

    pub(crate) fn shared(&self) -> &Arc<UnitShared> {
        &self.shared
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

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    pub fn auxiliary_setpoint(&self) -> f64 {
        self.auxiliary_setpoint
    }

    pub fn is_auxiliary_enabled(&self) -> bool {
        self.auxiliary_enabled
    }

    pub fn gains(&self, slot: Slot) -> PidGains {
        self.gains[slot]
    }

    /// 主单元（仅 Follow 模式下存在）
    pub fn master(&self) -> Option<UnitId> {
        self.master
    }

    /// 上一周期的平滑主通道误差
    pub fn error(&self) -> f64 {
        self.primary.prev_error
    }

    pub fn auxiliary_error(&self) -> f64 {
        self.auxiliary.prev_error
    }

    pub fn integral(&self) -> f64 {
        self.primary.integral
    }

    pub fn auxiliary_integral(&self) -> f64 {
        self.auxiliary.integral
    }

    /// 上一周期写入后端的输出（已反转、已钳位）
    pub fn last_output(&self) -> f64 {
        self.last_output
    }

    /// 上一周期钳位前的输出
    pub fn raw_output(&self) -> f64 {
        self.raw_output
    }

    pub fn conversion_factor(&self) -> f64 {
        self.conversion_factor
    }

    pub fn is_motor_inverted(&self) -> bool {
        self.motor_inverted
    }

    pub fn is_encoder_inverted(&self) -> bool {
        self.encoder_inverted
    }

    pub fn consecutive_faults(&self) -> u32 {
        self.consecutive_faults
    }

    // ==================== 配置 ====================

    /// 设置某个槽位的完整增益（不影响运行状态）
    pub fn set_gains(&mut self, slot: Slot, gains: PidGains) -> Result<(), ControlError> {
        gains.validate()?;
        self.gains[slot] = gains;
        Ok(())
    }

    /// 只设置 P/I/D，保留该槽位的前馈和积分阈值
    pub fn set_pid(&mut self, slot: Slot, kp: f64, ki: f64, kd: f64) -> Result<(), ControlError> {
        let current = self.gains[slot];
        self.set_gains(slot, PidGains::new(kp, ki, kd, current.kf, current.izone))
    }

    /// 设置原生单位到用户单位的转换系数
    ///
    /// 编码器已反转时，符号会保持反转。
    pub fn set_conversion_factor(&mut self, factor: f64) -> Result<(), ControlError> {
        if !factor.is_finite() {
            return Err(ControlError::InvalidConfig(format!(
                "conversion factor must be finite, got {factor}"
            )));
        }
        self.conversion_factor = if self.encoder_inverted {
            -factor
        } else {
            factor
        };
        Ok(())
    }

    /// 反转编码器方向（同时对转换系数取反）
    pub fn invert_encoder(&mut self) {
        self.encoder_inverted = !self.encoder_inverted;
        self.conversion_factor = -self.conversion_factor;
    }

    /// 反转电机输出方向
    ///
    /// 缓存的 `last_output` 已包含反转，因此反转主单元时跟随者也会随之反向。
    pub fn invert_motor(&mut self) {
        self.motor_inverted = !self.motor_inverted;
    }

    pub fn set_sensor_source(&mut self, source: impl SignalSource + 'static) {
        self.set_sensor_source_boxed(Box::new(source));
    }

    pub(crate) fn set_sensor_source_boxed(&mut self, source: Box<dyn SignalSource>) {
        self.sensor_source = Some(source);
        self.shared.mark_sensor_source();
    }

    pub fn set_auxiliary_source(&mut self, source: impl SignalSource + 'static) {
        self.set_auxiliary_source_boxed(Box::new(source));
    }

    pub(crate) fn set_auxiliary_source_boxed(&mut self, source: Box<dyn SignalSource>) {
        self.auxiliary_source = Some(source);
        self.shared.mark_auxiliary_source();
    }

    pub fn has_sensor_source(&self) -> bool {
        self.sensor_source.is_some()
    }

    pub fn has_auxiliary_source(&self) -> bool {
        self.auxiliary_source.is_some()
    }

    /// 编码器清零（后端不支持时返回 `Unsupported`）
    pub fn reset_encoder(&mut self) -> Result<(), ControlError> {
        self.backend.reset_encoder()?;
        Ok(())
    }

    pub fn set_brake_mode(&mut self, mode: BrakeMode) -> Result<(), ControlError> {
        self.backend.set_brake_mode(mode)?;
        Ok(())
    }

    /// 电流限制（不支持的后端记录警告并忽略）
    pub fn set_current_limit(&mut self, amps: u32) -> Result<(), ControlError> {
        self.backend.set_current_limit(amps)?;
        Ok(())
    }

    /// 电压补偿（不支持的后端记录警告并忽略）
    pub fn set_voltage_compensation(&mut self, volts: f64) -> Result<(), ControlError> {
        self.backend.set_voltage_compensation(volts)?;
        Ok(())
    }

    // ==================== 直通读取 ====================

    pub fn current(&mut self) -> Result<f64, ControlError> {
        Ok(self.backend.current()?)
    }

    /// 速度（已乘以转换系数）
    pub fn velocity(&mut self) -> Result<f64, ControlError> {
        Ok(self.backend.velocity()? * self.conversion_factor)
    }

    /// 位置（已乘以转换系数）
    pub fn position(&mut self) -> Result<f64, ControlError> {
        Ok(self.backend.position()? * self.conversion_factor)
    }

    // ==================== 目标值 ====================

    /// `set(ControlMode::PercentOutput, percent)` 的简写
    pub fn set_percent(&mut self, percent: f64) -> Result<(), ControlError> {
        self.set(ControlMode::PercentOutput, percent)
    }

    /// 设置模式和目标值，关闭辅助通道
    pub fn set(&mut self, mode: ControlMode, target: f64) -> Result<(), ControlError> {
        self.apply_setpoint(mode, target, None)
    }

    /// 设置模式、主目标值和辅助目标值，开启辅助通道
    pub fn set_with_auxiliary(
        &mut self,
        mode: ControlMode,
        target: f64,
        auxiliary_target: f64,
    ) -> Result<(), ControlError> {
        self.apply_setpoint(mode, target, Some(auxiliary_target))
    }

    fn apply_setpoint(
        &mut self,
        mode: ControlMode,
        target: f64,
        auxiliary: Option<f64>,
    ) -> Result<(), ControlError> {
        validate_setpoint(
            mode,
            target,
            auxiliary,
            self.sensor_source.is_some(),
            self.auxiliary_source.is_some(),
        )?;

        let use_auxiliary = auxiliary.is_some();
        if self.mode != mode || self.auxiliary_enabled != use_auxiliary {
            debug!(
                "{}: {:?} -> {:?} (auxiliary: {})",
                self.name(),
                self.mode,
                mode,
                use_auxiliary
            );
            self.reset_pid();
        }

        self.mode = mode;
        self.master = None;
        self.setpoint = target;
        self.auxiliary_enabled = use_auxiliary;
        if let Some(aux_target) = auxiliary {
            self.auxiliary_setpoint = aux_target;
        }
        Ok(())
    }

    /// 清零两个积分项和两个上次误差项
    pub fn reset_pid(&mut self) {
        self.primary.reset();
        self.auxiliary.reset();
    }

    /// 进入跟随模式（重排由调度器负责）
    pub(crate) fn begin_follow(&mut self, master: UnitId) {
        if self.mode != ControlMode::Follow || self.auxiliary_enabled {
            self.reset_pid();
        }
        self.mode = ControlMode::Follow;
        self.master = Some(master);
        self.auxiliary_enabled = false;
    }

    // ==================== 控制周期 ====================

    /// 执行一个控制周期并发布遥测
    pub(crate) fn update(&mut self, input: &TickInput) -> Result<(), UnitFault> {
        self.ticks += 1;
        self.feedback = Feedback::default();

        let result = self.run_control(input);
        match &result {
            Ok(()) => {
                if self.consecutive_faults > 0 {
                    info!(
                        "{}: recovered after {} faulted ticks",
                        self.name(),
                        self.consecutive_faults
                    );
                }
                self.consecutive_faults = 0;
            },
            Err(fault) => self.apply_fault(fault, input.fault_policy),
        }

        if input.sample_feedback {
            self.sample_feedback();
        }
        self.shared.publish(self.telemetry());
        result
    }

    fn run_control(&mut self, input: &TickInput) -> Result<(), UnitFault> {
        // 写入失败时回滚到本周期之前的 PID 状态
        let staged = (self.primary.clone(), self.auxiliary.clone());
        let sign = if self.motor_inverted { -1.0 } else { 1.0 };
        let raw = match self.mode {
            // 主单元的输出已经包含它自己的反转
            ControlMode::Follow => sign * input.master_output.unwrap_or(0.0),
            ControlMode::PercentOutput => sign * self.setpoint,
            mode => sign * self.closed_loop(mode, input.period_ms)?,
        };

        if !raw.is_finite() {
            return Err(UnitFault::NonFiniteOutput(raw));
        }

        let output = raw.clamp(-input.output_limit, input.output_limit);
        if let Err(e) = self.backend.set_output(output) {
            (self.primary, self.auxiliary) = staged;
            return Err(e.into());
        }
        self.raw_output = raw;
        self.last_output = output;
        Ok(())
    }

    /// 闭环计算（返回反转前的输出）
    ///
    /// 所有测量值在修改 PID 状态之前读取，读取失败时状态保持不变。
    /// 写入失败由 `run_control` 回滚。
    fn closed_loop(&mut self, mode: ControlMode, period_ms: f64) -> Result<f64, UnitFault> {
        let Some(slot) = mode.slot() else {
            return Ok(0.0);
        };

        let measurement = match mode {
            ControlMode::Position => {
                let position = self.backend.position()? * self.conversion_factor;
                self.feedback.position = Some(position);
                position
            },
            ControlMode::Velocity => {
                let velocity = self.backend.velocity()? * self.conversion_factor;
                self.feedback.velocity = Some(velocity);
                velocity
            },
            _ => self
                .sensor_source
                .as_mut()
                .ok_or(UnitFault::MissingSource)?
                .sample()?,
        };

        let auxiliary_measurement = if self.auxiliary_enabled {
            Some(
                self.auxiliary_source
                    .as_mut()
                    .ok_or(UnitFault::MissingSource)?
                    .sample()?,
            )
        } else {
            None
        };

        let gains = self.gains[slot];
        let mut output = self.primary.step(
            self.setpoint - measurement,
            &gains,
            self.setpoint,
            period_ms,
        );

        if let Some(aux_measurement) = auxiliary_measurement {
            let aux_gains = self.gains[Slot::Auxiliary];
            output += self.auxiliary.step(
                self.auxiliary_setpoint - aux_measurement,
                &aux_gains,
                self.auxiliary_setpoint,
                period_ms,
            );
        }

        Ok(output)
    }

    fn apply_fault(&mut self, fault: &UnitFault, policy: FaultPolicy) {
        self.consecutive_faults = self.consecutive_faults.saturating_add(1);
        if matches!(fault, UnitFault::NonFiniteOutput(_)) {
            self.reset_pid();
        }

        let fallback = match policy {
            FaultPolicy::Neutral => 0.0,
            FaultPolicy::HoldLastOutput => self.last_output,
        };

        if self.consecutive_faults == 1 {
            warn!(
                "{}: {}, driving {:.3} until recovery ({:?})",
                self.name(),
                fault,
                fallback,
                policy
            );
        } else {
            trace!("{}: still faulted ({})", self.name(), fault);
        }

        self.raw_output = fallback;
        self.last_output = fallback;
        if let Err(e) = self.backend.set_output(fallback) {
            trace!("{}: fallback output failed: {}", self.name(), e);
        }
    }

    fn sample_feedback(&mut self) {
        if self.feedback.position.is_none() {
            self.feedback.position = self
                .backend
                .position()
                .ok()
                .map(|p| p * self.conversion_factor);
        }
        if self.feedback.velocity.is_none() {
            self.feedback.velocity = self
                .backend
                .velocity()
                .ok()
                .map(|v| v * self.conversion_factor);
        }
        self.feedback.current = self.backend.current().ok();
    }

    /// 当前状态快照
    pub fn telemetry(&self) -> UnitTelemetry {
        UnitTelemetry {
            tick: self.ticks,
            mode: self.mode,
            setpoint: self.setpoint,
            auxiliary_setpoint: self.auxiliary_setpoint,
            auxiliary_enabled: self.auxiliary_enabled,
            error: self.primary.prev_error,
            auxiliary_error: self.auxiliary.prev_error,
            integral: self.primary.integral,
            auxiliary_integral: self.auxiliary.integral,
            raw_output: self.raw_output,
            output: self.last_output,
            position: self.feedback.position,
            velocity: self.feedback.velocity,
            current: self.feedback.current,
            consecutive_faults: self.consecutive_faults,
        }
    }
}

impl std::fmt::Debug for MotorUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotorUnit")
            .field("id", &self.id)
            .field("name", &self.shared.name)
            .field("mode", &self.mode)
            .field("setpoint", &self.setpoint)
            .field("master", &self.master)
            .field("last_output", &self.last_output)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motorloop_backend::{Capabilities, MockBackend, MockHandle};

    fn mock_unit() -> (MotorUnit, MockHandle) {
        let (backend, handle) = MockBackend::new("mock");
        (
            MotorUnit::new(UnitId(0), "mock".to_string(), Box::new(backend)),
            handle,
        )
    }

    fn input(output_limit: f64) -> TickInput {
        TickInput {
            period_ms: 2.0,
            output_limit,
            fault_policy: FaultPolicy::Neutral,
            sample_feedback: false,
            master_output: None,
        }
    }

    fn tick_n(unit: &mut MotorUnit, n: usize, input: &TickInput) {
        for _ in 0..n {
            let _ = unit.update(input);
        }
    }

    #[test]
    fn test_initial_state() {
        let (unit, _) = mock_unit();
        assert_eq!(unit.mode(), ControlMode::PercentOutput);
        assert_eq!(unit.last_output(), 0.0);
        assert_eq!(unit.conversion_factor(), 1.0);
        assert!(!unit.is_auxiliary_enabled());
    }

    #[test]
    fn test_percent_output_ignores_gains() {
        let (mut unit, handle) = mock_unit();
        unit.set_gains(Slot::Position, PidGains::new(5.0, 1.0, 1.0, 1.0, 10.0))
            .unwrap();
        unit.set_percent(0.4).unwrap();
        unit.update(&input(1.0)).unwrap();
        assert_eq!(unit.last_output(), 0.4);
        assert_eq!(handle.last_output(), Some(0.4));

        unit.invert_motor();
        unit.update(&input(1.0)).unwrap();
        assert_eq!(unit.last_output(), -0.4);
        assert_eq!(handle.last_output(), Some(-0.4));
    }

    #[test]
    fn test_velocity_proportional_scenario() {
        let (mut unit, handle) = mock_unit();
        handle.set_velocity(0.0);
        unit.set_gains(Slot::Velocity, PidGains::new(1.0, 0.0, 0.0, 0.0, 100.0))
            .unwrap();
        unit.set(ControlMode::Velocity, 10.0).unwrap();

        tick_n(&mut unit, 3, &input(1.0));

        assert_eq!(unit.error(), 10.0);
        assert_eq!(unit.raw_output(), 10.0);
        // 写入后端前钳位
        assert_eq!(unit.last_output(), 1.0);
        assert_eq!(handle.last_output(), Some(1.0));
    }

    #[test]
    fn test_output_is_clamped_to_limit() {
        let (mut unit, handle) = mock_unit();
        unit.set_percent(3.0).unwrap();
        unit.update(&input(1.0)).unwrap();
        assert_eq!(unit.raw_output(), 3.0);
        assert_eq!(handle.last_output(), Some(1.0));

        unit.set_percent(-3.0).unwrap();
        unit.update(&input(0.5)).unwrap();
        assert_eq!(handle.last_output(), Some(-0.5));
    }

    #[test]
    fn test_mode_change_resets_integrators_before_next_tick() {
        let (mut unit, handle) = mock_unit();
        handle.set_position(0.0);
        unit.set_gains(Slot::Position, PidGains::new(0.0, 1.0, 0.0, 0.0, 1000.0))
            .unwrap();
        unit.set(ControlMode::Position, 5.0).unwrap();
        tick_n(&mut unit, 5, &input(1.0));
        assert!(unit.integral() > 0.0);
        assert!(unit.error() > 0.0);

        unit.set(ControlMode::Velocity, 5.0).unwrap();
        assert_eq!(unit.integral(), 0.0);
        assert_eq!(unit.error(), 0.0);
        assert_eq!(unit.auxiliary_integral(), 0.0);
        assert_eq!(unit.auxiliary_error(), 0.0);
    }

    #[test]
    fn test_repeated_set_does_not_reset() {
        let (mut unit, handle) = mock_unit();
        handle.set_position(0.0);
        unit.set_gains(Slot::Position, PidGains::new(0.0, 1.0, 0.0, 0.0, 1000.0))
            .unwrap();
        unit.set(ControlMode::Position, 5.0).unwrap();
        tick_n(&mut unit, 5, &input(1.0));
        let integral = unit.integral();

        unit.set(ControlMode::Position, 5.0).unwrap();
        unit.set(ControlMode::Position, 6.0).unwrap();
        assert_eq!(unit.integral(), integral);
        assert_eq!(unit.setpoint(), 6.0);
    }

    #[test]
    fn test_toggling_auxiliary_resets() {
        let (mut unit, handle) = mock_unit();
        handle.set_position(0.0);
        unit.set_auxiliary_source(|| 0.0);
        unit.set_gains(Slot::Position, PidGains::new(0.0, 1.0, 0.0, 0.0, 1000.0))
            .unwrap();
        unit.set(ControlMode::Position, 5.0).unwrap();
        tick_n(&mut unit, 3, &input(1.0));
        assert!(unit.integral() > 0.0);

        // 同模式开启辅助通道
        unit.set_with_auxiliary(ControlMode::Position, 5.0, 1.0).unwrap();
        assert_eq!(unit.integral(), 0.0);
        tick_n(&mut unit, 3, &input(1.0));
        assert!(unit.integral() > 0.0);

        // 同模式关闭辅助通道
        unit.set(ControlMode::Position, 5.0).unwrap();
        assert_eq!(unit.integral(), 0.0);
        assert!(!unit.is_auxiliary_enabled());
    }

    #[test]
    fn test_zero_integral_zone_never_accumulates() {
        let (mut unit, handle) = mock_unit();
        handle.set_position(0.0);
        unit.set_gains(Slot::Position, PidGains::new(0.0, 1.0, 0.0, 0.0, 0.0))
            .unwrap();
        unit.set(ControlMode::Position, 100.0).unwrap();
        tick_n(&mut unit, 50, &input(1.0));
        assert_eq!(unit.integral(), 0.0);
    }

    #[test]
    fn test_integral_freezes_without_snapping_back() {
        let (mut unit, handle) = mock_unit();
        handle.set_position(0.0);
        unit.set_gains(Slot::Position, PidGains::new(0.0, 0.0, 0.0, 0.0, 5.0))
            .unwrap();
        unit.set(ControlMode::Position, 10.0).unwrap();

        // 第 1 周期：平滑误差 10/3，积分 = 10/3 * 2 ≈ 6.67 (>= 5，之后冻结)
        unit.update(&input(1.0)).unwrap();
        let frozen = unit.integral();
        assert!((frozen - 20.0 / 3.0).abs() < 1e-9);

        tick_n(&mut unit, 10, &input(1.0));
        assert_eq!(unit.integral(), frozen);

        // 误差反向也不会回退
        handle.set_position(20.0);
        tick_n(&mut unit, 10, &input(1.0));
        assert_eq!(unit.integral(), frozen);
    }

    #[test]
    fn test_derivative_uses_smoothed_error() {
        let (mut unit, handle) = mock_unit();
        handle.set_position(0.0);
        unit.set_gains(Slot::Position, PidGains::new(0.0, 0.0, 1.0, 0.0, 0.0))
            .unwrap();
        unit.set(ControlMode::Position, 10.0).unwrap();

        // 平滑误差 10/3, 20/3, 10：每周期变化 10/3，时间 2ms
        for _ in 0..3 {
            unit.update(&input(100.0)).unwrap();
            assert!((unit.raw_output() - 10.0 / 6.0).abs() < 1e-9);
        }
        unit.update(&input(100.0)).unwrap();
        assert!(unit.raw_output().abs() < 1e-12);
    }

    #[test]
    fn test_feedforward_uses_setpoint() {
        let (mut unit, handle) = mock_unit();
        handle.set_velocity(4.0);
        unit.set_gains(Slot::Velocity, PidGains::new(0.0, 0.0, 0.0, 0.5, 0.0))
            .unwrap();
        unit.set(ControlMode::Velocity, 4.0).unwrap();
        unit.update(&input(100.0)).unwrap();
        assert!((unit.raw_output() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_set_pid_keeps_feedforward_and_zone() {
        let (mut unit, _) = mock_unit();
        unit.set_gains(Slot::Sensor, PidGains::new(1.0, 2.0, 3.0, 4.0, 5.0))
            .unwrap();
        unit.set_pid(Slot::Sensor, 0.1, 0.2, 0.3).unwrap();
        assert_eq!(
            unit.gains(Slot::Sensor),
            PidGains::new(0.1, 0.2, 0.3, 4.0, 5.0)
        );
        assert!(unit.set_pid(Slot::Sensor, f64::NAN, 0.0, 0.0).is_err());
    }

    #[test]
    fn test_sensor_mode_requires_source() {
        let (mut unit, _) = mock_unit();
        assert_eq!(
            unit.set(ControlMode::Sensor, 1.0),
            Err(ControlError::MissingSensorSource)
        );
        assert_eq!(
            unit.set_with_auxiliary(ControlMode::Position, 1.0, 2.0),
            Err(ControlError::MissingAuxiliarySource)
        );
        // 失败的 set 不改变状态
        assert_eq!(unit.mode(), ControlMode::PercentOutput);

        unit.set_gains(Slot::Sensor, PidGains::new(1.0, 0.0, 0.0, 0.0, 0.0))
            .unwrap();
        unit.set_sensor_source(|| 2.0);
        unit.set(ControlMode::Sensor, 5.0).unwrap();
        tick_n(&mut unit, 3, &input(100.0));
        assert!((unit.error() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_follow_mode_rejected_by_set() {
        let (mut unit, _) = mock_unit();
        assert_eq!(
            unit.set(ControlMode::Follow, 0.0),
            Err(ControlError::FollowRequiresMaster)
        );
        assert!(matches!(
            unit.set_percent(f64::NAN),
            Err(ControlError::InvalidSetpoint(_))
        ));
        assert!(matches!(
            unit.set(ControlMode::Position, f64::INFINITY),
            Err(ControlError::InvalidSetpoint(_))
        ));
        assert_eq!(unit.mode(), ControlMode::PercentOutput);
    }

    #[test]
    fn test_auxiliary_channel_adds_contribution() {
        let (mut unit, handle) = mock_unit();
        handle.set_position(5.0);
        unit.set_auxiliary_source(|| 0.0);
        unit.set_gains(Slot::Position, PidGains::new(1.0, 0.0, 0.0, 0.0, 0.0))
            .unwrap();
        unit.set_gains(Slot::Auxiliary, PidGains::new(2.0, 0.0, 0.0, 0.0, 0.0))
            .unwrap();
        unit.set_with_auxiliary(ControlMode::Position, 5.0, 3.0)
            .unwrap();
        tick_n(&mut unit, 3, &input(100.0));

        assert_eq!(unit.error(), 0.0);
        assert!((unit.auxiliary_error() - 3.0).abs() < 1e-12);
        assert!((unit.raw_output() - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_conversion_factor_and_encoder_inversion() {
        let (mut unit, handle) = mock_unit();
        handle.set_position(5.0);
        handle.set_velocity(-1.0);
        unit.set_conversion_factor(2.0).unwrap();
        assert_eq!(unit.position().unwrap(), 10.0);
        assert_eq!(unit.velocity().unwrap(), -2.0);

        unit.invert_encoder();
        assert_eq!(unit.position().unwrap(), -10.0);

        // 反转状态下重新设置系数，符号保持一致
        unit.set_conversion_factor(3.0).unwrap();
        assert_eq!(unit.position().unwrap(), -15.0);

        unit.invert_encoder();
        assert_eq!(unit.position().unwrap(), 15.0);
    }

    #[test]
    fn test_read_fault_drives_neutral_and_keeps_state() {
        let (mut unit, handle) = mock_unit();
        handle.set_position(0.0);
        unit.set_gains(Slot::Position, PidGains::new(0.01, 1.0, 0.0, 0.0, 1000.0))
            .unwrap();
        unit.set(ControlMode::Position, 5.0).unwrap();
        tick_n(&mut unit, 3, &input(1.0));
        let integral = unit.integral();
        let error = unit.error();

        handle.fail_next_reads(1);
        assert!(unit.update(&input(1.0)).is_err());
        assert_eq!(unit.consecutive_faults(), 1);
        assert_eq!(unit.last_output(), 0.0);
        assert_eq!(handle.last_output(), Some(0.0));
        assert_eq!(unit.integral(), integral);
        assert_eq!(unit.error(), error);

        unit.update(&input(1.0)).unwrap();
        assert_eq!(unit.consecutive_faults(), 0);
        assert!(unit.integral() > integral);
    }

    #[test]
    fn test_write_fault_rolls_back_pid_state() {
        let (mut unit, handle) = mock_unit();
        handle.set_position(0.0);
        unit.set_gains(Slot::Position, PidGains::new(0.01, 1.0, 0.0, 0.0, 1000.0))
            .unwrap();
        unit.set(ControlMode::Position, 5.0).unwrap();
        tick_n(&mut unit, 3, &input(1.0));
        let integral = unit.integral();
        let error = unit.error();

        handle.fail_next_writes(1);
        assert!(unit.update(&input(1.0)).is_err());
        assert_eq!(unit.consecutive_faults(), 1);
        assert_eq!(handle.last_output(), Some(0.0));
        assert_eq!(unit.integral(), integral);
        assert_eq!(unit.error(), error);

        // 恢复后的第一步与没有故障时相同
        unit.update(&input(1.0)).unwrap();
        assert_eq!(unit.consecutive_faults(), 0);
        assert!((unit.integral() - (integral + 5.0 * 2.0)).abs() < 1e-9);
    }

    #[test]
    fn test_hold_last_output_policy() {
        let (mut unit, handle) = mock_unit();
        unit.set_percent(0.7).unwrap();
        unit.update(&input(1.0)).unwrap();

        let hold = TickInput {
            fault_policy: FaultPolicy::HoldLastOutput,
            ..input(1.0)
        };
        handle.fail_next_writes(1);
        unit.set_percent(0.2).unwrap();
        assert!(unit.update(&hold).is_err());
        assert_eq!(unit.last_output(), 0.7);
        assert_eq!(handle.last_output(), Some(0.7));
    }

    #[test]
    fn test_non_finite_measurement_is_a_fault() {
        let (mut unit, handle) = mock_unit();
        unit.set_gains(Slot::Position, PidGains::new(1.0, 1.0, 0.0, 0.0, 1000.0))
            .unwrap();
        unit.set(ControlMode::Position, 1.0).unwrap();
        handle.set_position(f64::NAN);
        assert!(matches!(
            unit.update(&input(1.0)),
            Err(UnitFault::NonFiniteOutput(_))
        ));
        assert_eq!(handle.last_output(), Some(0.0));
        assert_eq!(unit.integral(), 0.0);
    }

    #[test]
    fn test_reset_encoder_unsupported() {
        let (backend, _) = MockBackend::with_capabilities("bare", Capabilities::basic());
        let mut unit = MotorUnit::new(UnitId(0), "bare".to_string(), Box::new(backend));
        assert!(matches!(
            unit.reset_encoder(),
            Err(ControlError::Backend(BackendError::Unsupported(_)))
        ));

        let (mut unit, handle) = mock_unit();
        handle.set_position(42.0);
        unit.reset_encoder().unwrap();
        assert_eq!(unit.position().unwrap(), 0.0);
    }

    #[test]
    fn test_feedback_sampling_publishes_telemetry() {
        let (mut unit, handle) = mock_unit();
        handle.set_position(1.0);
        handle.set_velocity(2.0);
        handle.set_current(3.0);
        unit.set_conversion_factor(10.0).unwrap();
        let sampled = TickInput {
            sample_feedback: true,
            ..input(1.0)
        };
        unit.update(&sampled).unwrap();

        let telemetry = unit.shared().snapshot();
        assert_eq!(telemetry.tick, 1);
        assert_eq!(telemetry.position, Some(10.0));
        assert_eq!(telemetry.velocity, Some(20.0));
        assert_eq!(telemetry.current, Some(3.0));
    }
}
