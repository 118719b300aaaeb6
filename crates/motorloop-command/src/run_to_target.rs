//! 运行到目标值
//!
//! 启动时调用一次 `set`，之后每次轮询检查平滑误差是否进入容差。
//!
//! 新目标值要等到控制循环的下一个周期才生效，而误差历史中还残留旧目标的误差，
//! 所以只有当遥测显示新目标已经生效并且误差历史完全由新误差组成后，
//! 才开始判断是否完成。

use crate::Command;
use motorloop_core::{ControlError, ControlMode, ERROR_HISTORY_LEN, UnitController};
use tracing::debug;

/// 驱动单元到目标值，误差进入容差后完成
#[derive(Debug)]
pub struct RunToTarget {
    controller: UnitController,
    mode: ControlMode,
    target: f64,
    auxiliary_target: Option<f64>,
    tolerance: f64,
    /// 遥测首次显示新目标时的单元周期号
    applied_at: Option<u64>,
}

impl RunToTarget {
    pub fn new(controller: UnitController, mode: ControlMode, target: f64, tolerance: f64) -> Self {
        Self {
            controller,
            mode,
            target,
            auxiliary_target: None,
            tolerance,
            applied_at: None,
        }
    }

    /// 同时设置辅助通道目标值（完成条件只看主通道误差）
    pub fn with_auxiliary(
        controller: UnitController,
        mode: ControlMode,
        target: f64,
        auxiliary_target: f64,
        tolerance: f64,
    ) -> Self {
        Self {
            auxiliary_target: Some(auxiliary_target),
            ..Self::new(controller, mode, target, tolerance)
        }
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    fn setpoint_in_effect(&self) -> Option<u64> {
        let telemetry = self.controller.telemetry();
        let applied = telemetry.mode == self.mode
            && telemetry.setpoint == self.target
            && telemetry.auxiliary_enabled == self.auxiliary_target.is_some()
            && self
                .auxiliary_target
                .is_none_or(|aux| telemetry.auxiliary_setpoint == aux);
        applied.then_some(telemetry.tick)
    }
}

impl Command for RunToTarget {
    fn name(&self) -> &str {
        "run_to_target"
    }

    fn initialize(&mut self) -> Result<(), ControlError> {
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(ControlError::InvalidConfig(format!(
                "tolerance must be finite and > 0, got {}",
                self.tolerance
            )));
        }

        self.applied_at = None;
        match self.auxiliary_target {
            Some(aux) => self
                .controller
                .set_with_auxiliary(self.mode, self.target, aux)?,
            None => self.controller.set(self.mode, self.target)?,
        }
        debug!(
            "{}: running to {} ({:?}, tolerance {})",
            self.controller.name(),
            self.target,
            self.mode,
            self.tolerance
        );
        Ok(())
    }

    fn is_finished(&mut self) -> bool {
        let Some(tick) = self.setpoint_in_effect() else {
            return false;
        };
        let applied_at = *self.applied_at.get_or_insert(tick);
        if tick + 1 < applied_at + ERROR_HISTORY_LEN as u64 {
            return false;
        }
        self.controller.error().abs() < self.tolerance
    }

    fn end(&mut self, interrupted: bool) {
        debug!(
            "{}: run_to_target {} (error {:.4})",
            self.controller.name(),
            if interrupted { "interrupted" } else { "finished" },
            self.controller.error()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motorloop_core::{MockBackend, PidGains, Scheduler, SchedulerConfig, Slot};

    fn setup() -> (Scheduler, UnitController, motorloop_core::MockHandle) {
        let mut scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
        let (backend, handle) = MockBackend::new("m");
        let id = scheduler.add_unit(backend);
        scheduler
            .unit_mut(id)
            .unwrap()
            .set_gains(Slot::Position, PidGains::pid(0.01, 0.0, 0.0))
            .unwrap();
        let controller = scheduler.controller(id).unwrap();
        (scheduler, controller, handle)
    }

    #[test]
    fn test_not_finished_before_setpoint_applies() {
        let (mut scheduler, controller, handle) = setup();
        handle.set_position(10.0);
        let mut command = RunToTarget::new(controller, ControlMode::Position, 10.0, 0.5);
        command.initialize().unwrap();

        // 还未经过任何周期，旧遥测的误差为 0 也不算完成
        assert!(!command.is_finished());

        scheduler.tick();
        assert!(!command.is_finished());
        scheduler.tick();
        assert!(!command.is_finished());
        scheduler.tick();
        assert!(command.is_finished());
    }

    #[test]
    fn test_finishes_when_error_within_tolerance() {
        let (mut scheduler, controller, handle) = setup();
        handle.set_position(0.0);
        let mut command = RunToTarget::new(controller, ControlMode::Position, 10.0, 0.5);
        command.initialize().unwrap();

        for _ in 0..5 {
            scheduler.tick();
            assert!(!command.is_finished());
        }

        handle.set_position(9.8);
        for _ in 0..3 {
            scheduler.tick();
        }
        assert!(command.is_finished());
    }

    #[test]
    fn test_invalid_tolerance_rejected() {
        let (_scheduler, controller, _) = setup();
        let mut command = RunToTarget::new(controller, ControlMode::Position, 1.0, 0.0);
        assert!(matches!(
            command.initialize(),
            Err(ControlError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_auxiliary_requires_source() {
        let (_scheduler, controller, _) = setup();
        let mut command =
            RunToTarget::with_auxiliary(controller, ControlMode::Position, 1.0, 2.0, 0.1);
        assert_eq!(
            command.initialize(),
            Err(ControlError::MissingAuxiliarySource)
        );
    }

    #[test]
    fn test_auxiliary_variant_sets_both_targets() {
        let (mut scheduler, controller, handle) = setup();
        handle.set_position(1.0);
        controller.set_auxiliary_source(|| 0.0).unwrap();
        let mut command =
            RunToTarget::with_auxiliary(controller.clone(), ControlMode::Position, 1.0, 2.0, 0.1);
        command.initialize().unwrap();
        for _ in 0..3 {
            scheduler.tick();
        }

        let telemetry = controller.telemetry();
        assert!(telemetry.auxiliary_enabled);
        assert_eq!(telemetry.auxiliary_setpoint, 2.0);
        assert!(command.is_finished());
    }
}
