//! # Motorloop Command Adapter
//!
//! 把控制单元包装成可轮询、可取消的命令，供外部调度框架使用。
//!
//! 命令框架按自己的节奏（通常远慢于 2ms 控制周期）轮询 [`Command::is_finished`]，
//! 控制循环本身不知道命令的存在。取消命令只是停止轮询，不会修改单元的目标值。
//!
//! # 示例
//!
//! ```rust,no_run
//! use motorloop_command::{CommandRunner, RunToTarget};
//! use motorloop_core::{ControlLoop, ControlMode, Scheduler, SchedulerConfig, SimBackend, SimPlant, Vendor};
//! use std::time::Duration;
//!
//! let mut scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
//! let arm = scheduler.add_unit(SimBackend::new(Vendor::Falcon500, 1, SimPlant::default()));
//! let control = ControlLoop::spawn(scheduler).unwrap();
//!
//! let mut command = RunToTarget::new(control.controller(arm).unwrap(), ControlMode::Position, 500.0, 2.0);
//! let runner = CommandRunner::new(Duration::from_millis(20));
//! let completion = runner.run(&mut command, Some(Duration::from_secs(5))).unwrap();
//! println!("{completion:?}");
//! ```

mod run_to_target;
mod runner;

pub use run_to_target::RunToTarget;
pub use runner::{CancelHandle, CommandRunner, Completion};

use motorloop_core::ControlError;

/// 外部调度框架的命令接口
///
/// 生命周期：`initialize` 一次，然后每次轮询调用 `execute` 和 `is_finished`，
/// 结束（完成、取消或超时）时调用一次 `end`。
pub trait Command: Send {
    fn name(&self) -> &str {
        "command"
    }

    fn initialize(&mut self) -> Result<(), ControlError>;

    fn execute(&mut self) {}

    fn is_finished(&mut self) -> bool;

    fn end(&mut self, _interrupted: bool) {}
}
