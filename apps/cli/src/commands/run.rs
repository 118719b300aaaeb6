//! 运行到目标值命令
//!
//! 启动后台控制循环，把指定单元驱动到目标值，误差进入容差后退出。
//! Ctrl-C 取消命令（目标值保持不变，随后控制循环停止）。

use crate::robot::build_simulated;
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use motorloop_command::{CommandRunner, Completion, RunToTarget};
use motorloop_config::RobotConfig;
use motorloop_core::{ControlLoop, ControlMode};
use std::time::Duration;

/// 命令行可选的控制模式（Sensor 模式需要外部信号源，命令行不支持）
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Percent,
    Position,
    Velocity,
}

impl From<ModeArg> for ControlMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Percent => ControlMode::PercentOutput,
            ModeArg::Position => ControlMode::Position,
            ModeArg::Velocity => ControlMode::Velocity,
        }
    }
}

/// 运行命令参数
#[derive(Args, Debug)]
pub struct RunCommand {
    /// 单元名称
    #[arg(short, long)]
    pub unit: String,

    /// 控制模式
    #[arg(short, long, value_enum, default_value_t = ModeArg::Position)]
    pub mode: ModeArg,

    /// 目标值（用户单位）
    #[arg(short, long, allow_hyphen_values = true)]
    pub target: f64,

    /// 完成容差
    #[arg(long, default_value_t = 1.0)]
    pub tolerance: f64,

    /// 轮询周期（毫秒）
    #[arg(long, default_value_t = 20)]
    pub poll_ms: u64,

    /// 超时（秒）
    #[arg(long, default_value_t = 10.0)]
    pub timeout: f64,
}

impl RunCommand {
    pub fn execute(&self, config: &RobotConfig) -> Result<()> {
        let timeout = Duration::try_from_secs_f64(self.timeout)
            .with_context(|| format!("Invalid timeout: {}", self.timeout))?;

        let (robot, _factory) = build_simulated(config)?;
        let id = robot
            .id(&self.unit)
            .with_context(|| format!("Unknown unit '{}'", self.unit))?;

        let control = ControlLoop::spawn(robot.scheduler)?;
        let controller = control
            .controller(id)
            .with_context(|| format!("No controller for unit '{}'", self.unit))?;

        let runner = CommandRunner::new(Duration::from_millis(self.poll_ms));
        let cancel = runner.cancel_handle();
        ctrlc::set_handler(move || {
            eprintln!("\nReceived interrupt signal. Cancelling...");
            cancel.cancel();
        })?;

        println!(
            "▶️  {} -> {} ({:?}, tolerance {})",
            self.unit, self.target, self.mode, self.tolerance
        );
        let mut command = RunToTarget::new(
            controller.clone(),
            self.mode.into(),
            self.target,
            self.tolerance,
        );
        let completion = runner.run(&mut command, Some(timeout))?;

        let telemetry = controller.telemetry();
        let metrics = control.metrics().snapshot();
        match completion {
            Completion::Finished => println!("✅ 到达目标"),
            Completion::Cancelled => println!("⏹  已取消"),
            Completion::TimedOut => println!("⚠️  超时"),
        }
        println!(
            "   error={:.4} output={:.4} position={:?} velocity={:?}",
            telemetry.error, telemetry.output, telemetry.position, telemetry.velocity
        );
        println!(
            "   ticks={} overruns={} ({:.2}%) max_tick={}us",
            metrics.ticks,
            metrics.overruns,
            metrics.overrun_rate(),
            metrics.max_tick_us
        );

        control.stop()?;
        if completion == Completion::TimedOut {
            anyhow::bail!("'{}' did not reach {} within {:?}", self.unit, self.target, timeout);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_conversion() {
        assert_eq!(ControlMode::from(ModeArg::Percent), ControlMode::PercentOutput);
        assert_eq!(ControlMode::from(ModeArg::Position), ControlMode::Position);
        assert_eq!(ControlMode::from(ModeArg::Velocity), ControlMode::Velocity);
    }

    #[test]
    fn test_unknown_unit_fails() {
        let config = RobotConfig::from_toml_str(crate::robot::DEMO_CONFIG).unwrap();
        let cmd = RunCommand {
            unit: "elevator".to_string(),
            mode: ModeArg::Position,
            target: 1.0,
            tolerance: 0.1,
            poll_ms: 20,
            timeout: 1.0,
        };
        let err = cmd.execute(&config).unwrap_err();
        assert!(err.to_string().contains("elevator"));
    }
}
