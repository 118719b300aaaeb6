//! 监控命令
//!
//! 启动控制循环，可选地以百分比输出驱动若干单元，并周期性打印每个单元的遥测。

use crate::robot::build_simulated;
use anyhow::{Context, Result};
use clap::Args;
use motorloop_config::RobotConfig;
use motorloop_core::ControlLoop;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// 监控命令参数
#[derive(Args, Debug)]
pub struct MonitorCommand {
    /// 打印频率（Hz）
    #[arg(short, long, default_value_t = 10.0)]
    pub frequency: f64,

    /// 运行时长（秒），不指定则直到 Ctrl-C
    #[arg(short, long)]
    pub duration: Option<f64>,

    /// 以百分比输出驱动单元，格式 `name=percent`，可重复
    #[arg(long = "drive", value_parser = parse_drive, allow_hyphen_values = true)]
    pub drives: Vec<(String, f64)>,
}

/// 解析 `name=percent`
fn parse_drive(s: &str) -> Result<(String, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=percent, got '{}'", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing unit name in '{}'", s));
    }
    let percent: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid percent '{}'", value))?;
    if !(-1.0..=1.0).contains(&percent) {
        return Err(format!("percent must be within [-1, 1], got {}", percent));
    }
    Ok((name.to_string(), percent))
}

impl MonitorCommand {
    pub fn execute(&self, config: &RobotConfig) -> Result<()> {
        if !self.frequency.is_finite() || self.frequency <= 0.0 {
            anyhow::bail!("Frequency must be positive, got {}", self.frequency);
        }
        let interval = Duration::try_from_secs_f64(1.0 / self.frequency)
            .with_context(|| format!("Frequency too low: {}", self.frequency))?;
        let duration = self
            .duration
            .map(Duration::try_from_secs_f64)
            .transpose()
            .context("Invalid duration")?;

        let (robot, _factory) = build_simulated(config)?;
        let mut drives = Vec::with_capacity(self.drives.len());
        for (name, percent) in &self.drives {
            let id = robot
                .id(name)
                .with_context(|| format!("Unknown unit '{}'", name))?;
            drives.push((id, *percent));
        }

        let control = ControlLoop::spawn(robot.scheduler)?;
        for (id, percent) in drives {
            if let Some(controller) = control.controller(id) {
                controller.set_percent(percent)?;
            }
        }

        let running = Arc::new(AtomicBool::new(true));
        let r = running.clone();
        ctrlc::set_handler(move || {
            eprintln!("\nReceived interrupt signal. Stopping...");
            r.store(false, Ordering::SeqCst);
        })?;

        println!("📊 Monitoring {} units at {} Hz", control.controllers().len(), self.frequency);
        let start = Instant::now();
        while running.load(Ordering::SeqCst) {
            if duration.is_some_and(|d| start.elapsed() >= d) {
                break;
            }
            self.print_frame(&control);
            sleep_interruptible(interval, &running);
        }

        let metrics = control.metrics().snapshot();
        println!(
            "ticks={} overruns={} faults={} commands={}/{} max_tick={}us",
            metrics.ticks,
            metrics.overruns,
            metrics.unit_faults,
            metrics.commands_applied,
            metrics.commands_rejected,
            metrics.max_tick_us
        );
        control.stop()?;
        Ok(())
    }

    fn print_frame(&self, control: &ControlLoop) {
        for controller in control.controllers() {
            let t = controller.telemetry();
            println!(
                "[{:>6}] {:<18} {:<14} sp={:>10.3} err={:>10.3} out={:>7.3} pos={} vel={} faults={}",
                t.tick,
                controller.name(),
                format!("{:?}", t.mode),
                t.setpoint,
                t.error,
                t.output,
                format_reading(t.position),
                format_reading(t.velocity),
                t.consecutive_faults
            );
        }
        println!();
    }
}

fn format_reading(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.3}", v))
}

/// 分段睡眠，使 Ctrl-C 能及时生效
fn sleep_interruptible(interval: Duration, running: &AtomicBool) {
    const STEP: Duration = Duration::from_millis(50);
    let deadline = Instant::now() + interval;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep((deadline - now).min(STEP));
    }
}
