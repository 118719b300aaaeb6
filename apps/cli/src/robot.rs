//! 配置加载与仿真机器人构建

use anyhow::{Context, Result};
use motorloop_backend::{SimFactory, SimPlant};
use motorloop_config::{BuiltRobot, RobotConfig};
use std::path::Path;

/// 未指定 `--config` 时使用的演示配置
pub const DEMO_CONFIG: &str = r#"# Motorloop 演示配置（仿真后端）

[loop]
period_ms = 2
output_limit = 1.0
fault_policy = "neutral"

[[unit]]
name = "shooter"
vendor = "falcon500"
port = 41
brake_mode = "coast"
current_limit = 40
voltage_compensation = 11.0

[unit.gains.velocity]
kp = 0.0001
kf = 0.000166

[[unit]]
name = "shooter_follower"
vendor = "falcon500"
port = 42
invert_motor = true
follow = "shooter"

[[unit]]
name = "arm"
vendor = "neo"
port = 7
conversion_factor = 0.01
brake_mode = "brake"

[unit.gains.position]
kp = 0.1
ki = 0.0001
izone = 5.0

[[unit]]
name = "intake"
vendor = "venom"
port = 9
"#;

pub fn load_config(path: Option<&Path>) -> Result<RobotConfig> {
    match path {
        Some(path) => RobotConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => RobotConfig::from_toml_str(DEMO_CONFIG).context("Invalid built-in demo config"),
    }
}

/// 使用仿真后端构建调度器
pub fn build_simulated(config: &RobotConfig) -> Result<(BuiltRobot, SimFactory)> {
    let factory = SimFactory::new(SimPlant::default());
    let robot = config
        .build(&factory)
        .context("Failed to build robot from config")?;
    Ok((robot, factory))
}
