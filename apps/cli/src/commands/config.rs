//! 配置管理命令

use crate::robot::{DEMO_CONFIG, build_simulated};
use anyhow::Result;
use clap::Subcommand;
use motorloop_config::RobotConfig;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 打印演示配置
    Example,

    /// 检查配置并显示单元列表
    Check,
}

impl ConfigCommand {
    pub fn execute(&self, config: &RobotConfig) -> Result<()> {
        match self {
            ConfigCommand::Example => {
                print!("{}", DEMO_CONFIG);
                Ok(())
            },
            ConfigCommand::Check => Self::check(config),
        }
    }

    fn check(config: &RobotConfig) -> Result<()> {
        let (robot, _factory) = build_simulated(config)?;
        let scheduler_config = robot.scheduler.config();

        println!(
            "✅ 配置有效：{} 个单元，周期 {:?}，输出限制 ±{}",
            robot.scheduler.len(),
            scheduler_config.period,
            scheduler_config.output_limit
        );
        println!("更新顺序：");
        for id in robot.scheduler.order() {
            let Some(unit) = robot.scheduler.unit(*id) else {
                continue;
            };
            let caps = unit.capabilities();
            let master = unit
                .master()
                .and_then(|m| robot.scheduler.unit(m))
                .map(|m| format!(" -> follows {}", m.name()))
                .unwrap_or_default();
            println!(
                "  {:<20} current_limit={} voltage_comp={} encoder_reset={}{}",
                unit.name(),
                caps.current_limit,
                caps.voltage_compensation,
                caps.encoder_reset,
                master
            );
        }
        Ok(())
    }
}
