//! # Motorloop CLI
//!
//! 基于仿真后端的控制循环命令行工具。
//!
//! ```bash
//! # 打印示例配置
//! motorloop-cli config example > robot.toml
//!
//! # 检查配置（执行顺序、能力、跟随关系）
//! motorloop-cli --config robot.toml config check
//!
//! # 把 arm 驱动到位置 90，误差小于 0.5 后退出
//! motorloop-cli --config robot.toml run --unit arm --mode position --target 90 --tolerance 0.5
//!
//! # 以 50% 输出驱动 shooter 并监控 5 秒
//! motorloop-cli monitor --drive shooter=0.5 --duration 5
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod robot;

use commands::{ConfigCommand, MonitorCommand, RunCommand};

/// Motorloop CLI - 电机控制循环命令行工具
#[derive(Parser, Debug)]
#[command(name = "motorloop-cli")]
#[command(about = "Fixed-period motor control loop on simulated motor controllers", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认使用内置演示配置）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 把单元驱动到目标值
    Run {
        #[command(flatten)]
        args: RunCommand,
    },

    /// 监控单元遥测
    Monitor {
        #[command(flatten)]
        args: MonitorCommand,
    },
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("motorloop=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = robot::load_config(cli.config.as_deref())?;
    tracing::debug!("Loaded config with {} units", config.units.len());

    match cli.command {
        Commands::Config(cmd) => cmd.execute(&config),
        Commands::Run { args } => args.execute(&config),
        Commands::Monitor { args } => args.execute(&config),
    }
}
