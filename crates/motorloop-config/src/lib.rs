//! # Motorloop Config
//!
//! 机器人静态配置：单元名称、厂商、端口、增益表、反转、限制与跟随关系。
//!
//! 配置在启动时一次性加载并构建 [`Scheduler`](motorloop_core::Scheduler)，
//! 运行期间不再读取。

mod builder;
mod error;
mod schema;

pub use builder::BuiltRobot;
pub use error::ConfigError;
pub use schema::{
    FaultPolicySetting, GainConfig, GainsConfig, LoopConfig, RobotConfig, UnitConfig,
};
