//! 命令定义和实现

pub mod config;
pub mod monitor;
pub mod run;

pub use config::ConfigCommand;
pub use monitor::MonitorCommand;
pub use run::RunCommand;
