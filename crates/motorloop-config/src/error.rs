//! 配置错误类型

use motorloop_backend::BackendError;
use motorloop_core::ControlError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件读写失败
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// TOML 解析失败
    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML 序列化失败
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// 配置值不合法（增益、周期、目标值等）
    #[error("Invalid config: {0}")]
    Control(#[from] ControlError),

    /// 创建后端失败
    #[error("Failed to create backend for unit '{unit}': {source}")]
    Backend {
        unit: String,
        #[source]
        source: BackendError,
    },

    /// `follow` 引用了不存在的单元
    #[error("Unit '{unit}' follows unknown unit '{master}'")]
    UnknownMaster { unit: String, master: String },

    /// 单元名称重复
    #[error("Duplicate unit name '{0}'")]
    DuplicateName(String),
}
