//! 配置文件结构
//!
//! ```toml
//! [loop]
//! period_ms = 2
//! output_limit = 1.0
//! fault_policy = "neutral"      # 或 "hold_last_output"
//!
//! [[unit]]
//! name = "shooter"
//! vendor = "falcon500"          # talon_srx | falcon500 | venom | neo
//! port = 41
//!
//! [unit.gains.velocity]
//! kp = 0.0001
//! kf = 0.000065
//!
//! [[unit]]
//! name = "shooter_follower"
//! vendor = "falcon500"
//! port = 42
//! follow = "shooter"
//! ```

use crate::error::ConfigError;
use motorloop_backend::{BrakeMode, Vendor};
use motorloop_core::{ControlError, FaultPolicy, PidGains, SchedulerConfig, Slot};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// 整机配置
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RobotConfig {
    #[serde(rename = "loop", default)]
    pub control_loop: LoopConfig,

    #[serde(rename = "unit", default)]
    pub units: Vec<UnitConfig>,
}

impl RobotConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// 从文件加载配置
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// 保存配置到文件
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = self.to_toml_string()?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn unit(&self, name: &str) -> Option<&UnitConfig> {
        self.units.iter().find(|u| u.name == name)
    }
}

/// 故障策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultPolicySetting {
    #[default]
    Neutral,
    HoldLastOutput,
}

impl From<FaultPolicySetting> for FaultPolicy {
    fn from(setting: FaultPolicySetting) -> Self {
        match setting {
            FaultPolicySetting::Neutral => FaultPolicy::Neutral,
            FaultPolicySetting::HoldLastOutput => FaultPolicy::HoldLastOutput,
        }
    }
}

/// `[loop]` 段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoopConfig {
    /// 控制周期（毫秒）
    pub period_ms: f64,
    pub output_limit: f64,
    pub fault_policy: FaultPolicySetting,
    pub command_queue_capacity: usize,
    pub sample_feedback: bool,
    pub overrun_warn_interval_ms: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        let defaults = SchedulerConfig::default();
        Self {
            period_ms: defaults.period_ms(),
            output_limit: defaults.output_limit,
            fault_policy: FaultPolicySetting::default(),
            command_queue_capacity: defaults.command_queue_capacity,
            sample_feedback: defaults.sample_feedback,
            overrun_warn_interval_ms: defaults.overrun_warn_interval.as_millis() as u64,
        }
    }
}

impl LoopConfig {
    pub fn to_scheduler_config(&self) -> Result<SchedulerConfig, ConfigError> {
        let period = Duration::try_from_secs_f64(self.period_ms / 1000.0).map_err(|_| {
            ControlError::InvalidConfig(format!(
                "period_ms must be finite and >= 0, got {}",
                self.period_ms
            ))
        })?;

        let config = SchedulerConfig {
            period,
            output_limit: self.output_limit,
            fault_policy: self.fault_policy.into(),
            command_queue_capacity: self.command_queue_capacity,
            sample_feedback: self.sample_feedback,
            overrun_warn_interval: Duration::from_millis(self.overrun_warn_interval_ms),
        };
        config.validate()?;
        Ok(config)
    }
}

/// `[[unit]]` 段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnitConfig {
    pub name: String,
    pub vendor: Vendor,
    pub port: u16,

    #[serde(default = "default_conversion_factor")]
    pub conversion_factor: f64,
    #[serde(default)]
    pub invert_motor: bool,
    #[serde(default)]
    pub invert_encoder: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brake_mode: Option<BrakeMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voltage_compensation: Option<f64>,

    /// 主单元名称
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow: Option<String>,

    #[serde(default)]
    pub gains: GainsConfig,
}

fn default_conversion_factor() -> f64 {
    1.0
}

impl UnitConfig {
    pub fn new(name: impl Into<String>, vendor: Vendor, port: u16) -> Self {
        Self {
            name: name.into(),
            vendor,
            port,
            conversion_factor: default_conversion_factor(),
            invert_motor: false,
            invert_encoder: false,
            brake_mode: None,
            current_limit: None,
            voltage_compensation: None,
            follow: None,
            gains: GainsConfig::default(),
        }
    }
}

/// 每个槽位的增益（未配置的槽位保持全 0）
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GainsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<GainConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<GainConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor: Option<GainConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auxiliary: Option<GainConfig>,
}

impl GainsConfig {
    /// 已配置的槽位
    pub fn slots(&self) -> impl Iterator<Item = (Slot, PidGains)> + '_ {
        [
            (Slot::Position, &self.position),
            (Slot::Velocity, &self.velocity),
            (Slot::Sensor, &self.sensor),
            (Slot::Auxiliary, &self.auxiliary),
        ]
        .into_iter()
        .filter_map(|(slot, gains)| gains.as_ref().map(|g| (slot, PidGains::from(*g))))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GainConfig {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub kf: f64,
    pub izone: f64,
}

impl From<GainConfig> for PidGains {
    fn from(g: GainConfig) -> Self {
        PidGains::new(g.kp, g.ki, g.kd, g.kf, g.izone)
    }
}
