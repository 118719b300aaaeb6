//! 厂商能力描述

use crate::Capabilities;

/// 支持的电机控制器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Vendor {
    /// CTRE Talon SRX（外接编码器，不支持清零）
    TalonSrx,
    /// CTRE Falcon 500（集成 TalonFX）
    Falcon500,
    /// Playing With Fusion Venom
    Venom,
    /// REV NEO（SPARK MAX）
    Neo,
}

impl Vendor {
    /// 该厂商控制器提供的可选能力
    pub const fn capabilities(self) -> Capabilities {
        match self {
            Vendor::TalonSrx => Capabilities {
                current_limit: true,
                voltage_compensation: true,
                encoder_reset: false,
            },
            Vendor::Falcon500 => Capabilities::full(),
            Vendor::Venom => Capabilities::basic(),
            Vendor::Neo => Capabilities {
                current_limit: true,
                voltage_compensation: true,
                encoder_reset: false,
            },
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            Vendor::TalonSrx => "TalonSRX",
            Vendor::Falcon500 => "Falcon500",
            Vendor::Venom => "Venom",
            Vendor::Neo => "NEO",
        }
    }
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}
