//! PID 增益表
//!
//! 每个单元持有 4 组相互独立的增益，按槽位索引：
//!
//! | 槽位 | 索引 | 使用者 |
//! |------|------|--------|
//! | Position | 0 | `ControlMode::Position` |
//! | Velocity | 1 | `ControlMode::Velocity` |
//! | Sensor | 2 | `ControlMode::Sensor` |
//! | Auxiliary | 3 | 辅助通道 |

use crate::error::ControlError;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::ops::{Index, IndexMut};

/// PID 槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Slot {
    Position = 0,
    Velocity = 1,
    Sensor = 2,
    Auxiliary = 3,
}

impl Slot {
    /// 从原始索引转换（配置文件、外部调用）
    pub fn from_index(index: u8) -> Result<Self, ControlError> {
        Slot::try_from(index).map_err(|_| ControlError::InvalidSlot(index))
    }

    pub fn index(self) -> usize {
        u8::from(self) as usize
    }
}

/// 单组 PID 增益
///
/// - `kf`: 前馈系数，乘以目标值（不是误差）
/// - `izone`: 积分冻结阈值，`|integral| >= izone` 后积分不再累积
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub kf: f64,
    pub izone: f64,
}

impl PidGains {
    pub const fn new(kp: f64, ki: f64, kd: f64, kf: f64, izone: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            kf,
            izone,
        }
    }

    /// 只有 P/I/D 的增益（前馈与积分阈值为 0）
    pub const fn pid(kp: f64, ki: f64, kd: f64) -> Self {
        Self::new(kp, ki, kd, 0.0, 0.0)
    }

    pub fn validate(&self) -> Result<(), ControlError> {
        let fields = [
            ("kp", self.kp),
            ("ki", self.ki),
            ("kd", self.kd),
            ("kf", self.kf),
            ("izone", self.izone),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(ControlError::InvalidGains(format!(
                    "{name} must be finite, got {value}"
                )));
            }
        }
        if self.izone < 0.0 {
            return Err(ControlError::InvalidGains(format!(
                "izone must be >= 0, got {}",
                self.izone
            )));
        }
        Ok(())
    }
}

/// 4 槽位增益表
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GainTable {
    slots: [PidGains; 4],
}

impl GainTable {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Index<Slot> for GainTable {
    type Output = PidGains;

    fn index(&self, slot: Slot) -> &PidGains {
        &self.slots[slot.index()]
    }
}

impl IndexMut<Slot> for GainTable {
    fn index_mut(&mut self, slot: Slot) -> &mut PidGains {
        &mut self.slots[slot.index()]
    }
}
