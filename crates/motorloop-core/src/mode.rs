//! 控制模式定义

use crate::gains::Slot;

/// 控制单元工作模式
///
/// 模式之间没有转换限制，任意模式可以在任意时刻切换；
/// 唯一的转换副作用是清零两个积分项和两个上次误差项。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ControlMode {
    /// 开环占空比输出（默认）
    #[default]
    PercentOutput,
    /// 位置闭环
    Position,
    /// 速度闭环
    Velocity,
    /// 外部信号源闭环
    Sensor,
    /// 跟随主单元的输出
    Follow,
}

impl ControlMode {
    /// 该模式使用的 PID 槽位（开环和跟随模式没有槽位）
    pub fn slot(self) -> Option<Slot> {
        match self {
            ControlMode::Position => Some(Slot::Position),
            ControlMode::Velocity => Some(Slot::Velocity),
            ControlMode::Sensor => Some(Slot::Sensor),
            ControlMode::PercentOutput | ControlMode::Follow => None,
        }
    }
}
