//! 控制层错误类型定义

use motorloop_backend::BackendError;
use thiserror::Error;

/// 控制层错误类型
///
/// 配置类错误（槽位、增益、信号源、跟随关系）在调用点立即返回；
/// 运行期的后端 IO 错误在控制循环内按单元恢复，不会通过此类型上抛到循环之外。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControlError {
    /// 无效的 PID 槽位索引（合法范围 0-3）
    #[error("Invalid PID slot index: {0} (expected 0-3)")]
    InvalidSlot(u8),

    /// 无效的增益参数
    #[error("Invalid gains: {0}")]
    InvalidGains(String),

    /// 无效的目标值（NaN / 无穷大）
    #[error("Invalid setpoint: {0}")]
    InvalidSetpoint(f64),

    /// 使用 Sensor 模式前未设置传感器信号源
    #[error("Sensor mode requires a sensor source (call set_sensor_source first)")]
    MissingSensorSource,

    /// 使用辅助通道前未设置辅助信号源
    #[error("Auxiliary channel requires an auxiliary source (call set_auxiliary_source first)")]
    MissingAuxiliarySource,

    /// Follow 模式只能通过 `follow()` 进入
    #[error("Follow mode requires a master, use follow() instead of set()")]
    FollowRequiresMaster,

    /// 单元不能跟随自己
    #[error("Unit {0} cannot follow itself")]
    SelfFollow(usize),

    /// 跟随关系形成环
    #[error("Following unit {master} from unit {follower} would create a cycle")]
    FollowCycle { follower: usize, master: usize },

    /// 单元 ID 不存在
    #[error("Unknown unit id: {0}")]
    UnknownUnit(usize),

    /// 后端错误
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// 命令队列已满
    #[error("Command queue full")]
    QueueFull,

    /// 控制循环已停止（命令通道断开）
    #[error("Control loop stopped")]
    LoopStopped,

    /// 控制循环线程 panic
    #[error("Control loop thread panicked")]
    LoopPanicked,

    /// 线程创建失败
    #[error("Failed to spawn control loop thread: {0}")]
    Thread(String),

    /// 调度器配置错误
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}
