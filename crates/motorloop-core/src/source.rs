//! 外部信号源
//!
//! Sensor 模式和辅助通道从外部信号源读取测量值（陀螺仪航向、测距仪距离等），
//! 而不是使用后端自带的编码器。信号源在控制循环线程上被调用，因此必须是 `Send`。

use motorloop_backend::BackendError;

/// 标量信号源
///
/// 任何 `FnMut() -> f64 + Send` 闭包都自动实现此 trait。
/// 可能失败的信号源可以使用 [`FallibleSource`] 包装。
pub trait SignalSource: Send {
    fn sample(&mut self) -> Result<f64, BackendError>;
}

impl<F> SignalSource for F
where
    F: FnMut() -> f64 + Send,
{
    fn sample(&mut self) -> Result<f64, BackendError> {
        Ok(self())
    }
}

/// 可能失败的信号源
///
/// 失败会被控制循环当作该单元本周期的后端故障处理。
pub struct FallibleSource<F>(pub F);

impl<F> SignalSource for FallibleSource<F>
where
    F: FnMut() -> Result<f64, BackendError> + Send,
{
    fn sample(&mut self) -> Result<f64, BackendError> {
        (self.0)()
    }
}
