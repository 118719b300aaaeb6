//! 后台控制线程
//!
//! [`ControlLoop`] 把 [`Scheduler`] 移到专用线程上以固定周期运行，
//! 应用线程通过 [`UnitController`] 与单元交互。
//!
//! 启用 `realtime` feature 时，控制线程会尝试提升到最高优先级。

use crate::clock::{Clock, SpinClock};
use crate::controller::UnitController;
use crate::error::ControlError;
use crate::metrics::LoopMetrics;
use crate::scheduler::{Scheduler, UnitId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::error;

/// 正在运行的控制循环
///
/// Drop 时停止循环并等待线程退出。
pub struct ControlLoop {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<Scheduler>>,
    controllers: Vec<UnitController>,
    metrics: Arc<LoopMetrics>,
}

impl ControlLoop {
    /// 使用高精度时钟启动控制循环
    pub fn spawn(scheduler: Scheduler) -> Result<Self, ControlError> {
        Self::spawn_with_clock(scheduler, SpinClock::new())
    }

    pub fn spawn_with_clock(
        mut scheduler: Scheduler,
        mut clock: impl Clock + 'static,
    ) -> Result<Self, ControlError> {
        let controllers = (0..scheduler.len())
            .filter_map(|index| scheduler.controller(UnitId(index)))
            .collect();
        let metrics = scheduler.metrics();
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);

        let thread = thread::Builder::new()
            .name("motorloop".to_string())
            .spawn(move || {
                // 设置线程优先级（可选 feature）
                #[cfg(feature = "realtime")]
                {
                    use thread_priority::*;
                    use tracing::{info, warn};

                    match set_current_thread_priority(ThreadPriority::Max) {
                        Ok(_) => {
                            info!("Control thread priority set to MAX (realtime)");
                        },
                        Err(e) => {
                            warn!(
                                "Failed to set control thread priority: {:?}. \
                                On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                                e
                            );
                        },
                    }
                }

                scheduler.run(&mut clock, &thread_running, None);
                scheduler
            })
            .map_err(|e| ControlError::Thread(e.to_string()))?;

        Ok(Self {
            running,
            thread: Some(thread),
            controllers,
            metrics,
        })
    }

    pub fn controller(&self, id: UnitId) -> Option<UnitController> {
        self.controllers.get(id.index()).cloned()
    }

    pub fn controllers(&self) -> &[UnitController] {
        &self.controllers
    }

    pub fn metrics(&self) -> Arc<LoopMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
            && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// 停止循环并取回调度器
    pub fn stop(mut self) -> Result<Scheduler, ControlError> {
        self.running.store(false, Ordering::Release);
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| ControlError::LoopPanicked),
            None => Err(ControlError::LoopStopped),
        }
    }
}

impl Drop for ControlLoop {
    fn drop(&mut self) {
        // 通知控制线程退出
        self.running.store(false, Ordering::Release);

        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            error!("Control thread panicked");
        }
    }
}

impl std::fmt::Debug for ControlLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlLoop")
            .field("running", &self.is_running())
            .field("units", &self.controllers.len())
            .finish()
    }
}
