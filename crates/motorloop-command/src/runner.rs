//! 命令轮询器
//!
//! 最小的外部调度框架：在调用线程上按固定节奏轮询一个命令，
//! 直到完成、被取消或超时。

use crate::Command;
use motorloop_core::ControlError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// 命令的结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Finished,
    Cancelled,
    TimedOut,
}

/// 取消句柄（可跨线程）
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn clear(&self) {
        self.cancelled.store(false, Ordering::Release);
    }
}

/// 固定节奏的命令轮询器
#[derive(Debug, Clone)]
pub struct CommandRunner {
    poll_period: Duration,
    cancel: CancelHandle,
}

impl CommandRunner {
    /// 创建轮询器（`poll_period` 通常为 20ms）
    pub fn new(poll_period: Duration) -> Self {
        Self {
            poll_period,
            cancel: CancelHandle::default(),
        }
    }

    pub fn poll_period(&self) -> Duration {
        self.poll_period
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// 运行命令直到结束
    ///
    /// `initialize` 失败时直接返回错误，不会调用 `end`。
    pub fn run(
        &self,
        command: &mut dyn Command,
        timeout: Option<Duration>,
    ) -> Result<Completion, ControlError> {
        command.initialize()?;
        let started = Instant::now();
        let mut polls = 0u64;

        let completion = loop {
            if self.cancel.is_cancelled() {
                self.cancel.clear();
                break Completion::Cancelled;
            }

            command.execute();
            polls += 1;
            if command.is_finished() {
                break Completion::Finished;
            }

            if timeout.is_some_and(|limit| started.elapsed() >= limit) {
                break Completion::TimedOut;
            }

            spin_sleep::sleep(self.poll_period);
        };

        command.end(completion != Completion::Finished);
        match completion {
            Completion::TimedOut => warn!(
                "{} timed out after {:?} ({} polls)",
                command.name(),
                started.elapsed(),
                polls
            ),
            _ => info!(
                "{} {:?} after {:?} ({} polls)",
                command.name(),
                completion,
                started.elapsed(),
                polls
            ),
        }
        Ok(completion)
    }
}
