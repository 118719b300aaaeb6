//! Control Loop Scheduler - 控制循环调度器
//!
//! 调度器拥有所有已注册的单元（arena + `UnitId` 索引），维护更新顺序，
//! 并以固定周期驱动它们。
//!
//! # 更新顺序
//!
//! 单元按注册顺序更新。单元开始跟随另一个单元时，它和它的所有（传递）跟随者
//! 一起被移到序列末尾，因此主单元总是在同一周期内先于跟随者更新，
//! 跟随者看到的是主单元本周期的输出。
//!
//! # 周期内的步骤
//!
//! 1. 应用周期开始前已入队的命令
//! 2. 按顺序更新每个单元
//! 3. 更新指标
//!
//! 单个单元的后端故障只影响该单元本周期，不会中断其他单元的更新。

use crate::clock::Clock;
use crate::command::{Envelope, UnitCommand};
use crate::config::SchedulerConfig;
use crate::controller::UnitController;
use crate::error::ControlError;
use crate::metrics::LoopMetrics;
use crate::unit::{MotorUnit, TickInput};
use crossbeam_channel::{Receiver, Sender, bounded};
use motorloop_backend::MotorBackend;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// 单元句柄（注册顺序索引）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub(crate) usize);

impl UnitId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 单个周期的执行结果
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// 周期序号（从 1 开始）
    pub tick: u64,
    pub commands_applied: usize,
    pub commands_rejected: usize,
    /// 本周期发生故障的单元
    pub faulted_units: SmallVec<[UnitId; 4]>,
    pub elapsed: Duration,
}

/// 控制循环调度器
///
/// # Example
///
/// ```
/// use motorloop_core::{ControlMode, MockBackend, PidGains, Scheduler, SchedulerConfig, Slot};
///
/// let mut scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
/// let (backend, handle) = MockBackend::new("drive");
/// let drive = scheduler.add_unit(backend);
///
/// let unit = scheduler.unit_mut(drive).unwrap();
/// unit.set_gains(Slot::Velocity, PidGains::pid(0.01, 0.0, 0.0)).unwrap();
/// unit.set(ControlMode::Velocity, 20.0).unwrap();
///
/// scheduler.tick();
/// assert!(handle.last_output().unwrap() > 0.0);
/// ```
pub struct Scheduler {
    config: SchedulerConfig,
    period_ms: f64,
    units: Vec<MotorUnit>,
    order: Vec<UnitId>,
    command_tx: Sender<Envelope>,
    command_rx: Receiver<Envelope>,
    metrics: Arc<LoopMetrics>,
    ticks: u64,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self, ControlError> {
        config.validate()?;
        let (command_tx, command_rx) = bounded(config.command_queue_capacity);
        Ok(Self {
            period_ms: config.period_ms(),
            config,
            units: Vec::new(),
            order: Vec::new(),
            command_tx,
            command_rx,
            metrics: Arc::new(LoopMetrics::new()),
            ticks: 0,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    // ==================== 注册 ====================

    /// 注册单元（名称取自后端描述）
    pub fn add_unit(&mut self, backend: impl MotorBackend + 'static) -> UnitId {
        let name = backend.describe();
        self.add_boxed_unit(name, Box::new(backend))
    }

    pub fn add_boxed_unit(&mut self, name: String, backend: Box<dyn MotorBackend>) -> UnitId {
        let id = UnitId(self.units.len());
        debug!("Registered unit {} '{}'", id, name);
        self.units.push(MotorUnit::new(id, name, backend));
        self.order.push(id);
        id
    }

    pub fn unit(&self, id: UnitId) -> Option<&MotorUnit> {
        self.units.get(id.0)
    }

    pub fn unit_mut(&mut self, id: UnitId) -> Option<&mut MotorUnit> {
        self.units.get_mut(id.0)
    }

    pub fn units(&self) -> impl Iterator<Item = &MotorUnit> {
        self.units.iter()
    }

    /// 当前更新顺序
    pub fn order(&self) -> &[UnitId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn metrics(&self) -> Arc<LoopMetrics> {
        Arc::clone(&self.metrics)
    }

    /// 获取某个单元的跨线程控制句柄
    pub fn controller(&self, id: UnitId) -> Option<UnitController> {
        let unit = self.units.get(id.0)?;
        Some(UnitController::new(
            id,
            Arc::clone(unit.shared()),
            self.command_tx.clone(),
        ))
    }

    // ==================== 跟随 ====================

    /// 让 `follower` 跟随 `master` 的输出
    ///
    /// 拒绝自我跟随和会形成环的跟随关系；成功后 `follower` 及其所有跟随者
    /// 被移到更新顺序末尾。
    pub fn follow(&mut self, follower: UnitId, master: UnitId) -> Result<(), ControlError> {
        self.check(follower)?;
        self.check(master)?;
        if follower == master {
            return Err(ControlError::SelfFollow(follower.0));
        }

        // 沿主单元链向上查找，遇到 follower 说明会形成环
        let mut cursor = Some(master);
        while let Some(id) = cursor {
            if id == follower {
                return Err(ControlError::FollowCycle {
                    follower: follower.0,
                    master: master.0,
                });
            }
            cursor = self.units[id.0].master();
        }

        self.units[follower.0].begin_follow(master);
        self.reposition(follower);
        debug!(
            "Unit '{}' now follows '{}'",
            self.units[follower.0].name(),
            self.units[master.0].name()
        );
        Ok(())
    }

    fn check(&self, id: UnitId) -> Result<(), ControlError> {
        if id.0 < self.units.len() {
            Ok(())
        } else {
            Err(ControlError::UnknownUnit(id.0))
        }
    }

    /// 将 `root` 及其传递跟随者按广度优先顺序移到末尾
    fn reposition(&mut self, root: UnitId) {
        let mut moved: SmallVec<[UnitId; 8]> = SmallVec::new();
        moved.push(root);

        let mut cursor = 0;
        while cursor < moved.len() {
            let parent = moved[cursor];
            for &id in &self.order {
                if self.units[id.0].master() == Some(parent) && !moved.contains(&id) {
                    moved.push(id);
                }
            }
            cursor += 1;
        }

        self.order.retain(|id| !moved.contains(id));
        self.order.extend(moved);
    }

    // ==================== 周期执行 ====================

    /// 执行一个周期
    pub fn tick(&mut self) -> TickReport {
        let start = Instant::now();
        self.ticks += 1;

        let (commands_applied, commands_rejected) = self.drain_commands();

        let base = TickInput {
            period_ms: self.period_ms,
            output_limit: self.config.output_limit,
            fault_policy: self.config.fault_policy,
            sample_feedback: self.config.sample_feedback,
            master_output: None,
        };

        let mut faulted_units = SmallVec::new();
        for index in 0..self.order.len() {
            let id = self.order[index];
            let master_output = self.units[id.0]
                .master()
                .map(|master| self.units[master.0].last_output());
            let input = TickInput {
                master_output,
                ..base
            };
            if self.units[id.0].update(&input).is_err() {
                faulted_units.push(id);
            }
        }

        let elapsed = start.elapsed();
        self.metrics.ticks.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .unit_faults
            .fetch_add(faulted_units.len() as u64, Ordering::Relaxed);
        self.metrics
            .record_tick_duration(elapsed.as_micros().min(u64::MAX as u128) as u64);

        TickReport {
            tick: self.ticks,
            commands_applied,
            commands_rejected,
            faulted_units,
            elapsed,
        }
    }

    /// 应用周期开始时已在队列中的命令
    fn drain_commands(&mut self) -> (usize, usize) {
        let pending = self.command_rx.len();
        let mut applied = 0;
        let mut rejected = 0;

        for _ in 0..pending {
            let Ok(envelope) = self.command_rx.try_recv() else {
                break;
            };
            let unit = envelope.unit;
            let name = envelope.command.name();
            match self.apply_command(envelope) {
                Ok(()) => {
                    trace!("Applied {} to unit {}", name, unit);
                    applied += 1;
                },
                Err(e) => {
                    warn!("Rejected {} for unit {}: {}", name, unit, e);
                    rejected += 1;
                },
            }
        }

        self.metrics
            .commands_applied
            .fetch_add(applied as u64, Ordering::Relaxed);
        self.metrics
            .commands_rejected
            .fetch_add(rejected as u64, Ordering::Relaxed);
        (applied, rejected)
    }

    fn apply_command(&mut self, envelope: Envelope) -> Result<(), ControlError> {
        let Envelope { unit, command } = envelope;
        match command {
            UnitCommand::Follow(master) => self.follow(unit, master),
            command => {
                let target = self
                    .units
                    .get_mut(unit.0)
                    .ok_or(ControlError::UnknownUnit(unit.0))?;
                command.apply(target)
            },
        }
    }

    /// 以固定周期运行，直到 `running` 变为 false 或达到 `max_ticks`
    ///
    /// 下一个周期的锚点按 `period` 递增，睡眠时间自动扣除 tick 的耗时。
    /// tick 超时时不睡眠，锚点重置为当前时间，避免后续周期连续追赶。
    ///
    /// 返回本次运行执行的周期数。
    pub fn run(
        &mut self,
        clock: &mut dyn Clock,
        running: &AtomicBool,
        max_ticks: Option<u64>,
    ) -> u64 {
        let period = self.config.period;
        let warn_interval = self.config.overrun_warn_interval;
        let mut next_tick = clock.now();
        let mut executed = 0u64;
        let mut last_warn: Option<Instant> = None;
        let mut suppressed = 0u64;

        info!(
            "Control loop started: period {:?}, {} units",
            period,
            self.units.len()
        );

        while running.load(Ordering::Acquire) {
            if max_ticks.is_some_and(|max| executed >= max) {
                break;
            }

            self.tick();
            executed += 1;

            next_tick += period;
            let now = clock.now();
            if next_tick > now {
                clock.sleep(next_tick - now);
            } else {
                self.metrics.overruns.fetch_add(1, Ordering::Relaxed);
                let due = last_warn.is_none_or(|at| now.duration_since(at) >= warn_interval);
                if due {
                    warn!(
                        "Control loop overrun: tick finished {:?} past its deadline (period {:?}, {} suppressed)",
                        now.duration_since(next_tick),
                        period,
                        suppressed
                    );
                    last_warn = Some(now);
                    suppressed = 0;
                } else {
                    suppressed += 1;
                }
                next_tick = now;
            }
        }

        info!("Control loop stopped after {} ticks", executed);
        executed
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("units", &self.units)
            .field("order", &self.order)
            .field("ticks", &self.ticks)
            .finish_non_exhaustive()
    }
}
