//! 轮询调度器。
//!
//! 每个通道一个 tokio 任务和独立的 `interval`；跨通道共享的只有并发准入闸门
//! （公平信号量）。拿不到许可的 tick 排队等待，不丢弃；同一通道的周期严格串行。

use crate::runtime::{ChannelRuntime, CycleOutcome, RuntimeOptions};
use crate::status::StatusTracker;
use domain::{Channel, ChannelId, PointMapping};
use ems_pipeline::Publisher;
use ems_protocol::{PlanLimits, ProtocolAdapter};
use ems_telemetry::{record_deferred_tick, record_poll_timeout};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler already started")]
    AlreadyStarted,
    #[error("scheduler not started")]
    NotStarted,
    #[error("duplicate channel id: {0}")]
    DuplicateChannel(ChannelId),
    #[error("unknown channel id: {0}")]
    UnknownChannel(ChannelId),
}

/// 调度参数
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// 同时进行的轮询周期上限
    pub max_concurrent_polls: usize,
    /// 单个周期采集阶段（连接 + 读取）的超时；发布不计入
    pub poll_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub stale_after_misses: u32,
    pub plan_limits: PlanLimits,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_polls: 8,
            poll_timeout: Duration::from_millis(10_000),
            backoff_base: Duration::from_millis(1000),
            backoff_max: Duration::from_millis(60_000),
            stale_after_misses: 0,
            plan_limits: PlanLimits::default(),
        }
    }
}

impl SchedulerConfig {
    fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions {
            backoff_base: self.backoff_base,
            backoff_max: self.backoff_max,
            stale_after_misses: self.stale_after_misses,
            plan_limits: self.plan_limits,
        }
    }
}

struct ChannelTask {
    token: CancellationToken,
    join: JoinHandle<()>,
}

/// 调度器实例。生命周期：`new` → `add_channel` → `start` → `shutdown`。
pub struct Scheduler {
    config: SchedulerConfig,
    publisher: Arc<Publisher>,
    status: Arc<StatusTracker>,
    gate: Arc<Semaphore>,
    root: CancellationToken,
    pending: BTreeMap<ChannelId, ChannelRuntime>,
    tasks: BTreeMap<ChannelId, ChannelTask>,
    started: bool,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, publisher: Arc<Publisher>) -> Self {
        let permits = config.max_concurrent_polls.max(1);
        Self {
            gate: Arc::new(Semaphore::new(permits)),
            config,
            publisher,
            status: Arc::new(StatusTracker::new()),
            root: CancellationToken::new(),
            pending: BTreeMap::new(),
            tasks: BTreeMap::new(),
            started: false,
        }
    }

    /// 状态查询入口（与调度器共享）。
    pub fn status(&self) -> Arc<StatusTracker> {
        Arc::clone(&self.status)
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.pending
            .keys()
            .chain(self.tasks.keys())
            .copied()
            .collect()
    }

    /// 当前可用的并发槽位数
    pub fn available_slots(&self) -> usize {
        self.gate.available_permits()
    }

    /// 登记通道，只能在 `start` 之前调用。
    pub fn add_channel(
        &mut self,
        channel: Channel,
        mappings: Vec<PointMapping>,
        adapter: Arc<dyn ProtocolAdapter>,
    ) -> Result<(), SchedulerError> {
        if self.started {
            return Err(SchedulerError::AlreadyStarted);
        }
        if self.pending.contains_key(&channel.id) {
            return Err(SchedulerError::DuplicateChannel(channel.id));
        }
        let runtime = ChannelRuntime::new(
            channel,
            mappings,
            adapter,
            Arc::clone(&self.publisher),
            Arc::clone(&self.status),
            self.config.runtime_options(),
        );
        debug!(
            target: "ems.polling",
            channel_id = runtime.channel_id(),
            planned_reads = runtime.planned_reads().len(),
            "channel_added"
        );
        self.pending.insert(runtime.channel_id(), runtime);
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), SchedulerError> {
        if self.started {
            return Err(SchedulerError::AlreadyStarted);
        }
        self.started = true;
        let runtimes = std::mem::take(&mut self.pending);
        for (channel_id, runtime) in runtimes {
            let token = self.root.child_token();
            let join = tokio::spawn(run_channel(
                runtime,
                Arc::clone(&self.gate),
                self.config.poll_timeout,
                token.clone(),
            ));
            self.tasks.insert(channel_id, ChannelTask { token, join });
        }
        info!(
            target: "ems.polling",
            channels = self.tasks.len(),
            max_concurrent_polls = self.config.max_concurrent_polls.max(1),
            "scheduler_started"
        );
        Ok(())
    }

    /// 只停止指定通道，其他通道不受影响。
    pub async fn stop_channel(&mut self, channel_id: ChannelId) -> Result<(), SchedulerError> {
        if !self.started {
            return Err(SchedulerError::NotStarted);
        }
        let task = self
            .tasks
            .remove(&channel_id)
            .ok_or(SchedulerError::UnknownChannel(channel_id))?;
        task.token.cancel();
        if let Err(err) = task.join.await {
            warn!(target: "ems.polling", channel_id, error = %err, "channel_task_join_failed");
        }
        Ok(())
    }

    /// 取消全部通道并等待其关闭会话。可重复调用。
    pub async fn shutdown(&mut self) {
        self.root.cancel();
        let tasks = std::mem::take(&mut self.tasks);
        for (channel_id, task) in tasks {
            if let Err(err) = task.join.await {
                warn!(target: "ems.polling", channel_id, error = %err, "channel_task_join_failed");
            }
        }
        if self.started {
            info!(target: "ems.polling", "scheduler_stopped");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

async fn acquire_slot(
    gate: &Arc<Semaphore>,
    channel_id: ChannelId,
    token: &CancellationToken,
) -> Option<OwnedSemaphorePermit> {
    match Arc::clone(gate).try_acquire_owned() {
        Ok(permit) => return Some(permit),
        Err(TryAcquireError::Closed) => return None,
        Err(TryAcquireError::NoPermits) => {}
    }
    record_deferred_tick();
    debug!(target: "ems.polling", channel_id, "poll_tick_deferred");
    tokio::select! {
        _ = token.cancelled() => None,
        permit = Arc::clone(gate).acquire_owned() => permit.ok(),
    }
}

async fn run_channel(
    mut runtime: ChannelRuntime,
    gate: Arc<Semaphore>,
    poll_timeout: Duration,
    token: CancellationToken,
) {
    let channel_id = runtime.channel_id();
    let mut ticker = tokio::time::interval(runtime.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(permit) = acquire_slot(&gate, channel_id, &token).await else {
            break;
        };

        // 周期超时只约束采集阶段。
        let acquired = tokio::select! {
            _ = token.cancelled() => None,
            result = tokio::time::timeout(poll_timeout, runtime.acquire()) => Some(result),
        };

        let buffer = match acquired {
            None => break,
            Some(Ok(Ok(buffer))) => buffer,
            Some(Ok(Err(_))) => continue,
            Some(Err(_)) => {
                drop(permit);
                record_poll_timeout();
                warn!(
                    target: "ems.polling",
                    channel_id,
                    timeout_ms = poll_timeout.as_millis() as u64,
                    "poll_cycle_timed_out"
                );
                runtime.on_poll_timeout(poll_timeout).await;
                continue;
            }
        };

        let outcome = tokio::select! {
            _ = token.cancelled() => None,
            outcome = runtime.publish(&buffer) => Some(outcome),
        };
        drop(permit);

        match outcome {
            None => break,
            Some(CycleOutcome::Polled {
                published,
                dropped,
                points,
                warnings,
            }) => {
                debug!(
                    target: "ems.polling",
                    channel_id,
                    published,
                    dropped,
                    points,
                    warnings,
                    "poll_cycle_completed"
                );
            }
            Some(_) => {}
        }
    }

    runtime.shutdown().await;
}
