// ============================================================================
// SProx - 批次调度器
// ============================================================================
//
// 文件: src/core/scheduler.rs
// 职责: 临时 worker 路径的并发调度
// 边界:
//   - ✅ 信号量控制的在途单元上限（空出一个槽位立即补入下一个）
//   - ✅ 每个单元独立的监督任务与超时强制终止
//   - ✅ failhard 取消：停止准入、终止在途单元、标记剩余目标
//   - ✅ 槽位释放前的 batch_wait 等待
//   - ❌ 不包含 worker 具体执行逻辑
//   - ❌ 不包含结果格式化与输出
//
// ============================================================================

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use super::reporter::RunChannels;
use crate::models::execution::ExecutionResult;

/// 调度器配置
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// 最大在途单元数
    pub batch_size: usize,
    /// 单元超时（None 表示不限制）
    pub timeout: Option<Duration>,
    /// 单元完成后槽位保留的时长
    pub batch_wait: Duration,
    /// 首个非零状态即中止整个运行
    pub failhard: bool,
    /// 不输出合成的超时结果（仍计入统计）
    pub hide_timeout: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            timeout: None,
            batch_wait: Duration::ZERO,
            failhard: false,
            hide_timeout: false,
        }
    }
}

/// 单元执行的最终去向
enum UnitOutcome {
    Completed(ExecutionResult),
    TimedOut,
    Aborted,
    Crashed(String),
}

/// 临时 worker 路径的批次调度器
pub struct BatchScheduler {
    config: SchedulerConfig,
}

impl BatchScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    /// 按目标顺序准入并执行全部单元
    ///
    /// `make_unit` 为每个目标构造 worker future；每个结果都经 `channels`
    /// 送达汇总方。返回时所有单元都已结束或被终止。
    pub async fn run<F, Fut>(&self, targets: Vec<String>, mut make_unit: F, channels: &RunChannels)
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = ExecutionResult> + Send + 'static,
    {
        if targets.is_empty() {
            return;
        }

        debug!(
            "Scheduling {} targets with batch size {}",
            targets.len(),
            self.config.batch_size
        );

        let permits = self.config.batch_size.clamp(1, Semaphore::MAX_PERMITS);
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut supervisors = JoinSet::new();
        let mut pending = targets.into_iter();

        while let Some(target_id) = pending.next() {
            let permit = tokio::select! {
                biased;
                _ = channels.cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };

            let Some(permit) = permit else {
                let remaining: Vec<String> = std::iter::once(target_id).chain(pending.by_ref()).collect();
                warn!("Run aborted, {} targets were not started", remaining.len());
                for id in remaining {
                    channels.deliver(ExecutionResult::aborted(id));
                }
                break;
            };

            debug!("Admitting {}", target_id);
            let unit = make_unit(target_id.clone());
            supervisors.spawn(supervise(
                target_id,
                unit,
                permit,
                self.config.clone(),
                channels.clone(),
            ));
        }

        while let Some(joined) = supervisors.join_next().await {
            if let Err(e) = joined {
                error!("Supervisor task failed: {}", e);
            }
        }
    }
}

/// 监督单个单元：施加超时、响应取消、投递结果
async fn supervise<Fut>(
    target_id: String,
    unit: Fut,
    permit: OwnedSemaphorePermit,
    config: SchedulerConfig,
    channels: RunChannels,
) where
    Fut: Future<Output = ExecutionResult> + Send + 'static,
{
    let started = Instant::now();
    let worker = tokio::spawn(unit);
    let abort = worker.abort_handle();

    let limit = config.timeout;
    let joined = async move {
        match limit {
            Some(limit) => tokio::time::timeout(limit, worker).await.ok(),
            None => Some(worker.await),
        }
    };

    let outcome = tokio::select! {
        biased;
        joined = joined => match joined {
            Some(Ok(result)) => UnitOutcome::Completed(result),
            Some(Err(e)) if e.is_cancelled() => UnitOutcome::Aborted,
            Some(Err(e)) => UnitOutcome::Crashed(e.to_string()),
            None => {
                abort.abort();
                UnitOutcome::TimedOut
            }
        },
        _ = channels.cancel.cancelled() => {
            abort.abort();
            UnitOutcome::Aborted
        }
    };

    match outcome {
        UnitOutcome::Completed(result) => {
            let failed = result.exit_code != 0;
            channels.deliver(result);
            if failed && config.failhard {
                trigger_failhard(&target_id, &channels);
            }
        }
        UnitOutcome::TimedOut => {
            warn!("{} did not respond within {:?}", target_id, config.timeout.unwrap_or_default());
            let result = ExecutionResult::timed_out(&target_id).with_duration(started.elapsed());
            if config.hide_timeout {
                channels.record_only(&result);
            } else {
                channels.deliver(result);
            }
        }
        UnitOutcome::Aborted => {
            debug!("{} was terminated by failhard", target_id);
            channels.deliver(ExecutionResult::aborted(&target_id));
        }
        UnitOutcome::Crashed(reason) => {
            error!("Worker for {} crashed: {}", target_id, reason);
            channels.deliver(ExecutionResult::crashed(&target_id, reason));
            if config.failhard {
                trigger_failhard(&target_id, &channels);
            }
        }
    }

    if !config.batch_wait.is_zero() {
        tokio::select! {
            _ = tokio::time::sleep(config.batch_wait) => {}
            _ = channels.cancel.cancelled() => {}
        }
    }
    drop(permit);
}

fn trigger_failhard(target_id: &str, channels: &RunChannels) {
    if !channels.cancel.is_cancelled() {
        warn!("failhard: {} returned a non-zero status, aborting run", target_id);
        channels.cancel.cancel();
    }
}
