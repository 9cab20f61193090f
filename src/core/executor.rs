// ============================================================================
// SProx - 执行协调器
// ============================================================================
//
// 文件: src/core/executor.rs
// 职责: 一次运行的整体协调
// 边界:
//   - ✅ 目标按常驻 / 临时两条路径拆分，批次大小按比例分配
//   - ✅ 两条路径共享取消令牌并汇入同一结果通道
//   - ✅ 两条路径都结束后发送唯一的结束哨兵
//   - ✅ 汇总结果、统计与最终退出码
//   - ❌ 不包含目标解析逻辑
//   - ❌ 不包含结果格式化
//   - ❌ 不包含 CLI 参数处理
//
// ============================================================================

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::bridge::{self, BridgeRequest, DisabledBridge, LongLivedBridge};
use super::reporter::{Reporter, ResultSink, RunChannels, RunEvent, RunSummary, RunTracker};
use super::scheduler::{BatchScheduler, SchedulerConfig};
use super::worker::{run_unit, WorkerOptions, WorkerServices};
use crate::models::execution::{BatchSize, ExecutionResult, ExecutionUnit};
use crate::models::pool::Pool;
use crate::plugins::events::{new_job_tag, publish_quietly, EventSink, NullEventSink};

/// 一次运行的执行选项
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub batch_size: BatchSize,
    /// 单元完成后槽位保留的时长
    pub batch_wait: Duration,
    /// 单元超时（None 表示不限制）
    pub timeout: Option<Duration>,
    /// 收集全部结果后一次性输出
    pub static_output: bool,
    pub failhard: bool,
    pub hide_timeout: bool,
    /// 发布生命周期事件
    pub events: bool,
    /// 优先交给已运行的常驻 worker
    pub use_existing_proxy: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            batch_size: BatchSize::default(),
            batch_wait: Duration::ZERO,
            timeout: None,
            static_output: false,
            failhard: false,
            hide_timeout: false,
            events: false,
            use_existing_proxy: false,
        }
    }
}

/// 要执行的操作
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub operation: String,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl RunRequest {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Default::default()
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.kwargs = kwargs;
        self
    }
}

/// 一次运行的结果
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub jid: String,
    /// target-id -> 结果
    pub results: BTreeMap<String, ExecutionResult>,
    pub summary: RunSummary,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        self.summary.exit_code
    }
}

/// 生成基于时间戳的任务 ID
pub fn generate_jid() -> String {
    chrono::Local::now().format("%Y%m%d%H%M%S%6f").to_string()
}

/// 批次大小在两条路径间按目标数比例分配，返回 (常驻, 临时)
pub fn split_batch_size(batch_size: usize, long_lived: usize, total: usize) -> (usize, usize) {
    if total == 0 || long_lived == 0 {
        return (0, batch_size.max(1));
    }
    let bridge_share = (batch_size * long_lived / total).max(1);
    let ephemeral = batch_size.saturating_sub(bridge_share).max(1);
    (bridge_share, ephemeral)
}

/// 执行协调器
pub struct Executor {
    services: WorkerServices,
    worker_options: Arc<WorkerOptions>,
    bridge: Arc<dyn LongLivedBridge>,
    events: Arc<dyn EventSink>,
}

impl Executor {
    pub fn new(services: WorkerServices, worker_options: WorkerOptions) -> Self {
        Self {
            services,
            worker_options: Arc::new(worker_options),
            bridge: Arc::new(DisabledBridge),
            events: Arc::new(NullEventSink),
        }
    }

    pub fn with_bridge(mut self, bridge: Arc<dyn LongLivedBridge>) -> Self {
        self.bridge = bridge;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// 在已解析的目标上执行请求
    ///
    /// `targets` 的顺序即准入顺序。返回时结束哨兵已被消费，所有输出都已完成。
    pub async fn execute(
        &self,
        targets: &Pool,
        request: &RunRequest,
        options: &ExecuteOptions,
        sink: Box<dyn ResultSink>,
    ) -> RunOutcome {
        let jid = generate_jid();
        let total = targets.len();
        let ids: Vec<String> = targets.ids().to_vec();

        if options.events {
            publish_quietly(
                self.events.as_ref(),
                &new_job_tag(&jid),
                &json!({"minions": ids, "fun": request.operation}),
            )
            .await;
        }

        let accepted = if options.use_existing_proxy {
            self.bridge.accepted(&ids).await
        } else {
            Default::default()
        };
        let (long_lived, ephemeral): (Vec<String>, Vec<String>) =
            ids.into_iter().partition(|id| accepted.contains(id));

        let batch_size = options.batch_size.resolve(total);
        let (bridge_batch, ephemeral_batch) = split_batch_size(batch_size, long_lived.len(), total);
        info!(
            "Run {}: {} targets ({} via existing workers), batch size {}",
            jid,
            total,
            long_lived.len(),
            batch_size
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let channels = RunChannels {
            results: tx,
            tracker: Arc::new(RunTracker::new()),
            cancel: CancellationToken::new(),
        };

        let mut reporter = Reporter::new(options.static_output, sink);
        if options.events {
            reporter = reporter.with_events(Arc::clone(&self.events), jid.clone());
        }
        let consumer = tokio::spawn(reporter.drain(rx));

        let bridge_path = bridge::forward(
            self.bridge.as_ref(),
            BridgeRequest {
                targets: long_lived,
                operation: request.operation.clone(),
                args: request.args.clone(),
                kwargs: request.kwargs.clone(),
                jid: jid.clone(),
                batch_size: bridge_batch,
                timeout: options.timeout,
            },
            &channels,
            options.failhard,
            options.hide_timeout,
        );

        let scheduler = BatchScheduler::new(SchedulerConfig {
            batch_size: ephemeral_batch,
            timeout: options.timeout,
            batch_wait: options.batch_wait,
            failhard: options.failhard,
            hide_timeout: options.hide_timeout,
        });
        let ephemeral_path = scheduler.run(
            ephemeral,
            |id| {
                let record = targets.get(&id).cloned().unwrap_or_default();
                let unit = ExecutionUnit::new(id, request.operation.clone())
                    .with_args(request.args.clone())
                    .with_kwargs(request.kwargs.clone())
                    .with_jid(jid.clone());
                run_unit(
                    unit,
                    record,
                    Arc::clone(&self.worker_options),
                    self.services.clone(),
                )
            },
            &channels,
        );

        tokio::join!(bridge_path, ephemeral_path);
        debug!("Both execution paths finished for {}", jid);

        if channels.results.send(RunEvent::Finished).is_err() {
            error!("Result consumer stopped before the run finished");
        }

        let results = match consumer.await {
            Ok(results) => results,
            Err(e) => {
                error!("Result consumer failed: {}", e);
                BTreeMap::new()
            }
        };

        RunOutcome {
            summary: channels.tracker.summary(total),
            jid,
            results,
        }
    }
}
