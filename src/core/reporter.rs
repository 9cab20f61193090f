// ============================================================================
// SProx - 结果汇总
// ============================================================================
//
// 文件: src/core/reporter.rs
// 职责: 结果通道、运行统计与结果消费
// 边界:
//   - ✅ 结果通道事件定义（结果 / 结束哨兵）
//   - ✅ 并发安全的运行统计（超时 / 失败 / 不可达 / 中止、最大退出码）
//   - ✅ 流式与收集两种交付模式
//   - ✅ 生命周期事件发布
//   - ❌ 不应包含具体输出格式（由 ResultSink 实现决定）
//   - ❌ 不应包含调度逻辑
//
// ============================================================================

use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::models::execution::{Classification, ExecutionResult};
use crate::plugins::events::{publish_quietly, return_tag, EventSink};

/// 结果通道中的事件
#[derive(Debug)]
pub enum RunEvent {
    Result(ExecutionResult),
    /// 结束哨兵，两条执行路径都结束后发送一次
    Finished,
}

/// 一次运行中各生产方共享的句柄
#[derive(Clone)]
pub struct RunChannels {
    pub results: mpsc::UnboundedSender<RunEvent>,
    pub tracker: Arc<RunTracker>,
    pub cancel: CancellationToken,
}

impl RunChannels {
    /// 计入统计并投递给消费方
    pub fn deliver(&self, result: ExecutionResult) {
        self.tracker.record(&result);
        if self.results.send(RunEvent::Result(result)).is_err() {
            debug!("Result channel closed, dropping result");
        }
    }

    /// 只计入统计，不输出
    pub fn record_only(&self, result: &ExecutionResult) {
        self.tracker.record(result);
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    timed_out: Vec<String>,
    failed: Vec<String>,
    unreachable: Vec<String>,
    aborted: Vec<String>,
    max_exit_code: i32,
}

/// 运行统计
///
/// 多个监督任务同时写入；最大退出码与到达顺序无关。
#[derive(Debug, Default)]
pub struct RunTracker {
    state: Mutex<TrackerState>,
}

impl RunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 记录一个结果
    pub fn record(&self, result: &ExecutionResult) {
        let mut state = self.lock();
        let id = result.target_id.clone();
        match result.classification {
            Classification::Success => {}
            Classification::TimedOut => state.timed_out.push(id),
            Classification::ApplicationError => state.failed.push(id),
            Classification::Unreachable => state.unreachable.push(id),
            Classification::Aborted => state.aborted.push(id),
        }
        state.max_exit_code = state.max_exit_code.max(result.exit_code);
    }

    /// 记录不对应单个目标的状态码（如常驻路径的批次退出码）
    pub fn observe_exit_code(&self, code: i32) {
        let mut state = self.lock();
        state.max_exit_code = state.max_exit_code.max(code);
    }

    pub fn exit_code(&self) -> i32 {
        self.lock().max_exit_code
    }

    pub fn summary(&self, targeted: usize) -> RunSummary {
        let state = self.lock();
        RunSummary {
            targeted,
            timed_out: state.timed_out.clone(),
            failed: state.failed.clone(),
            unreachable: state.unreachable.clone(),
            aborted: state.aborted.clone(),
            exit_code: state.max_exit_code,
        }
    }
}

/// 运行结束时的统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub targeted: usize,
    pub timed_out: Vec<String>,
    pub failed: Vec<String>,
    pub unreachable: Vec<String>,
    pub aborted: Vec<String>,
    pub exit_code: i32,
}

impl RunSummary {
    /// 已返回数 = 目标数 − 超时 − 不可达
    pub fn returned(&self) -> usize {
        self.targeted
            .saturating_sub(self.timed_out.len())
            .saturating_sub(self.unreachable.len())
    }
}

/// 结果输出方
pub trait ResultSink: Send {
    /// 每个结果到达时调用（两种模式都会调用，用于驱动进度）
    fn tick(&mut self, _result: &ExecutionResult) {}

    /// 流式模式下输出单个结果
    fn emit(&mut self, result: &ExecutionResult);

    /// 收集模式下一次性输出全部结果
    fn emit_all(&mut self, results: &BTreeMap<String, ExecutionResult>) {
        for result in results.values() {
            self.emit(result);
        }
    }

    /// 结束哨兵到达后调用
    fn finish(&mut self) {}
}

/// 丢弃所有输出
#[derive(Debug, Default)]
pub struct NullSink;

impl ResultSink for NullSink {
    fn emit(&mut self, _result: &ExecutionResult) {}
}

/// 结果消费方
pub struct Reporter {
    static_output: bool,
    sink: Box<dyn ResultSink>,
    events: Option<(Arc<dyn EventSink>, String)>,
}

impl Reporter {
    pub fn new(static_output: bool, sink: Box<dyn ResultSink>) -> Self {
        Self {
            static_output,
            sink,
            events: None,
        }
    }

    /// 为每个结果发布 `sprox/run/<jid>/ret/<id>` 事件
    pub fn with_events(mut self, sink: Arc<dyn EventSink>, jid: impl Into<String>) -> Self {
        self.events = Some((sink, jid.into()));
        self
    }

    /// 持续消费结果通道直到结束哨兵，返回 target-id -> 结果
    pub async fn drain(mut self, mut rx: mpsc::UnboundedReceiver<RunEvent>) -> BTreeMap<String, ExecutionResult> {
        let mut aggregate = BTreeMap::new();

        while let Some(event) = rx.recv().await {
            let result = match event {
                RunEvent::Result(result) => result,
                RunEvent::Finished => break,
            };

            if let Some((events, jid)) = &self.events {
                let payload = json!({
                    "id": result.target_id,
                    "return": result.value,
                    "retcode": result.exit_code,
                    "success": result.is_success(),
                });
                publish_quietly(events.as_ref(), &return_tag(jid, &result.target_id), &payload).await;
            }

            self.sink.tick(&result);
            if !self.static_output && !is_silent(&result) {
                self.sink.emit(&result);
            }
            aggregate.insert(result.target_id.clone(), result);
        }

        if self.static_output {
            self.sink.emit_all(&aggregate);
        }
        self.sink.finish();
        aggregate
    }
}

/// 成功且无返回内容的结果在流式模式下不输出
fn is_silent(result: &ExecutionResult) -> bool {
    result.is_success() && result.value.is_null()
}
