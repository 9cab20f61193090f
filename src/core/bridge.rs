// ============================================================================
// SProx - 常驻 worker 桥接
// ============================================================================
//
// 文件: src/core/bridge.rs
// 职责: 已运行的常驻 worker 路径接口及其结果转发
// 边界:
//   - ✅ LongLivedBridge 接口（哪些目标可走常驻路径、批量执行）
//   - ✅ 将桥接结果流并入统一结果通道
//   - ✅ 响应共享取消令牌，未完成目标标记为中止
//   - ❌ 不包含常驻 worker 的内部批次与超时实现（由桥接方负责）
//
// ============================================================================

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{Map, Value};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tracing::{debug, warn};

use super::reporter::RunChannels;
use crate::models::execution::ExecutionResult;

/// 发给常驻路径的一批请求
#[derive(Debug, Clone)]
pub struct BridgeRequest {
    pub targets: Vec<String>,
    pub operation: String,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
    pub jid: String,
    pub batch_size: usize,
    pub timeout: Option<Duration>,
}

/// 常驻路径产出的事件
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// 单个目标的结果
    Reply(ExecutionResult),
    /// 批次结束：汇总退出码与未响应的目标
    Done { exit_code: i32, unresponsive: Vec<String> },
}

/// 常驻 worker 桥接
#[async_trait]
pub trait LongLivedBridge: Send + Sync {
    /// 返回给定目标中已有常驻 worker 的那部分
    async fn accepted(&self, targets: &[String]) -> HashSet<String>;

    /// 执行一批请求，按完成顺序惰性产出结果
    fn run_batch(&self, request: BridgeRequest) -> BoxStream<'static, BridgeEvent>;
}

/// 不存在常驻 worker：所有目标都走临时路径
#[derive(Debug, Clone, Default)]
pub struct DisabledBridge;

#[async_trait]
impl LongLivedBridge for DisabledBridge {
    async fn accepted(&self, _targets: &[String]) -> HashSet<String> {
        HashSet::new()
    }

    fn run_batch(&self, _request: BridgeRequest) -> BoxStream<'static, BridgeEvent> {
        stream::iter(vec![BridgeEvent::Done {
            exit_code: 0,
            unresponsive: Vec::new(),
        }])
        .boxed()
    }
}

/// 驱动常驻路径并把结果并入结果通道
///
/// 取消时剩余目标记为中止；流在 `Done` 之前结束时，未返回的目标按未响应处理。
pub async fn forward(
    bridge: &dyn LongLivedBridge,
    request: BridgeRequest,
    channels: &RunChannels,
    failhard: bool,
    hide_timeout: bool,
) {
    if request.targets.is_empty() {
        return;
    }

    let mut outstanding: VecDeque<String> = request.targets.iter().cloned().collect();
    debug!("Sending {} targets to existing workers", outstanding.len());
    let mut events = bridge.run_batch(request);
    let mut finished = false;

    loop {
        let event = tokio::select! {
            biased;
            _ = channels.cancel.cancelled() => break,
            event = events.next() => event,
        };

        match event {
            Some(BridgeEvent::Reply(result)) => {
                if !take_outstanding(&mut outstanding, &result.target_id) {
                    debug!("Ignoring reply for {} which is not outstanding", result.target_id);
                    continue;
                }
                let failed = result.exit_code != 0;
                let id = result.target_id.clone();
                channels.deliver(result);
                if failed && failhard && !channels.cancel.is_cancelled() {
                    warn!("failhard: {} returned a non-zero status, aborting run", id);
                    channels.cancel.cancel();
                }
            }
            Some(BridgeEvent::Done { exit_code, unresponsive }) => {
                channels.tracker.observe_exit_code(exit_code);
                for id in unresponsive {
                    if take_outstanding(&mut outstanding, &id) {
                        report_timeout(channels, &id, hide_timeout);
                    }
                }
                finished = true;
                break;
            }
            None => break,
        }
    }

    if channels.cancel.is_cancelled() {
        for id in outstanding.drain(..) {
            channels.deliver(ExecutionResult::aborted(id));
        }
    } else if !finished || !outstanding.is_empty() {
        for id in outstanding.drain(..) {
            warn!("{} did not return from its existing worker", id);
            report_timeout(channels, &id, hide_timeout);
        }
    }
}

/// 目标仍未返回时将其移出并返回 true；每个目标只报告一次
fn take_outstanding(outstanding: &mut VecDeque<String>, id: &str) -> bool {
    match outstanding.iter().position(|pending| pending == id) {
        Some(pos) => {
            outstanding.remove(pos);
            true
        }
        None => false,
    }
}

fn report_timeout(channels: &RunChannels, id: &str, hide_timeout: bool) {
    let result = ExecutionResult::timed_out(id);
    if hide_timeout {
        channels.record_only(&result);
    } else {
        channels.deliver(result);
    }
}
