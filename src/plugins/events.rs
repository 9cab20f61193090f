// ============================================================================
// SProx - 事件总线
// ============================================================================
//
// 文件: src/plugins/events.rs
// 职责: 运行生命周期事件的发布接口
// 边界:
//   - ✅ EventSink 接口
//   - ✅ 空实现与日志实现
//   - ✅ 事件标签格式
//   - ❌ 发布失败不得影响运行结果
//
// ============================================================================

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
#[error("failed to publish event '{tag}': {reason}")]
pub struct EventError {
    pub tag: String,
    pub reason: String,
}

/// 事件接收方
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, tag: &str, payload: &Value) -> Result<(), EventError>;
}

/// 运行开始事件标签
pub fn new_job_tag(jid: &str) -> String {
    format!("sprox/run/{}/new", jid)
}

/// 单个目标返回事件标签
pub fn return_tag(jid: &str, target_id: &str) -> String {
    format!("sprox/run/{}/ret/{}", jid, target_id)
}

/// 发布事件，失败只记录日志
pub async fn publish_quietly(sink: &dyn EventSink, tag: &str, payload: &Value) {
    if let Err(e) = sink.publish(tag, payload).await {
        warn!("{}", e);
    }
}

/// 丢弃所有事件
#[derive(Debug, Clone, Default)]
pub struct NullEventSink;

#[async_trait]
impl EventSink for NullEventSink {
    async fn publish(&self, _tag: &str, _payload: &Value) -> Result<(), EventError> {
        Ok(())
    }
}

/// 通过 tracing 输出事件
#[derive(Debug, Clone, Default)]
pub struct LogEventSink;

#[async_trait]
impl EventSink for LogEventSink {
    async fn publish(&self, tag: &str, payload: &Value) -> Result<(), EventError> {
        info!(tag = tag, "{}", payload);
        Ok(())
    }
}
