// ============================================================================
// SProx - 结果转发
// ============================================================================
//
// 文件: src/plugins/returner.rs
// 职责: 将单个目标的执行结果转发到外部存储
// 边界:
//   - ✅ Returner 接口
//   - ✅ 内置 log / jsonl 实现与按名称查找
//   - ❌ 转发失败不得影响退出码（由 worker 记录日志）
//
// ============================================================================

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

use crate::models::execution::ExecutionResult;

#[derive(Debug, Error)]
pub enum ReturnerError {
    #[error("returner '{0}' is not available")]
    Unknown(String),
    #[error("returner I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize return: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 转发给 returner 的单条记录
#[derive(Debug, Serialize)]
pub struct ReturnRecord<'a> {
    pub jid: &'a str,
    pub fun: &'a str,
    pub id: &'a str,
    #[serde(rename = "return")]
    pub value: &'a serde_json::Value,
    pub retcode: i32,
    pub success: bool,
}

impl<'a> ReturnRecord<'a> {
    pub fn new(jid: &'a str, fun: &'a str, result: &'a ExecutionResult) -> Self {
        Self {
            jid,
            fun,
            id: &result.target_id,
            value: &result.value,
            retcode: result.exit_code,
            success: result.is_success(),
        }
    }
}

#[async_trait]
pub trait Returner: Send + Sync {
    fn name(&self) -> &str;

    async fn save(&self, record: &ReturnRecord<'_>) -> Result<(), ReturnerError>;
}

/// 按名称创建内置 returner
pub fn returner_by_name(name: &str, cache_dir: &Path) -> Result<Arc<dyn Returner>, ReturnerError> {
    match name {
        "log" => Ok(Arc::new(LogReturner)),
        "jsonl" => Ok(Arc::new(JsonLinesReturner::new(cache_dir.join("returns.jsonl")))),
        other => Err(ReturnerError::Unknown(other.to_string())),
    }
}

/// 通过 tracing 输出结果
#[derive(Debug, Default)]
pub struct LogReturner;

#[async_trait]
impl Returner for LogReturner {
    fn name(&self) -> &str {
        "log"
    }

    async fn save(&self, record: &ReturnRecord<'_>) -> Result<(), ReturnerError> {
        info!(jid = record.jid, id = record.id, retcode = record.retcode, "{}", record.value);
        Ok(())
    }
}

/// 每条结果追加一行 JSON
#[derive(Debug)]
pub struct JsonLinesReturner {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesReturner {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl Returner for JsonLinesReturner {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn save(&self, record: &ReturnRecord<'_>) -> Result<(), ReturnerError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_jsonl_appends_one_line_per_result() {
        let dir = tempfile::tempdir().unwrap();
        let returner = returner_by_name("jsonl", dir.path()).unwrap();

        let ok = ExecutionResult::success("r1", json!(true));
        let failed = ExecutionResult::application_error("r2", "boom");
        returner.save(&ReturnRecord::new("jid1", "test.ping", &ok)).await.unwrap();
        returner.save(&ReturnRecord::new("jid1", "test.ping", &failed)).await.unwrap();

        let content = std::fs::read_to_string(dir.path().join("returns.jsonl")).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["id"], json!("r1"));
        assert_eq!(lines[0]["return"], json!(true));
        assert_eq!(lines[1]["success"], json!(false));
    }

    #[test]
    fn test_unknown_returner() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            returner_by_name("smtp", dir.path()),
            Err(ReturnerError::Unknown(_))
        ));
    }
}
