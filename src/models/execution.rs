// ============================================================================
// SProx - 执行数据模型
// ============================================================================
//
// 文件: src/models/execution.rs
// 职责: 执行单元、执行结果及批次大小的数据结构定义
// 边界:
//   - ✅ 执行单元数据结构定义
//   - ✅ 执行结果与分类枚举定义
//   - ✅ 批次大小（绝对值 / 百分比）解析
//   - ❌ 不应包含任务执行逻辑
//   - ❌ 不应包含任务调度逻辑
//
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::utils::constants::{exit_codes, ABORTED_MESSAGE, NO_RESPONSE_MESSAGE};

/// 执行结果分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// 执行成功
    Success,
    /// 超时未响应（由调度器合成）
    TimedOut,
    /// 操作执行失败
    ApplicationError,
    /// 无法建立连接
    Unreachable,
    /// failhard 中止后未执行完成
    Aborted,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Classification::Success => "success",
            Classification::TimedOut => "timed-out",
            Classification::ApplicationError => "application-error",
            Classification::Unreachable => "unreachable",
            Classification::Aborted => "aborted",
        };
        write!(f, "{}", label)
    }
}

/// 执行单元：一个目标上待执行的一次操作调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionUnit {
    /// 目标 ID
    pub target_id: String,
    /// 操作名（如 `test.ping`）
    pub operation: String,
    /// 位置参数
    pub args: Vec<Value>,
    /// 关键字参数
    pub kwargs: Map<String, Value>,
    /// 任务 ID
    pub jid: String,
}

impl ExecutionUnit {
    pub fn new(target_id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            operation: operation.into(),
            args: Vec::new(),
            kwargs: Map::new(),
            jid: String::new(),
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

    pub fn with_jid(mut self, jid: impl Into<String>) -> Self {
        self.jid = jid.into();
        self
    }
}

/// 执行结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// 目标 ID
    pub target_id: String,
    /// 返回值
    pub value: Value,
    /// 状态码（0 = 成功）
    pub exit_code: i32,
    /// 结果分类
    pub classification: Classification,
    /// 是否为调度器合成的结果（超时 / 中止）
    #[serde(default)]
    pub synthetic: bool,
    /// 执行耗时
    #[serde(skip)]
    pub duration: Option<Duration>,
}

impl ExecutionResult {
    /// 创建成功结果
    pub fn success(target_id: impl Into<String>, value: Value) -> Self {
        Self {
            target_id: target_id.into(),
            value,
            exit_code: exit_codes::EX_OK,
            classification: Classification::Success,
            synthetic: false,
            duration: None,
        }
    }

    /// 操作自行报告的状态码：0 视为成功，否则为应用错误
    pub fn with_status(target_id: impl Into<String>, value: Value, exit_code: i32) -> Self {
        let classification = if exit_code == exit_codes::EX_OK {
            Classification::Success
        } else {
            Classification::ApplicationError
        };
        Self {
            target_id: target_id.into(),
            value,
            exit_code,
            classification,
            synthetic: false,
            duration: None,
        }
    }

    /// 创建应用错误结果
    pub fn application_error(target_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            value: Value::String(message.into()),
            exit_code: exit_codes::EX_GENERIC,
            classification: Classification::ApplicationError,
            synthetic: false,
            duration: None,
        }
    }

    /// 创建不可达结果
    pub fn unreachable(target_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            value: Value::String(message.into()),
            exit_code: exit_codes::EX_UNAVAILABLE,
            classification: Classification::Unreachable,
            synthetic: false,
            duration: None,
        }
    }

    /// 合成的超时结果
    pub fn timed_out(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            value: Value::String(NO_RESPONSE_MESSAGE.to_string()),
            exit_code: exit_codes::EX_UNAVAILABLE,
            classification: Classification::TimedOut,
            synthetic: true,
            duration: None,
        }
    }

    /// 合成的中止结果
    pub fn aborted(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            value: Value::String(ABORTED_MESSAGE.to_string()),
            exit_code: exit_codes::EX_GENERIC,
            classification: Classification::Aborted,
            synthetic: true,
            duration: None,
        }
    }

    /// 工作任务异常退出（panic）
    pub fn crashed(target_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            value: Value::String(message.into()),
            exit_code: exit_codes::EX_SOFTWARE,
            classification: Classification::ApplicationError,
            synthetic: true,
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn is_success(&self) -> bool {
        self.classification == Classification::Success
    }
}

/// 批次大小：绝对数量或占目标总数的百分比
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBatchSize", into = "String")]
pub enum BatchSize {
    Absolute(usize),
    Percent(u32),
}

impl BatchSize {
    /// 在运行开始时按目标总数换算为具体并发数（1 到目标总数之间）
    pub fn resolve(&self, total: usize) -> usize {
        let size = match self {
            BatchSize::Absolute(n) => *n,
            BatchSize::Percent(pct) => total.saturating_mul(*pct as usize) / 100,
        };
        size.min(total).max(1)
    }
}

impl Default for BatchSize {
    fn default() -> Self {
        BatchSize::Absolute(10)
    }
}

impl FromStr for BatchSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(pct) = s.strip_suffix('%') {
            let value: u32 = pct
                .trim()
                .parse()
                .map_err(|_| format!("invalid batch size percentage: {}", s))?;
            if value == 0 || value > 100 {
                return Err(format!("batch size percentage out of range: {}", s));
            }
            Ok(BatchSize::Percent(value))
        } else {
            let value: usize = s.parse().map_err(|_| format!("invalid batch size: {}", s))?;
            Ok(BatchSize::Absolute(value))
        }
    }
}

/// 配置文件中的批次大小写法：`batch_size = 10` 或 `batch_size = "10%"`
#[derive(Deserialize)]
#[serde(untagged)]
enum RawBatchSize {
    Count(usize),
    Text(String),
}

impl TryFrom<RawBatchSize> for BatchSize {
    type Error = String;

    fn try_from(value: RawBatchSize) -> Result<Self, Self::Error> {
        match value {
            RawBatchSize::Count(n) => Ok(BatchSize::Absolute(n)),
            RawBatchSize::Text(text) => text.parse(),
        }
    }
}

impl From<BatchSize> for String {
    fn from(size: BatchSize) -> Self {
        size.to_string()
    }
}

impl fmt::Display for BatchSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchSize::Absolute(n) => write!(f, "{}", n),
            BatchSize::Percent(pct) => write!(f, "{}%", pct),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_batch_size_parse_and_resolve() {
        assert_eq!("4".parse::<BatchSize>(), Ok(BatchSize::Absolute(4)));
        assert_eq!("25%".parse::<BatchSize>(), Ok(BatchSize::Percent(25)));
        assert!("abc".parse::<BatchSize>().is_err());
        assert!("0%".parse::<BatchSize>().is_err());

        assert_eq!(BatchSize::Percent(25).resolve(10), 2);
        assert_eq!(BatchSize::Percent(10).resolve(3), 1);
        assert_eq!(BatchSize::Absolute(0).resolve(5), 1);
        assert_eq!(BatchSize::Absolute(4).resolve(10), 4);
        assert_eq!(BatchSize::Absolute(50).resolve(3), 3);
        assert_eq!(BatchSize::Absolute(usize::MAX).resolve(3), 3);
        assert_eq!(BatchSize::Absolute(usize::MAX).resolve(0), 1);
        assert_eq!(
            "18446744073709551615".parse::<BatchSize>().map(|b| b.resolve(5)),
            Ok(5)
        );
    }

    #[test]
    fn test_status_classification() {
        let ok = ExecutionResult::with_status("r1", json!(true), 0);
        assert_eq!(ok.classification, Classification::Success);

        let failed = ExecutionResult::with_status("r1", json!("boom"), 3);
        assert_eq!(failed.classification, Classification::ApplicationError);
        assert_eq!(failed.exit_code, 3);

        let timeout = ExecutionResult::timed_out("r2");
        assert!(timeout.synthetic);
        assert_eq!(timeout.exit_code, exit_codes::EX_UNAVAILABLE);
    }
}
