// ============================================================================
// SProx - 能力注册表
// ============================================================================
//
// 文件: src/core/registry.rs
// 职责: 操作与连接驱动的显式注册表
// 边界:
//   - ✅ Operation / ProxyDriver / Session 接口定义
//   - ✅ 目标执行上下文定义
//   - ✅ 内置操作（test.* / grains.* / pillar.* / cmd.run）
//   - ✅ 按名称查找操作与驱动
//   - ❌ 不应包含 worker 生命周期管理
//   - ❌ 不应包含具体传输实现（见 plugins::drivers）
//
// ============================================================================

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::worker::WorkerError;
use crate::models::pool::traverse;
use crate::plugins::drivers::{DummyDriver, LocalDriver};

/// 单个目标的执行上下文
///
/// 由 worker 构建并独占，按引用传给操作；不存在进程级的“当前连接”。
#[derive(Debug, Clone, Default)]
pub struct TargetContext {
    pub target_id: String,
    /// 驱动名称
    pub driver: String,
    pub static_attributes: Map<String, Value>,
    pub grains: Value,
    pub pillar: Value,
    /// 属性路径分隔符
    pub delimiter: String,
}

/// 命令执行输出
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

/// 与目标之间的一次会话
#[async_trait]
pub trait Session: Send {
    /// 从目标实时收集 grains
    async fn collect_grains(&mut self) -> Result<Value, WorkerError>;

    /// 在目标上执行命令
    async fn run_command(&mut self, command: &str) -> Result<CommandOutput, WorkerError>;

    /// 关闭会话
    async fn close(&mut self) -> Result<(), WorkerError>;
}

/// 连接驱动
#[async_trait]
pub trait ProxyDriver: Send + Sync {
    fn name(&self) -> &str;

    async fn connect(&self, context: &TargetContext) -> Result<Box<dyn Session>, WorkerError>;
}

/// 一次操作调用的输入
pub struct Invocation<'a> {
    pub context: &'a TargetContext,
    pub args: &'a [Value],
    pub kwargs: &'a Map<String, Value>,
    /// 未建立连接时为 `None`
    pub session: Option<&'a mut (dyn Session + 'static)>,
}

impl<'a> Invocation<'a> {
    /// 按位置或关键字取参数
    pub fn arg(&self, index: usize, name: &str) -> Option<&'a Value> {
        self.args.get(index).or_else(|| self.kwargs.get(name))
    }

    fn arg_text(&self, index: usize, name: &str) -> Option<String> {
        self.arg(index, name).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// 操作返回值与状态码
#[derive(Debug, Clone, PartialEq)]
pub struct OperationOutput {
    pub value: Value,
    pub exit_code: i32,
}

impl OperationOutput {
    pub fn ok(value: Value) -> Self {
        Self { value, exit_code: 0 }
    }
}

/// 可在目标上调用的操作
#[async_trait]
pub trait Operation: Send + Sync {
    /// 是否需要实时连接
    fn requires_connection(&self) -> bool {
        false
    }

    async fn invoke(&self, invocation: Invocation<'_>) -> Result<OperationOutput, WorkerError>;
}

/// 操作注册表
#[derive(Clone, Default)]
pub struct OperationRegistry {
    operations: HashMap<String, Arc<dyn Operation>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 包含全部内置操作的注册表
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("test.ping", Ping);
        registry.register("test.echo", Echo);
        registry.register("test.arg", ArgInfo);
        registry.register("test.sleep", Sleep);
        registry.register("test.exception", Exception);
        registry.register("test.retcode", Retcode);
        registry.register("grains.items", AttributeItems(Attribute::Grains));
        registry.register("grains.get", AttributeGet(Attribute::Grains));
        registry.register("pillar.items", AttributeItems(Attribute::Pillar));
        registry.register("pillar.get", AttributeGet(Attribute::Pillar));
        registry.register("cmd.run", CmdRun);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, operation: impl Operation + 'static) {
        self.operations.insert(name.into(), Arc::new(operation));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Operation>> {
        self.operations.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// 驱动注册表
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn ProxyDriver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置 `local` 与 `dummy` 驱动
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(LocalDriver);
        registry.register(DummyDriver);
        registry
    }

    pub fn register(&mut self, driver: impl ProxyDriver + 'static) {
        self.drivers.insert(driver.name().to_string(), Arc::new(driver));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProxyDriver>> {
        self.drivers.get(name).cloned()
    }
}

// ============================================================================
// 内置操作
// ============================================================================

struct Ping;

#[async_trait]
impl Operation for Ping {
    async fn invoke(&self, _invocation: Invocation<'_>) -> Result<OperationOutput, WorkerError> {
        Ok(OperationOutput::ok(Value::Bool(true)))
    }
}

struct Echo;

#[async_trait]
impl Operation for Echo {
    async fn invoke(&self, invocation: Invocation<'_>) -> Result<OperationOutput, WorkerError> {
        let text = invocation.arg_text(0, "text").unwrap_or_default();
        Ok(OperationOutput::ok(Value::String(text)))
    }
}

struct ArgInfo;

#[async_trait]
impl Operation for ArgInfo {
    async fn invoke(&self, invocation: Invocation<'_>) -> Result<OperationOutput, WorkerError> {
        Ok(OperationOutput::ok(json!({
            "args": invocation.args,
            "kwargs": invocation.kwargs,
        })))
    }
}

struct Sleep;

#[async_trait]
impl Operation for Sleep {
    async fn invoke(&self, invocation: Invocation<'_>) -> Result<OperationOutput, WorkerError> {
        let length = match invocation.arg(0, "length") {
            Some(value) => value
                .as_f64()
                .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                .ok_or_else(|| WorkerError::InvalidArgument(format!("invalid sleep length: {}", value)))?,
            None => Duration::from_secs(1),
        };
        tokio::time::sleep(length).await;
        Ok(OperationOutput::ok(Value::Bool(true)))
    }
}

struct Exception;

#[async_trait]
impl Operation for Exception {
    async fn invoke(&self, invocation: Invocation<'_>) -> Result<OperationOutput, WorkerError> {
        let message = invocation
            .arg_text(0, "message")
            .unwrap_or_else(|| "test.exception".to_string());
        Err(WorkerError::Application(message))
    }
}

/// 以指定状态码返回，不抛出错误
struct Retcode;

#[async_trait]
impl Operation for Retcode {
    async fn invoke(&self, invocation: Invocation<'_>) -> Result<OperationOutput, WorkerError> {
        let code = match invocation.arg(0, "code") {
            Some(value) => value
                .as_i64()
                .and_then(|code| i32::try_from(code).ok())
                .ok_or_else(|| WorkerError::InvalidArgument(format!("invalid return code: {}", value)))?,
            None => 0,
        };
        let value = invocation.arg(1, "value").cloned().unwrap_or(Value::Bool(code == 0));
        Ok(OperationOutput {
            value,
            exit_code: code,
        })
    }
}

#[derive(Clone, Copy)]
enum Attribute {
    Grains,
    Pillar,
}

impl Attribute {
    fn data<'a>(&self, context: &'a TargetContext) -> &'a Value {
        match self {
            Attribute::Grains => &context.grains,
            Attribute::Pillar => &context.pillar,
        }
    }
}

struct AttributeItems(Attribute);

#[async_trait]
impl Operation for AttributeItems {
    async fn invoke(&self, invocation: Invocation<'_>) -> Result<OperationOutput, WorkerError> {
        Ok(OperationOutput::ok(self.0.data(invocation.context).clone()))
    }
}

/// `grains.get key [default]`
struct AttributeGet(Attribute);

#[async_trait]
impl Operation for AttributeGet {
    async fn invoke(&self, invocation: Invocation<'_>) -> Result<OperationOutput, WorkerError> {
        let key = invocation
            .arg_text(0, "key")
            .ok_or_else(|| WorkerError::InvalidArgument("missing key".to_string()))?;
        let delimiter = invocation
            .kwargs
            .get("delimiter")
            .and_then(Value::as_str)
            .unwrap_or(invocation.context.delimiter.as_str());

        let value = traverse(self.0.data(invocation.context), &key, delimiter)
            .cloned()
            .or_else(|| invocation.arg(1, "default").cloned())
            .unwrap_or_else(|| Value::String(String::new()));
        Ok(OperationOutput::ok(value))
    }
}

/// 在目标上执行命令；需要实时连接
struct CmdRun;

#[async_trait]
impl Operation for CmdRun {
    fn requires_connection(&self) -> bool {
        true
    }

    async fn invoke(&self, invocation: Invocation<'_>) -> Result<OperationOutput, WorkerError> {
        let command = invocation
            .arg_text(0, "cmd")
            .ok_or_else(|| WorkerError::InvalidArgument("missing command".to_string()))?;
        let session = invocation
            .session
            .ok_or_else(|| WorkerError::ConnectionRequired("cmd.run".to_string()))?;

        let output = session.run_command(&command).await?;
        let mut text = output.stdout.trim_end().to_string();
        let stderr = output.stderr.trim_end();
        if !stderr.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(stderr);
        }
        Ok(OperationOutput {
            value: Value::String(text),
            exit_code: output.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> TargetContext {
        TargetContext {
            target_id: "r1".to_string(),
            driver: "dummy".to_string(),
            grains: json!({"os": {"family": "junos"}}),
            pillar: json!({}),
            delimiter: ":".to_string(),
            ..Default::default()
        }
    }

    async fn call(name: &str, args: Vec<Value>, kwargs: Map<String, Value>) -> Result<OperationOutput, WorkerError> {
        let registry = OperationRegistry::builtin();
        let operation = registry.get(name).unwrap();
        let ctx = context();
        operation
            .invoke(Invocation {
                context: &ctx,
                args: &args,
                kwargs: &kwargs,
                session: None,
            })
            .await
    }

    #[tokio::test]
    async fn test_ping_and_echo() {
        assert_eq!(call("test.ping", vec![], Map::new()).await.unwrap().value, json!(true));
        assert_eq!(
            call("test.echo", vec![json!("hello")], Map::new()).await.unwrap().value,
            json!("hello")
        );
    }

    #[tokio::test]
    async fn test_grains_get_with_default() {
        let found = call("grains.get", vec![json!("os:family")], Map::new()).await.unwrap();
        assert_eq!(found.value, json!("junos"));

        let fallback = call("grains.get", vec![json!("model"), json!("n/a")], Map::new())
            .await
            .unwrap();
        assert_eq!(fallback.value, json!("n/a"));
    }

    #[tokio::test]
    async fn test_retcode_and_exception() {
        let retcode = call("test.retcode", vec![json!(3)], Map::new()).await.unwrap();
        assert_eq!(retcode.exit_code, 3);
        assert_eq!(retcode.value, json!(false));

        let err = call("test.exception", vec![json!("kaboom")], Map::new()).await.unwrap_err();
        assert!(matches!(err, WorkerError::Application(msg) if msg == "kaboom"));
    }

    #[tokio::test]
    async fn test_sleep_rejects_unrepresentable_lengths() {
        let short = call("test.sleep", vec![json!(0.01)], Map::new()).await.unwrap();
        assert_eq!(short.value, json!(true));

        for length in [json!(1e20), json!(-1), json!("forever")] {
            let err = call("test.sleep", vec![length], Map::new()).await.unwrap_err();
            assert!(matches!(err, WorkerError::InvalidArgument(_)));
        }
    }

    #[tokio::test]
    async fn test_cmd_run_without_session_requires_connection() {
        let registry = OperationRegistry::builtin();
        assert!(registry.get("cmd.run").unwrap().requires_connection());
        let err = call("cmd.run", vec![json!("uptime")], Map::new()).await.unwrap_err();
        assert!(matches!(err, WorkerError::ConnectionRequired(_)));
    }

    #[test]
    fn test_builtin_names() {
        let registry = OperationRegistry::builtin();
        assert!(registry.names().contains(&"pillar.items"));
        assert!(registry.get("state.apply").is_none());
        assert!(DriverRegistry::builtin().get("local").is_some());
    }
}
