// ============================================================================
// SProx - 单目标 worker
// ============================================================================
//
// 文件: src/core/worker.rs
// 职责: 在一个目标上执行一次操作并产出分类结果
// 边界:
//   - ✅ 执行上下文构建（默认值 < 缓存 < inventory）
//   - ✅ 建立 / 跳过连接、调用操作、保证关闭会话
//   - ✅ 错误分类（不可达 / 应用错误），绝不向上抛出
//   - ✅ 缓存写回与 returner 转发
//   - ❌ 不应包含超时控制（由调度器从外部施加）
//   - ❌ 不应包含并发控制
//
// ============================================================================

use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

use super::registry::{
    DriverRegistry, Invocation, OperationOutput, OperationRegistry, Session, TargetContext,
};
use crate::models::execution::{ExecutionResult, ExecutionUnit};
use crate::models::pool::{merge_values, TargetRecord};
use crate::plugins::cache::{cache_bank, CacheStore, CACHE_DATA_KEY};
use crate::plugins::returner::{ReturnRecord, Returner};

/// worker 内部错误；在 worker 边界被转换为分类结果
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("could not connect to {target}: {reason}")]
    Connection { target: String, reason: String },
    #[error("proxy driver '{0}' is not available")]
    UnknownDriver(String),
    #[error("'{0}' is not available")]
    OperationNotAvailable(String),
    #[error("'{0}' requires a connection, but no-connect mode is enabled")]
    ConnectionRequired(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{0}")]
    Application(String),
}

impl WorkerError {
    /// 连接层面的失败视为目标不可达
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            WorkerError::Connection { .. } | WorkerError::UnknownDriver(_)
        )
    }
}

/// worker 生命周期状态
///
/// 超时不在此列：它由调度器从外部终止任务时施加。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    ContextBuilt,
    Connected,
    ConnectionSkipped,
    Executing,
    Succeeded,
    Failed,
    Disconnected,
    Terminal,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// worker 选项（一次运行内所有 worker 共享）
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// 不建立连接，仅使用已有属性
    pub no_connect: bool,
    /// 连接后实时收集 grains
    pub with_grains: bool,
    /// 加载 pillar
    pub with_pillar: bool,
    pub use_cached_grains: bool,
    pub use_cached_pillar: bool,
    pub cache_grains: bool,
    pub cache_pillar: bool,
    /// 目标未声明 proxytype 时使用的驱动
    pub default_driver: String,
    pub delimiter: String,
    /// 请求级默认 grains（优先级最低）
    pub default_grains: Value,
    /// 请求级默认 pillar（优先级最低）
    pub default_pillar: Value,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            no_connect: false,
            with_grains: true,
            with_pillar: true,
            use_cached_grains: true,
            use_cached_pillar: true,
            cache_grains: false,
            cache_pillar: false,
            default_driver: "local".to_string(),
            delimiter: ":".to_string(),
            default_grains: Value::Object(Map::new()),
            default_pillar: Value::Object(Map::new()),
        }
    }
}

/// worker 依赖的外部协作者
#[derive(Clone)]
pub struct WorkerServices {
    pub operations: Arc<OperationRegistry>,
    pub drivers: Arc<DriverRegistry>,
    pub cache: Option<Arc<dyn CacheStore>>,
    pub returner: Option<Arc<dyn Returner>>,
}

impl Default for WorkerServices {
    fn default() -> Self {
        Self {
            operations: Arc::new(OperationRegistry::builtin()),
            drivers: Arc::new(DriverRegistry::builtin()),
            cache: None,
            returner: None,
        }
    }
}

/// 单目标 worker
pub struct Worker {
    unit: ExecutionUnit,
    record: TargetRecord,
    options: Arc<WorkerOptions>,
    services: WorkerServices,
    state: WorkerState,
    history: Vec<WorkerState>,
}

impl Worker {
    pub fn new(
        unit: ExecutionUnit,
        record: TargetRecord,
        options: Arc<WorkerOptions>,
        services: WorkerServices,
    ) -> Self {
        Self {
            unit,
            record,
            options,
            services,
            state: WorkerState::Created,
            history: vec![WorkerState::Created],
        }
    }

    /// 经历过的全部状态
    pub fn history(&self) -> &[WorkerState] {
        &self.history
    }

    fn transition(&mut self, next: WorkerState) {
        debug!("[{}] {} -> {}", self.unit.target_id, self.state, next);
        self.state = next;
        self.history.push(next);
    }

    /// 执行完整生命周期；任何失败都作为结果数据返回
    pub async fn run(&mut self) -> ExecutionResult {
        let started = Instant::now();
        let target_id = self.unit.target_id.clone();

        let mut context = self.build_context().await;
        self.transition(WorkerState::ContextBuilt);

        let outcome = self.connect_and_invoke(&mut context).await;

        let result = match outcome {
            Ok(output) => ExecutionResult::with_status(&target_id, output.value, output.exit_code),
            Err(err) if err.is_unreachable() => {
                warn!("[{}] {}", target_id, err);
                ExecutionResult::unreachable(&target_id, err.to_string())
            }
            Err(err) => {
                debug!("[{}] operation failed: {}", target_id, err);
                ExecutionResult::application_error(&target_id, err.to_string())
            }
        }
        .with_duration(started.elapsed());

        self.write_back_cache(&context).await;
        self.forward_to_returner(&result).await;
        self.transition(WorkerState::Terminal);
        result
    }

    /// 默认值 < 缓存 < inventory
    async fn build_context(&self) -> TargetContext {
        let mut grains = self.options.default_grains.clone();
        let mut pillar = if self.options.with_pillar {
            self.options.default_pillar.clone()
        } else {
            Value::Object(Map::new())
        };

        if let Some(cached) = self.fetch_cache().await {
            if self.options.use_cached_grains {
                if let Some(cached_grains) = cached.get("grains") {
                    merge_layer(&mut grains, cached_grains);
                }
            }
            if self.options.use_cached_pillar && self.options.with_pillar {
                if let Some(cached_pillar) = cached.get("pillar") {
                    merge_layer(&mut pillar, cached_pillar);
                }
            }
        }

        merge_layer(&mut grains, &self.record.grains);
        if self.options.with_pillar {
            merge_layer(&mut pillar, &self.record.pillar);
        }

        let driver = self
            .record
            .proxytype()
            .unwrap_or(self.options.default_driver.as_str())
            .to_string();

        TargetContext {
            target_id: self.unit.target_id.clone(),
            driver,
            static_attributes: self.record.static_attributes.clone(),
            grains,
            pillar,
            delimiter: self.options.delimiter.clone(),
        }
    }

    async fn fetch_cache(&self) -> Option<Value> {
        if !self.options.use_cached_grains && !self.options.use_cached_pillar {
            return None;
        }
        let cache = self.services.cache.as_ref()?;
        match cache.fetch(&cache_bank(&self.unit.target_id), CACHE_DATA_KEY).await {
            Ok(data) => data,
            Err(e) => {
                warn!("[{}] failed to read cache: {}", self.unit.target_id, e);
                None
            }
        }
    }

    async fn connect_and_invoke(
        &mut self,
        context: &mut TargetContext,
    ) -> Result<OperationOutput, WorkerError> {
        let operation = self
            .services
            .operations
            .get(&self.unit.operation)
            .ok_or_else(|| WorkerError::OperationNotAvailable(self.unit.operation.clone()))?;

        let mut session = if self.options.no_connect {
            self.transition(WorkerState::ConnectionSkipped);
            if operation.requires_connection() {
                return Err(WorkerError::ConnectionRequired(self.unit.operation.clone()));
            }
            None
        } else {
            let driver = self
                .services
                .drivers
                .get(&context.driver)
                .ok_or_else(|| WorkerError::UnknownDriver(context.driver.clone()))?;
            let mut session = driver.connect(context).await?;
            self.transition(WorkerState::Connected);

            if self.options.with_grains {
                match session.collect_grains().await {
                    Ok(live) => merge_layer(&mut context.grains, &live),
                    Err(e) => warn!("[{}] failed to collect grains: {}", context.target_id, e),
                }
            }
            Some(session)
        };

        self.transition(WorkerState::Executing);
        let outcome = operation
            .invoke(Invocation {
                context: &*context,
                args: &self.unit.args,
                kwargs: &self.unit.kwargs,
                session: session.as_deref_mut(),
            })
            .await;

        let executed = match &outcome {
            Ok(output) if output.exit_code == 0 => WorkerState::Succeeded,
            _ => WorkerState::Failed,
        };
        self.transition(executed);

        if let Some(session) = session.as_mut() {
            self.close_session(session.as_mut()).await;
        }

        outcome
    }

    /// 只有真正建立过连接才会调用
    async fn close_session(&mut self, session: &mut dyn Session) {
        if let Err(e) = session.close().await {
            warn!("[{}] failed to close session: {}", self.unit.target_id, e);
        }
        self.transition(WorkerState::Disconnected);
    }

    async fn write_back_cache(&self, context: &TargetContext) {
        if !self.options.cache_grains && !self.options.cache_pillar {
            return;
        }
        let Some(cache) = self.services.cache.as_ref() else {
            return;
        };

        let bank = cache_bank(&self.unit.target_id);
        let mut data = match cache.fetch(&bank, CACHE_DATA_KEY).await {
            Ok(Some(Value::Object(existing))) => existing,
            _ => Map::new(),
        };
        if self.options.cache_grains {
            data.insert("grains".to_string(), context.grains.clone());
        }
        if self.options.cache_pillar {
            data.insert("pillar".to_string(), context.pillar.clone());
        }

        if let Err(e) = cache.store(&bank, CACHE_DATA_KEY, &Value::Object(data)).await {
            warn!("[{}] failed to write cache: {}", self.unit.target_id, e);
        }
    }

    async fn forward_to_returner(&self, result: &ExecutionResult) {
        let Some(returner) = self.services.returner.as_ref() else {
            return;
        };
        let record = ReturnRecord::new(&self.unit.jid, &self.unit.operation, result);
        if let Err(e) = returner.save(&record).await {
            warn!(
                "[{}] returner '{}' failed: {}",
                self.unit.target_id,
                returner.name(),
                e
            );
        }
    }
}

/// 叠加一层属性；值为 null 的层不遮盖下层
fn merge_layer(base: &mut Value, layer: &Value) {
    if !layer.is_null() {
        merge_values(base, layer);
    }
}

/// 便捷入口：构建并运行一个 worker
pub async fn run_unit(
    unit: ExecutionUnit,
    record: TargetRecord,
    options: Arc<WorkerOptions>,
    services: WorkerServices,
) -> ExecutionResult {
    Worker::new(unit, record, options, services).run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::execution::Classification;
    use crate::plugins::cache::MemoryCache;
    use crate::utils::constants::exit_codes;
    use serde_json::json;

    fn dummy_record() -> TargetRecord {
        let mut attrs = Map::new();
        attrs.insert("proxy".to_string(), json!({"proxytype": "dummy"}));
        TargetRecord::new()
            .with_static_attributes(attrs)
            .with_grains(json!({"role": "edge"}))
    }

    fn worker(operation: &str, args: Vec<Value>, options: WorkerOptions, services: WorkerServices) -> Worker {
        Worker::new(
            ExecutionUnit::new("r1", operation).with_args(args),
            dummy_record(),
            Arc::new(options),
            services,
        )
    }

    #[tokio::test]
    async fn test_successful_run_passes_every_state() {
        let mut worker = worker("test.ping", vec![], WorkerOptions::default(), WorkerServices::default());
        let result = worker.run().await;

        assert_eq!(result.classification, Classification::Success);
        assert_eq!(result.value, json!(true));
        assert_eq!(
            worker.history(),
            &[
                WorkerState::Created,
                WorkerState::ContextBuilt,
                WorkerState::Connected,
                WorkerState::Executing,
                WorkerState::Succeeded,
                WorkerState::Disconnected,
                WorkerState::Terminal,
            ]
        );
    }

    #[tokio::test]
    async fn test_live_grains_merge_over_inventory() {
        let mut worker = worker(
            "grains.items",
            vec![],
            WorkerOptions::default(),
            WorkerServices::default(),
        );
        let result = worker.run().await;
        assert_eq!(result.value["role"], json!("edge"));
        assert_eq!(result.value["proxytype"], json!("dummy"));
    }

    #[tokio::test]
    async fn test_no_connect_skips_session() {
        let options = WorkerOptions {
            no_connect: true,
            ..Default::default()
        };
        let mut ok = worker("grains.get", vec![json!("role")], options.clone(), WorkerServices::default());
        assert_eq!(ok.run().await.value, json!("edge"));
        assert!(ok.history().contains(&WorkerState::ConnectionSkipped));
        assert!(!ok.history().contains(&WorkerState::Disconnected));

        let mut needs_conn = worker("cmd.run", vec![json!("uptime")], options, WorkerServices::default());
        let result = needs_conn.run().await;
        assert_eq!(result.classification, Classification::ApplicationError);
    }

    #[tokio::test]
    async fn test_errors_are_classified() {
        let mut missing = worker("state.apply", vec![], WorkerOptions::default(), WorkerServices::default());
        let result = missing.run().await;
        assert_eq!(result.classification, Classification::ApplicationError);
        assert_eq!(result.value, json!("'state.apply' is not available"));

        let mut raised = worker("test.exception", vec![json!("boom")], WorkerOptions::default(), WorkerServices::default());
        let result = raised.run().await;
        assert_eq!(result.exit_code, exit_codes::EX_GENERIC);
        assert!(raised.history().contains(&WorkerState::Disconnected));

        let mut attrs = Map::new();
        attrs.insert("proxy".to_string(), json!({"proxytype": "dummy", "fail_connect": true}));
        let mut unreachable = Worker::new(
            ExecutionUnit::new("r2", "test.ping"),
            TargetRecord::new().with_static_attributes(attrs),
            Arc::new(WorkerOptions::default()),
            WorkerServices::default(),
        );
        let result = unreachable.run().await;
        assert_eq!(result.classification, Classification::Unreachable);
        assert_eq!(result.exit_code, exit_codes::EX_UNAVAILABLE);
        assert!(!unreachable.history().contains(&WorkerState::Disconnected));

        let mut unknown_driver = Worker::new(
            ExecutionUnit::new("r3", "test.ping"),
            TargetRecord::new(),
            Arc::new(WorkerOptions {
                default_driver: "netconf".to_string(),
                ..Default::default()
            }),
            WorkerServices::default(),
        );
        assert_eq!(unknown_driver.run().await.classification, Classification::Unreachable);
    }

    #[tokio::test]
    async fn test_defaults_sit_under_cache_and_inventory() {
        let cache = Arc::new(MemoryCache::new());
        cache
            .store(
                &cache_bank("r1"),
                CACHE_DATA_KEY,
                &json!({"grains": {"model": "mx480", "role": "core"}, "pillar": {"ntp": "cached"}}),
            )
            .await
            .unwrap();

        let services = WorkerServices {
            cache: Some(cache as Arc<dyn CacheStore>),
            ..Default::default()
        };
        let options = WorkerOptions {
            default_grains: json!({"vendor": "acme", "model": "generic", "role": "unknown"}),
            default_pillar: json!({"ntp": "default", "syslog": "10.0.0.9"}),
            ..Default::default()
        };

        let grains = worker("grains.items", vec![], options.clone(), services.clone()).run().await;
        assert_eq!(grains.value["vendor"], json!("acme"));
        assert_eq!(grains.value["model"], json!("mx480"));
        assert_eq!(grains.value["role"], json!("edge"));

        let pillar = worker("pillar.items", vec![], options, services).run().await;
        assert_eq!(pillar.value["ntp"], json!("cached"));
        assert_eq!(pillar.value["syslog"], json!("10.0.0.9"));
    }

    #[tokio::test]
    async fn test_null_inventory_grains_keep_lower_layers() {
        let cache = Arc::new(MemoryCache::new());
        cache
            .store(&cache_bank("r4"), CACHE_DATA_KEY, &json!({"grains": {"model": "mx480"}}))
            .await
            .unwrap();

        let mut attrs = Map::new();
        attrs.insert("proxy".to_string(), json!({"proxytype": "dummy"}));
        let mut worker = Worker::new(
            ExecutionUnit::new("r4", "grains.items"),
            TargetRecord::new()
                .with_static_attributes(attrs)
                .with_grains(Value::Null)
                .with_pillar(Value::Null),
            Arc::new(WorkerOptions {
                default_grains: json!({"vendor": "acme"}),
                ..Default::default()
            }),
            WorkerServices {
                cache: Some(cache as Arc<dyn CacheStore>),
                ..Default::default()
            },
        );

        let result = worker.run().await;
        assert_eq!(result.classification, Classification::Success);
        assert_eq!(result.value["vendor"], json!("acme"));
        assert_eq!(result.value["model"], json!("mx480"));
    }

    #[tokio::test]
    async fn test_cache_read_and_write_back() {
        let cache = Arc::new(MemoryCache::new());
        cache
            .store(&cache_bank("r1"), CACHE_DATA_KEY, &json!({"grains": {"model": "mx480", "role": "core"}}))
            .await
            .unwrap();

        let services = WorkerServices {
            cache: Some(cache.clone() as Arc<dyn CacheStore>),
            ..Default::default()
        };
        let options = WorkerOptions {
            cache_grains: true,
            ..Default::default()
        };

        let mut worker = worker("grains.items", vec![], options, services);
        let result = worker.run().await;
        // inventory 覆盖缓存，缓存补充 inventory 缺失的键
        assert_eq!(result.value["role"], json!("edge"));
        assert_eq!(result.value["model"], json!("mx480"));

        let stored = cache.fetch(&cache_bank("r1"), CACHE_DATA_KEY).await.unwrap().unwrap();
        assert_eq!(stored["grains"]["proxytype"], json!("dummy"));
    }
}
