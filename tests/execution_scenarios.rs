// ============================================================================
// SProx - 执行场景测试
// ============================================================================

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sprox::core::bridge::{BridgeEvent, BridgeRequest, LongLivedBridge};
use sprox::core::executor::{ExecuteOptions, Executor, RunOutcome, RunRequest};
use sprox::core::registry::{Invocation, Operation, OperationOutput, OperationRegistry};
use sprox::core::reporter::ResultSink;
use sprox::core::worker::{WorkerError, WorkerOptions, WorkerServices};
use sprox::models::execution::{BatchSize, Classification, ExecutionResult};
use sprox::models::pool::{Pool, TargetRecord};

/// 记录输出调用的 sink
#[derive(Clone, Default)]
struct Recording {
    emitted: Arc<Mutex<Vec<String>>>,
    ticks: Arc<Mutex<usize>>,
    finished: Arc<Mutex<usize>>,
}

impl ResultSink for Recording {
    fn tick(&mut self, _result: &ExecutionResult) {
        *self.ticks.lock().unwrap() += 1;
    }

    fn emit(&mut self, result: &ExecutionResult) {
        self.emitted.lock().unwrap().push(result.target_id.clone());
    }

    fn finish(&mut self) {
        *self.finished.lock().unwrap() += 1;
    }
}

/// 指定目标返回应用错误，其余目标短暂等待后成功
struct FailOn(&'static str);

#[async_trait]
impl Operation for FailOn {
    async fn invoke(&self, invocation: Invocation<'_>) -> Result<OperationOutput, WorkerError> {
        if invocation.context.target_id == self.0 {
            return Err(WorkerError::Application("configuration rejected".to_string()));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(OperationOutput::ok(json!(true)))
    }
}

/// 指定目标长时间挂起
struct HangOn(&'static str);

#[async_trait]
impl Operation for HangOn {
    async fn invoke(&self, invocation: Invocation<'_>) -> Result<OperationOutput, WorkerError> {
        if invocation.context.target_id == self.0 {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Ok(OperationOutput::ok(json!("done")))
    }
}

/// 接收 `lp-` 前缀目标的常驻桥接
struct PrefixBridge {
    requested: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl LongLivedBridge for PrefixBridge {
    async fn accepted(&self, targets: &[String]) -> HashSet<String> {
        targets.iter().filter(|id| id.starts_with("lp-")).cloned().collect()
    }

    fn run_batch(&self, request: BridgeRequest) -> BoxStream<'static, BridgeEvent> {
        self.requested.lock().unwrap().extend(request.targets.iter().cloned());
        let mut events: Vec<BridgeEvent> = request
            .targets
            .iter()
            .map(|id| BridgeEvent::Reply(ExecutionResult::success(id.clone(), json!({"via": "bridge"}))))
            .collect();
        events.push(BridgeEvent::Done {
            exit_code: 0,
            unresponsive: Vec::new(),
        });
        stream::iter(events).boxed()
    }
}

fn dummy_pool(ids: &[&str]) -> Pool {
    let mut attrs = Map::new();
    attrs.insert("proxy".to_string(), json!({"proxytype": "dummy"}));
    ids.iter()
        .map(|id| {
            (
                id.to_string(),
                TargetRecord::new().with_static_attributes(attrs.clone()),
            )
        })
        .collect()
}

fn services_with(name: &str, operation: impl Operation + 'static) -> WorkerServices {
    let mut operations = OperationRegistry::builtin();
    operations.register(name, operation);
    WorkerServices {
        operations: Arc::new(operations),
        ..Default::default()
    }
}

async fn execute(
    executor: &Executor,
    pool: &Pool,
    operation: &str,
    options: ExecuteOptions,
    sink: Recording,
) -> RunOutcome {
    executor
        .execute(pool, &RunRequest::new(operation), &options, Box::new(sink))
        .await
}

fn classes(outcome: &RunOutcome) -> BTreeMap<String, Classification> {
    outcome
        .results
        .iter()
        .map(|(id, result)| (id.clone(), result.classification))
        .collect()
}

#[tokio::test]
async fn failhard_aborts_targets_not_yet_started() {
    let pool = dummy_pool(&["h1", "h2", "h3", "h4", "h5"]);
    let executor = Executor::new(services_with("net.load_config", FailOn("h2")), WorkerOptions::default());

    let outcome = execute(
        &executor,
        &pool,
        "net.load_config",
        ExecuteOptions {
            batch_size: BatchSize::Absolute(1),
            failhard: true,
            ..Default::default()
        },
        Recording::default(),
    )
    .await;

    let classes = classes(&outcome);
    assert_eq!(classes["h1"], Classification::Success);
    assert_eq!(classes["h2"], Classification::ApplicationError);
    for id in ["h3", "h4", "h5"] {
        assert_eq!(classes[id], Classification::Aborted);
    }
    assert_eq!(outcome.summary.failed, vec!["h2".to_string()]);
    assert_eq!(outcome.summary.aborted.len(), 3);
    assert_eq!(outcome.exit_code(), 1);
}

#[tokio::test]
async fn hung_target_times_out_without_blocking_others() {
    let pool = dummy_pool(&["fast1", "slow", "fast2", "fast3"]);
    let executor = Executor::new(services_with("net.cli", HangOn("slow")), WorkerOptions::default());
    let sink = Recording::default();

    let started = Instant::now();
    let outcome = execute(
        &executor,
        &pool,
        "net.cli",
        ExecuteOptions {
            batch_size: BatchSize::Absolute(2),
            timeout: Some(Duration::from_millis(200)),
            ..Default::default()
        },
        sink.clone(),
    )
    .await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(outcome.summary.timed_out, vec!["slow".to_string()]);
    assert_eq!(outcome.summary.returned(), 3);
    assert_eq!(outcome.exit_code(), 69);
    assert_eq!(outcome.results["slow"].value, json!("Minion did not respond. No job will be sent."));
    assert_eq!(sink.emitted.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn hidden_timeouts_still_set_exit_code() {
    let pool = dummy_pool(&["slow", "fast"]);
    let executor = Executor::new(services_with("net.cli", HangOn("slow")), WorkerOptions::default());
    let sink = Recording::default();

    let outcome = execute(
        &executor,
        &pool,
        "net.cli",
        ExecuteOptions {
            timeout: Some(Duration::from_millis(100)),
            hide_timeout: true,
            ..Default::default()
        },
        sink.clone(),
    )
    .await;

    assert_eq!(*sink.emitted.lock().unwrap(), vec!["fast".to_string()]);
    assert!(!outcome.results.contains_key("slow"));
    assert_eq!(outcome.summary.timed_out, vec!["slow".to_string()]);
    assert_eq!(outcome.exit_code(), 69);
}

#[tokio::test]
async fn both_paths_share_one_stream_and_one_sentinel() {
    let pool = dummy_pool(&["lp-1", "eph-1", "lp-2", "eph-2", "eph-3"]);
    let requested = Arc::new(Mutex::new(Vec::new()));
    let executor = Executor::new(WorkerServices::default(), WorkerOptions::default()).with_bridge(Arc::new(
        PrefixBridge {
            requested: Arc::clone(&requested),
        },
    ));
    let sink = Recording::default();

    let outcome = execute(
        &executor,
        &pool,
        "test.ping",
        ExecuteOptions {
            batch_size: BatchSize::Absolute(4),
            use_existing_proxy: true,
            ..Default::default()
        },
        sink.clone(),
    )
    .await;

    assert_eq!(*requested.lock().unwrap(), vec!["lp-1".to_string(), "lp-2".to_string()]);
    assert_eq!(outcome.results.len(), 5);
    assert_eq!(outcome.results["lp-1"].value, json!({"via": "bridge"}));
    assert_eq!(outcome.results["eph-2"].value, json!(true));
    assert_eq!(*sink.ticks.lock().unwrap(), 5);
    assert_eq!(*sink.finished.lock().unwrap(), 1);
    assert_eq!(outcome.exit_code(), 0);
}

#[tokio::test]
async fn bridge_is_skipped_unless_requested() {
    let pool = dummy_pool(&["lp-1", "eph-1"]);
    let requested = Arc::new(Mutex::new(Vec::new()));
    let executor = Executor::new(WorkerServices::default(), WorkerOptions::default()).with_bridge(Arc::new(
        PrefixBridge {
            requested: Arc::clone(&requested),
        },
    ));

    let outcome = execute(&executor, &pool, "test.ping", ExecuteOptions::default(), Recording::default()).await;

    assert!(requested.lock().unwrap().is_empty());
    assert_eq!(outcome.results["lp-1"].value, json!(true));
}

#[tokio::test]
async fn unreachable_and_missing_operations_are_classified() {
    let mut attrs = Map::new();
    attrs.insert("proxy".to_string(), json!({"proxytype": "dummy", "fail_connect": true}));
    let mut pool = dummy_pool(&["ok"]);
    pool.insert("down", TargetRecord::new().with_static_attributes(attrs));

    let executor = Executor::new(WorkerServices::default(), WorkerOptions::default());
    let outcome = execute(&executor, &pool, "test.ping", ExecuteOptions::default(), Recording::default()).await;
    assert_eq!(outcome.results["down"].classification, Classification::Unreachable);
    assert_eq!(outcome.summary.unreachable, vec!["down".to_string()]);
    assert_eq!(outcome.exit_code(), 69);

    let missing = execute(&executor, &pool, "nope.op", ExecuteOptions::default(), Recording::default()).await;
    assert_eq!(missing.results["ok"].classification, Classification::ApplicationError);
    assert_eq!(missing.results["ok"].value, Value::String("'nope.op' is not available".to_string()));
}

#[tokio::test]
async fn static_mode_emits_everything_once() {
    let pool = dummy_pool(&["c", "a", "b"]);
    let executor = Executor::new(WorkerServices::default(), WorkerOptions::default());
    let sink = Recording::default();

    execute(
        &executor,
        &pool,
        "test.ping",
        ExecuteOptions {
            static_output: true,
            ..Default::default()
        },
        sink.clone(),
    )
    .await;

    assert_eq!(
        *sink.emitted.lock().unwrap(),
        vec!["a".to_string(), "b".to_string(), "c".to_string()]
    );
}
