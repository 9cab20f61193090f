// ============================================================================
// SProx - CLI Run 命令
// ============================================================================
//
// 文件: src/cli/run.rs
// 职责: 目标执行命令的 CLI 接口层
// 边界:
//   - ✅ 命令行参数定义和解析
//   - ✅ 由配置组装 inventory、解析器、执行器与输出
//   - ✅ 调用核心执行器并返回退出码
//   - ❌ 不应包含表达式求值逻辑
//   - ❌ 不应包含调度逻辑
//
// ============================================================================

use anyhow::Result;
use clap::{ArgGroup, Args};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::core::executor::{ExecuteOptions, Executor, RunRequest};
use crate::core::resolver::{CacheOverlay, CachedInventory, InventoryProvider, ResolveOptions, Resolver};
use crate::core::worker::{WorkerOptions, WorkerServices};
use crate::models::config::{Config, RuntimeArgs};
use crate::models::execution::BatchSize;
use crate::models::target::{ExpressionType, TargetExpression};
use crate::plugins::cache::{CacheStore, JsonFileCache};
use crate::plugins::events::LogEventSink;
use crate::plugins::returner::{returner_by_name, Returner};
use crate::plugins::roster::{DirectTargets, FileRoster};
use crate::ui::output::{ConsoleSink, Outputter};
use crate::ui::progress::target_progress;
use crate::ui::summary::render_run_summary;
use crate::utils::constants::exit_codes;
use crate::utils::logger::Logger;
use crate::{t, tf};

/// 执行命令参数
#[derive(Debug, Args)]
#[command(group(ArgGroup::new("tgt_type").multiple(false)))]
pub struct RunArgs {
    /// 目标表达式
    pub tgt: String,

    /// 要执行的函数（如 test.ping）
    pub fun: Option<String>,

    /// 函数参数；key=value 形式作为关键字参数
    pub args: Vec<String>,

    /// 按正则匹配目标 ID
    #[arg(short = 'E', long, group = "tgt_type")]
    pub pcre: bool,

    /// 逗号分隔的目标 ID 列表
    #[arg(short = 'L', long, group = "tgt_type")]
    pub list: bool,

    /// 按 grain 匹配（path:value）
    #[arg(short = 'G', long, group = "tgt_type")]
    pub grain: bool,

    /// 按 grain 正则匹配
    #[arg(short = 'P', long, group = "tgt_type")]
    pub grain_pcre: bool,

    /// 按 pillar 匹配
    #[arg(short = 'I', long, group = "tgt_type")]
    pub pillar: bool,

    /// 按 pillar 正则匹配
    #[arg(short = 'J', long, group = "tgt_type")]
    pub pillar_pcre: bool,

    /// 节点组名称
    #[arg(short = 'N', long, group = "tgt_type")]
    pub nodegroup: bool,

    /// 复合表达式
    #[arg(short = 'C', long, group = "tgt_type")]
    pub compound: bool,

    /// 属性路径分隔符
    #[arg(short = 'd', long)]
    pub delimiter: Option<String>,

    /// roster 文件
    #[arg(short = 'r', long)]
    pub roster_file: Option<String>,

    /// 批次大小（数量或百分比，如 10 / 25%）
    #[arg(short = 'b', long)]
    pub batch_size: Option<BatchSize>,

    /// 槽位释放前的等待秒数
    #[arg(long)]
    pub batch_wait: Option<f64>,

    /// 单个目标超时秒数（0 = 不限制）
    #[arg(short = 't', long)]
    pub timeout: Option<u64>,

    /// 收集全部结果后一次性输出
    #[arg(short = 's', long = "static")]
    pub static_output: bool,

    /// 首个失败即中止
    #[arg(long)]
    pub failhard: bool,

    /// 不输出超时目标
    #[arg(long)]
    pub hide_timeout: bool,

    /// 发布生命周期事件
    #[arg(long)]
    pub events: bool,

    /// 显示进度条
    #[arg(short = 'p', long)]
    pub progress: bool,

    /// 显示运行汇总
    #[arg(long)]
    pub summary: bool,

    /// 不建立连接，只使用已有属性
    #[arg(long)]
    pub no_connect: bool,

    /// 优先交给已运行的常驻 worker
    #[arg(long)]
    pub use_existing_proxy: bool,

    /// 执行后缓存 grains
    #[arg(long)]
    pub cache_grains: bool,

    /// 执行后缓存 pillar
    #[arg(long)]
    pub cache_pillar: bool,

    /// 忽略缓存的 grains
    #[arg(long)]
    pub no_cached_grains: bool,

    /// 忽略缓存的 pillar
    #[arg(long)]
    pub no_cached_pillar: bool,

    /// 不收集 grains
    #[arg(long)]
    pub no_grains: bool,

    /// 不加载 pillar
    #[arg(long)]
    pub no_pillar: bool,

    /// 结果转发（log, jsonl）
    #[arg(long)]
    pub returner: Option<String>,

    /// 默认 grains（YAML/JSON 映射），优先级最低
    #[arg(long, value_name = "MAPPING", value_parser = parse_mapping)]
    pub default_grains: Option<Map<String, Value>>,

    /// 默认 pillar（YAML/JSON 映射），优先级最低
    #[arg(long, value_name = "MAPPING", value_parser = parse_mapping)]
    pub default_pillar: Option<Map<String, Value>>,

    /// 输出格式（nested, json, yaml, raw）
    #[arg(long = "out")]
    pub out: Option<String>,

    /// 只列出匹配的目标，不执行
    #[arg(long)]
    pub preview_target: bool,
}

impl RunArgs {
    /// 由目标类型开关得到表达式类型（默认 glob）
    pub fn expression_type(&self) -> ExpressionType {
        let flags = [
            (self.pcre, ExpressionType::Pcre),
            (self.list, ExpressionType::List),
            (self.grain, ExpressionType::Grain),
            (self.grain_pcre, ExpressionType::GrainPcre),
            (self.pillar, ExpressionType::Pillar),
            (self.pillar_pcre, ExpressionType::PillarPcre),
            (self.nodegroup, ExpressionType::Nodegroup),
            (self.compound, ExpressionType::Compound),
        ];
        flags
            .into_iter()
            .find_map(|(set, kind)| set.then_some(kind))
            .unwrap_or_default()
    }

    /// 命令参数转换为配置覆盖
    fn runtime_args(&self) -> RuntimeArgs {
        let flag = |set: bool| if set { Some(true) } else { None };
        let negated = |set: bool| if set { Some(false) } else { None };
        RuntimeArgs {
            roster_file: self.roster_file.clone(),
            delimiter: self.delimiter.clone(),
            batch_size: self.batch_size,
            batch_wait: self.batch_wait,
            timeout: self.timeout,
            failhard: flag(self.failhard),
            static_output: flag(self.static_output),
            hide_timeout: flag(self.hide_timeout),
            events: flag(self.events),
            show_progress: flag(self.progress),
            summary: flag(self.summary),
            format: self.out.clone(),
            use_existing_proxy: flag(self.use_existing_proxy),
            no_connect: flag(self.no_connect),
            with_grains: negated(self.no_grains),
            with_pillar: negated(self.no_pillar),
            cache_grains: flag(self.cache_grains),
            cache_pillar: flag(self.cache_pillar),
            use_cached_grains: negated(self.no_cached_grains),
            use_cached_pillar: negated(self.no_cached_pillar),
            returner: self.returner.clone(),
            default_grains: self.default_grains.clone(),
            default_pillar: self.default_pillar.clone(),
            ..Default::default()
        }
    }
}

/// 拆分函数参数：`key=value` 为关键字参数，其余为位置参数
///
/// 每个值按 YAML 解析为 JSON 值，无法解析时保留为字符串。
pub fn parse_call_args(raw: &[String]) -> (Vec<Value>, Map<String, Value>) {
    let mut args = Vec::new();
    let mut kwargs = Map::new();
    for item in raw {
        match item.split_once('=') {
            Some((key, value)) if is_kwarg_key(key) => {
                kwargs.insert(key.to_string(), parse_value(value));
            }
            _ => args.push(parse_value(item)),
        }
    }
    (args, kwargs)
}

fn is_kwarg_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_value(text: &str) -> Value {
    if text.is_empty() {
        return Value::String(String::new());
    }
    serde_yaml::from_str::<serde_yaml::Value>(text)
        .ok()
        .and_then(|yaml| serde_json::to_value(yaml).ok())
        .unwrap_or_else(|| Value::String(text.to_string()))
}

/// 解析 `--default-grains` / `--default-pillar` 的映射参数
fn parse_mapping(text: &str) -> Result<Map<String, Value>, String> {
    match parse_value(text) {
        Value::Object(map) => Ok(map),
        _ => Err(format!("expected a YAML or JSON mapping, got: {}", text)),
    }
}

/// 秒数转为时长：负数与 NaN 视为 0，超出范围视为无限等待
fn seconds(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}

/// 处理执行命令
pub async fn run(args: RunArgs) -> Result<i32> {
    Config::merge_runtime_args(args.runtime_args())?;
    let config = Config::snapshot()?;
    let kind = args.expression_type();

    if args.fun.is_none() && !args.preview_target {
        Logger::error(t!("run.no_function"));
        return Ok(exit_codes::EX_GENERIC);
    }

    let cache_dir = Path::new(&config.inventory.cache_dir);
    let cache: Arc<dyn CacheStore> = Arc::new(JsonFileCache::new(cache_dir));
    let roster: Arc<dyn InventoryProvider> = match &config.inventory.roster_file {
        Some(path) => Arc::new(FileRoster::new(path)),
        None => Arc::new(DirectTargets),
    };
    let inventory = CachedInventory::new(
        roster,
        Arc::clone(&cache),
        CacheOverlay {
            use_cached_grains: config.execution.use_cached_grains,
            use_cached_pillar: config.execution.use_cached_pillar,
        },
    );
    let resolver = Resolver::new(ResolveOptions {
        delimiter: config.inventory.delimiter.clone(),
        nodegroups: config.inventory.nodegroups.clone(),
    });

    let expression = TargetExpression::from(args.tgt.as_str());
    let targets = match inventory.targets(&expression, kind, &resolver).await {
        Ok(targets) => targets,
        Err(e) => {
            Logger::error(tf!("run.inventory_failed", e));
            return Ok(exit_codes::EX_GENERIC);
        }
    };

    if args.preview_target {
        Logger::info(tf!("run.preview_header", args.tgt, kind));
        for id in targets.ids() {
            println!("- {}", id);
        }
        return Ok(exit_codes::EX_OK);
    }

    let Some(fun) = args.fun.as_deref() else {
        Logger::error(t!("run.no_function"));
        return Ok(exit_codes::EX_GENERIC);
    };

    if targets.is_empty() {
        Logger::warn(t!("run.no_match"));
        return Ok(exit_codes::EX_OK);
    }

    let returner: Option<Arc<dyn Returner>> = match &config.execution.returner {
        Some(name) => match returner_by_name(name, cache_dir) {
            Ok(returner) => Some(returner),
            Err(e) => {
                Logger::warn(tf!("run.returner_unavailable", e));
                None
            }
        },
        None => None,
    };

    let services = WorkerServices {
        cache: Some(cache),
        returner,
        ..Default::default()
    };
    let worker_options = WorkerOptions {
        no_connect: config.execution.no_connect,
        with_grains: config.execution.with_grains,
        with_pillar: config.execution.with_pillar,
        use_cached_grains: config.execution.use_cached_grains,
        use_cached_pillar: config.execution.use_cached_pillar,
        cache_grains: config.execution.cache_grains,
        cache_pillar: config.execution.cache_pillar,
        default_driver: config.inventory.default_driver.clone(),
        delimiter: config.inventory.delimiter.clone(),
        default_grains: Value::Object(config.execution.default_grains.clone()),
        default_pillar: Value::Object(config.execution.default_pillar.clone()),
    };

    let mut executor = Executor::new(services, worker_options);
    if config.execution.events {
        executor = executor.with_events(Arc::new(LogEventSink));
    }
    if config.execution.use_existing_proxy {
        Logger::warn(t!("run.no_existing_proxy"));
    }

    let options = ExecuteOptions {
        batch_size: config.execution.batch_size,
        batch_wait: seconds(config.execution.batch_wait),
        timeout: match config.execution.timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        },
        static_output: config.execution.static_output,
        failhard: config.execution.failhard,
        hide_timeout: config.execution.hide_timeout,
        events: config.execution.events,
        use_existing_proxy: config.execution.use_existing_proxy,
    };

    let outputter = config.output.format.parse::<Outputter>().unwrap_or_else(|e| {
        Logger::warn(&e);
        Outputter::default()
    });
    let progress = if config.output.show_progress {
        target_progress(targets.len())
    } else {
        None
    };
    let sink = ConsoleSink::new(outputter).with_progress(progress);

    let (call_args, call_kwargs) = parse_call_args(&args.args);
    debug!("Call arguments: {:?} {:?}", call_args, call_kwargs);
    let request = RunRequest::new(fun).with_args(call_args).with_kwargs(call_kwargs);

    if config.output.verbose {
        Logger::info(tf!(
            "run.start",
            fun,
            targets.len(),
            options.batch_size.resolve(targets.len())
        ));
    }

    let started = Instant::now();
    let outcome = executor.execute(&targets, &request, &options, Box::new(sink)).await;

    if config.output.summary {
        render_run_summary(
            &outcome.jid,
            &outcome.summary,
            Some(started.elapsed()),
            config.output.verbose,
        );
    }

    Ok(outcome.exit_code())
}
