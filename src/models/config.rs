// ============================================================================
// SProx - 配置数据模型
// ============================================================================
//
// 文件: src/models/config.rs
// 职责: 配置文件数据结构定义和操作
// 边界:
//   - ✅ 配置文件数据结构定义
//   - ✅ 配置序列化/反序列化
//   - ✅ 配置默认值
//   - ✅ 配置文件读写操作
//   - ✅ CLI 运行时参数合并
//   - ❌ 不应包含配置应用逻辑（引擎只接收显式的选项结构）
//   - ❌ 不应包含 CLI 参数定义
//
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::models::execution::BatchSize;
use crate::utils::constants::{DEFAULT_CACHE_DIR, DEFAULT_ROSTER_FILE};

/// 默认模板的说明注释
const TEMPLATE_HEADER: &str = "\
# sprox configuration
#
# inventory.roster_file   YAML roster: <id> -> { grains, pillar, proxy, ... }
# inventory.nodegroups    name = \"<compound expression>\", used with -N or N@name
# execution.batch_size    concurrent targets, a count (10) or a percentage (\"25%\")
# execution.timeout       seconds per target, 0 waits indefinitely
# execution.default_grains / execution.default_pillar
#                         lowest-precedence attributes, under cache and roster values
# output.format           nested | json | yaml | raw
# i18n.language           en_us | zh_cn

";

/// 全局配置管理器
static GLOBAL_CONFIG: std::sync::OnceLock<Arc<RwLock<Config>>> = std::sync::OnceLock::new();

/// SProx 配置文件结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// inventory 配置
    #[serde(default)]
    pub inventory: InventoryConfig,
    /// 执行配置
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// 输出配置
    #[serde(default)]
    pub output: OutputConfig,
    /// 国际化配置
    #[serde(default)]
    pub i18n: I18nConfig,
}

/// inventory 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// roster 文件路径（为空表示不使用 roster）
    #[serde(default)]
    pub roster_file: Option<String>,
    /// 属性路径分隔符
    #[serde(default = "Config::default_delimiter")]
    pub delimiter: String,
    /// 目标未声明 proxytype 时使用的驱动
    #[serde(default = "Config::default_driver")]
    pub default_driver: String,
    /// 缓存目录
    #[serde(default = "Config::default_cache_dir")]
    pub cache_dir: String,
    /// 节点组：名称 -> 复合表达式
    #[serde(default)]
    pub nodegroups: BTreeMap<String, String>,
}

/// 执行配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// 批次大小（数量或百分比）
    #[serde(default)]
    pub batch_size: BatchSize,
    /// 每个槽位完成后的等待秒数
    #[serde(default)]
    pub batch_wait: f64,
    /// 单个目标超时秒数（0 = 不限制）
    #[serde(default = "Config::default_timeout")]
    pub timeout: u64,
    /// 首个失败即中止整个运行
    #[serde(default)]
    pub failhard: bool,
    /// 收集全部结果后一次性输出
    #[serde(default)]
    pub static_output: bool,
    /// 不输出合成的超时结果
    #[serde(default)]
    pub hide_timeout: bool,
    /// 发布生命周期事件
    #[serde(default)]
    pub events: bool,
    /// 优先使用已运行的常驻 worker
    #[serde(default)]
    pub use_existing_proxy: bool,
    /// 不建立连接，只使用缓存属性
    #[serde(default)]
    pub no_connect: bool,
    /// 连接后收集 grains
    #[serde(default = "Config::default_true")]
    pub with_grains: bool,
    /// 加载 pillar
    #[serde(default = "Config::default_true")]
    pub with_pillar: bool,
    /// 执行后写回 grains 缓存
    #[serde(default)]
    pub cache_grains: bool,
    /// 执行后写回 pillar 缓存
    #[serde(default)]
    pub cache_pillar: bool,
    /// 使用缓存的 grains
    #[serde(default = "Config::default_true")]
    pub use_cached_grains: bool,
    /// 使用缓存的 pillar
    #[serde(default = "Config::default_true")]
    pub use_cached_pillar: bool,
    /// 结果转发目标
    #[serde(default)]
    pub returner: Option<String>,
    /// 请求级默认 grains，优先级低于缓存与 inventory
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub default_grains: Map<String, Value>,
    /// 请求级默认 pillar，优先级低于缓存与 inventory
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub default_pillar: Map<String, Value>,
}

/// 输出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// 是否详细输出
    #[serde(default)]
    pub verbose: bool,
    /// 是否显示运行汇总
    #[serde(default)]
    pub summary: bool,
    /// 是否彩色输出
    #[serde(default = "Config::default_true")]
    pub colored: bool,
    /// 是否显示进度条
    #[serde(default)]
    pub show_progress: bool,
    /// 输出格式 (nested, json, yaml, raw)
    #[serde(default = "Config::default_format")]
    pub format: String,
}

/// 国际化配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct I18nConfig {
    /// 界面语言
    #[serde(default = "Config::default_language")]
    pub language: String,
}

/// CLI 运行时参数（用于覆盖配置文件）
#[derive(Debug, Clone, Default)]
pub struct RuntimeArgs {
    pub verbose: Option<bool>,
    pub colored: Option<bool>,
    pub language: Option<String>,
    pub roster_file: Option<String>,
    pub delimiter: Option<String>,
    pub batch_size: Option<BatchSize>,
    pub batch_wait: Option<f64>,
    pub timeout: Option<u64>,
    pub failhard: Option<bool>,
    pub static_output: Option<bool>,
    pub hide_timeout: Option<bool>,
    pub events: Option<bool>,
    pub show_progress: Option<bool>,
    pub summary: Option<bool>,
    pub format: Option<String>,
    pub use_existing_proxy: Option<bool>,
    pub no_connect: Option<bool>,
    pub with_grains: Option<bool>,
    pub with_pillar: Option<bool>,
    pub cache_grains: Option<bool>,
    pub cache_pillar: Option<bool>,
    pub use_cached_grains: Option<bool>,
    pub use_cached_pillar: Option<bool>,
    pub returner: Option<String>,
    pub default_grains: Option<Map<String, Value>>,
    pub default_pillar: Option<Map<String, Value>>,
}

/// 配置默认值 trait - 不依赖全局配置初始化
pub trait ConfigDefaults {
    fn default_delimiter() -> String {
        ":".to_string()
    }

    fn default_driver() -> String {
        "local".to_string()
    }

    fn default_cache_dir() -> String {
        DEFAULT_CACHE_DIR.to_string()
    }

    /// 默认超时 60 秒
    fn default_timeout() -> u64 {
        60
    }

    fn default_true() -> bool {
        true
    }

    fn default_format() -> String {
        "nested".to_string()
    }

    fn default_language() -> String {
        "en_us".to_string()
    }
}

impl ConfigDefaults for Config {}

/// 读取全局配置的快捷宏
macro_rules! with_global {
    ($config:ident => $body:expr) => {{
        let global_config = GLOBAL_CONFIG
            .get()
            .ok_or_else(|| anyhow::anyhow!("Global config not initialized"))?;
        let $config = global_config
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire config read lock"))?;
        Ok($body)
    }};
}

impl Config {
    /// 初始化全局配置（程序启动时调用）
    pub fn initialize(config_path: &Path) -> anyhow::Result<()> {
        let config = Self::load_config(config_path)?;
        GLOBAL_CONFIG
            .set(Arc::new(RwLock::new(config)))
            .map_err(|_| anyhow::anyhow!("Global config already initialized"))?;
        Ok(())
    }

    /// 加载配置文件；文件不存在时使用默认配置
    pub fn load_config(config_path: &Path) -> anyhow::Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            let config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// 合并运行时参数
    pub fn merge_runtime_args(args: RuntimeArgs) -> anyhow::Result<()> {
        let global_config = GLOBAL_CONFIG
            .get()
            .ok_or_else(|| anyhow::anyhow!("Global config not initialized"))?;

        let mut config = global_config
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire config write lock"))?;

        config.apply_runtime_args(args);
        Ok(())
    }

    /// 将运行时参数覆盖到当前配置
    pub fn apply_runtime_args(&mut self, args: RuntimeArgs) {
        if let Some(verbose) = args.verbose {
            self.output.verbose = verbose;
        }
        if let Some(colored) = args.colored {
            self.output.colored = colored;
        }
        if let Some(language) = args.language {
            self.i18n.language = language;
        }
        if let Some(roster_file) = args.roster_file {
            self.inventory.roster_file = Some(roster_file);
        }
        if let Some(delimiter) = args.delimiter {
            self.inventory.delimiter = delimiter;
        }
        if let Some(batch_size) = args.batch_size {
            self.execution.batch_size = batch_size;
        }
        if let Some(batch_wait) = args.batch_wait {
            self.execution.batch_wait = batch_wait;
        }
        if let Some(timeout) = args.timeout {
            self.execution.timeout = timeout;
        }
        if let Some(failhard) = args.failhard {
            self.execution.failhard = failhard;
        }
        if let Some(static_output) = args.static_output {
            self.execution.static_output = static_output;
        }
        if let Some(hide_timeout) = args.hide_timeout {
            self.execution.hide_timeout = hide_timeout;
        }
        if let Some(events) = args.events {
            self.execution.events = events;
        }
        if let Some(show_progress) = args.show_progress {
            self.output.show_progress = show_progress;
        }
        if let Some(summary) = args.summary {
            self.output.summary = summary;
        }
        if let Some(format) = args.format {
            self.output.format = format;
        }
        if let Some(use_existing_proxy) = args.use_existing_proxy {
            self.execution.use_existing_proxy = use_existing_proxy;
        }
        if let Some(no_connect) = args.no_connect {
            self.execution.no_connect = no_connect;
        }
        if let Some(with_grains) = args.with_grains {
            self.execution.with_grains = with_grains;
        }
        if let Some(with_pillar) = args.with_pillar {
            self.execution.with_pillar = with_pillar;
        }
        if let Some(cache_grains) = args.cache_grains {
            self.execution.cache_grains = cache_grains;
        }
        if let Some(cache_pillar) = args.cache_pillar {
            self.execution.cache_pillar = cache_pillar;
        }
        if let Some(use_cached_grains) = args.use_cached_grains {
            self.execution.use_cached_grains = use_cached_grains;
        }
        if let Some(use_cached_pillar) = args.use_cached_pillar {
            self.execution.use_cached_pillar = use_cached_pillar;
        }
        if let Some(returner) = args.returner {
            self.execution.returner = Some(returner);
        }
        if let Some(default_grains) = args.default_grains {
            self.execution.default_grains = default_grains;
        }
        if let Some(default_pillar) = args.default_pillar {
            self.execution.default_pillar = default_pillar;
        }
    }

    /// 保存配置到文件
    pub fn save_to_file(&self, config_path: &PathBuf) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// 生成默认配置模板
    pub fn generate_default_template() -> Self {
        let mut config = Self::default();
        config.inventory.roster_file = Some(DEFAULT_ROSTER_FILE.to_string());
        config.inventory.nodegroups.insert(
            "edges".to_string(),
            "G@role:edge and not G@status:maintenance".to_string(),
        );
        config.output.summary = true;
        config
    }

    /// 生成默认配置模板并保存到文件
    pub fn create_default_config_file(config_path: &PathBuf) -> anyhow::Result<()> {
        let body = toml::to_string_pretty(&Self::generate_default_template())?;
        std::fs::write(config_path, format!("{}{}", TEMPLATE_HEADER, body))?;
        Ok(())
    }

    /// 获取当前全局配置的快照
    pub fn snapshot() -> anyhow::Result<Config> {
        with_global!(config => config.clone())
    }

    /// 获取界面语言
    pub fn get_language() -> anyhow::Result<String> {
        with_global!(config => config.i18n.language.clone())
    }

    /// 获取详细输出设置（带默认值）
    pub fn get_verbose() -> bool {
        GLOBAL_CONFIG
            .get()
            .and_then(|config| config.read().ok().map(|config| config.output.verbose))
            .unwrap_or(false)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            inventory: InventoryConfig::default(),
            execution: ExecutionConfig::default(),
            output: OutputConfig::default(),
            i18n: I18nConfig::default(),
        }
    }
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            roster_file: None,
            delimiter: Config::default_delimiter(),
            default_driver: Config::default_driver(),
            cache_dir: Config::default_cache_dir(),
            nodegroups: BTreeMap::new(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            batch_size: BatchSize::default(),
            batch_wait: 0.0,
            timeout: Config::default_timeout(),
            failhard: false,
            static_output: false,
            hide_timeout: false,
            events: false,
            use_existing_proxy: false,
            no_connect: false,
            with_grains: true,
            with_pillar: true,
            cache_grains: false,
            cache_pillar: false,
            use_cached_grains: true,
            use_cached_pillar: true,
            returner: None,
            default_grains: Map::new(),
            default_pillar: Map::new(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            summary: false,
            colored: true,
            show_progress: false,
            format: Config::default_format(),
        }
    }
}

impl Default for I18nConfig {
    fn default() -> Self {
        Self {
            language: Config::default_language(),
        }
    }
}
