// ============================================================================
// SProx - 目标解析器
// ============================================================================
//
// 文件: src/core/resolver.rs
// 职责: 目标表达式求值与 inventory 门面
// 边界:
//   - ✅ 按表达式类型分派到基础匹配器
//   - ✅ 复合表达式中的引擎前缀识别（G@ / P@ / I@ / J@ / L@ / E@ / N@）
//   - ✅ 节点组递归展开（带深度保护）
//   - ✅ 解析错误降级为空集合并记录日志
//   - ✅ InventoryProvider 接口与缓存属性叠加
//   - ❌ 不应包含 roster 文件格式细节
//   - ❌ 不应包含任务执行逻辑
//
// ============================================================================

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

use super::compound;
use super::matcher::{self, AttributeSource, Matches};
use crate::models::pool::{merge_values, Pool};
use crate::models::target::{ExpressionType, TargetExpression, TargetSet};
use crate::plugins::cache::{cache_bank, CacheStore, CACHE_DATA_KEY};

/// 节点组最大嵌套深度
const MAX_NODEGROUP_DEPTH: usize = 10;

/// 解析错误；在 `Resolver::resolve` 边界内被记录并降级为空集合
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("empty target expression")]
    EmptyExpression,
    #[error("unexpected operator '{0}' where a target was expected")]
    UnexpectedOperator(String),
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("missing boolean operator before '{0}'")]
    MissingOperator(String),
    #[error("expression ends with operator '{0}'")]
    TrailingOperator(String),
    #[error("unbalanced parentheses")]
    UnbalancedParentheses,
    #[error("unrecognized target engine '{0}'")]
    UnknownEngine(String),
    #[error("invalid regular expression '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },
    #[error("insufficient arguments for attribute match '{0}'")]
    InsufficientAttributeArgs(String),
    #[error("nodegroup '{0}' nests too deeply")]
    NodegroupRecursion(String),
}

/// 解析选项
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// 属性路径分隔符
    pub delimiter: String,
    /// 节点组定义：名称 -> 复合表达式
    pub nodegroups: BTreeMap<String, String>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            delimiter: ":".to_string(),
            nodegroups: BTreeMap::new(),
        }
    }
}

/// 目标表达式解析器
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    options: ResolveOptions,
}

impl Resolver {
    pub fn new(options: ResolveOptions) -> Self {
        Self { options }
    }

    /// 解析表达式；任何结构错误都记录日志并返回空集合
    pub fn resolve(
        &self,
        pool: &Pool,
        expression: &TargetExpression,
        kind: ExpressionType,
    ) -> TargetSet {
        match self.try_resolve(pool, expression, kind) {
            Ok(targets) => {
                debug!(
                    "Target expression '{}' ({}) matched {} of {} targets",
                    expression,
                    kind,
                    targets.len(),
                    pool.len()
                );
                targets
            }
            Err(err) => {
                error!("Invalid target expression '{}' ({}): {}", expression, kind, err);
                TargetSet::new()
            }
        }
    }

    /// 解析表达式，保留错误信息
    pub fn try_resolve(
        &self,
        pool: &Pool,
        expression: &TargetExpression,
        kind: ExpressionType,
    ) -> Result<TargetSet, ResolveError> {
        let matches = self.evaluate(pool, expression, kind, 0)?;
        Ok(matches
            .into_iter()
            .filter_map(|pos| pool.id_at(pos))
            .collect())
    }

    fn evaluate(
        &self,
        pool: &Pool,
        expression: &TargetExpression,
        kind: ExpressionType,
        depth: usize,
    ) -> Result<Matches, ResolveError> {
        let delimiter = self.options.delimiter.as_str();
        match kind {
            ExpressionType::Glob => Ok(matcher::glob_match(pool, &expression.pattern())),
            ExpressionType::List => Ok(matcher::list_match(pool, &expression.list_items())),
            ExpressionType::Pcre => matcher::pcre_match(pool, &expression.pattern()),
            ExpressionType::Grain => {
                matcher::attribute_match(pool, AttributeSource::Grains, &expression.pattern(), delimiter)
            }
            ExpressionType::GrainPcre => matcher::attribute_pcre_match(
                pool,
                AttributeSource::Grains,
                &expression.pattern(),
                delimiter,
            ),
            ExpressionType::Pillar => {
                matcher::attribute_match(pool, AttributeSource::Pillar, &expression.pattern(), delimiter)
            }
            ExpressionType::PillarPcre => matcher::attribute_pcre_match(
                pool,
                AttributeSource::Pillar,
                &expression.pattern(),
                delimiter,
            ),
            ExpressionType::Nodegroup => self.evaluate_nodegroup(pool, &expression.pattern(), depth),
            ExpressionType::Compound => self.evaluate_compound(pool, &expression.words(), depth),
        }
    }

    fn evaluate_compound(
        &self,
        pool: &Pool,
        words: &[String],
        depth: usize,
    ) -> Result<Matches, ResolveError> {
        let universe = matcher::universe(pool);
        compound::evaluate(words, &universe, |word| self.evaluate_word(pool, word, depth))
    }

    /// 复合表达式中的单个操作数：`X@pattern` 或裸 glob
    fn evaluate_word(&self, pool: &Pool, word: &str, depth: usize) -> Result<Matches, ResolveError> {
        let Some((engine, pattern)) = split_engine(word) else {
            return Ok(matcher::glob_match(pool, word));
        };

        let kind = ExpressionType::from_engine_letter(engine)
            .ok_or_else(|| ResolveError::UnknownEngine(word.to_string()))?;
        self.evaluate(pool, &TargetExpression::from(pattern), kind, depth)
    }

    /// 节点组：未定义的组返回空集合（不视为错误）
    fn evaluate_nodegroup(&self, pool: &Pool, name: &str, depth: usize) -> Result<Matches, ResolveError> {
        if depth >= MAX_NODEGROUP_DEPTH {
            return Err(ResolveError::NodegroupRecursion(name.to_string()));
        }

        match self.options.nodegroups.get(name) {
            Some(body) => {
                let words: Vec<String> = body.split_whitespace().map(str::to_string).collect();
                self.evaluate_compound(pool, &words, depth + 1)
            }
            None => {
                warn!("Nodegroup '{}' is not defined, matching nothing", name);
                Ok(Matches::new())
            }
        }
    }
}

/// 拆分 `X@pattern` 形式的引擎前缀
///
/// 只有 `@` 前恰好是一个 ASCII 字母时才视为引擎前缀，
/// 其余情况（如 `user@host`）按普通 glob 处理。
fn split_engine(word: &str) -> Option<(&str, &str)> {
    let (engine, pattern) = word.split_once('@')?;
    let mut chars = engine.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => Some((engine, pattern)),
        _ => None,
    }
}

// ============================================================================
// Inventory 门面
// ============================================================================

/// inventory 读取错误
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("failed to read inventory '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse inventory '{path}': {reason}")]
    Parse { path: String, reason: String },
    #[error("inventory entry '{0}' is not a mapping")]
    InvalidEntry(String),
}

/// inventory 提供者：产生本次运行的目标池
#[async_trait]
pub trait InventoryProvider: Send + Sync {
    /// 提供者名称（用于日志）
    fn name(&self) -> &str;

    /// 完整目标池
    async fn pool(&self) -> Result<Pool, InventoryError>;

    /// 快速路径：提供者能直接回答的表达式（如精确名称查找）
    async fn fast_path(
        &self,
        _expression: &TargetExpression,
        _kind: ExpressionType,
    ) -> Result<Option<Pool>, InventoryError> {
        Ok(None)
    }

    /// 返回匹配表达式的子池：先尝试快速路径，再回退到完整池 + 解析器
    async fn targets(
        &self,
        expression: &TargetExpression,
        kind: ExpressionType,
        resolver: &Resolver,
    ) -> Result<Pool, InventoryError> {
        if let Some(pool) = self.fast_path(expression, kind).await? {
            debug!("Inventory '{}' answered '{}' via fast path", self.name(), expression);
            return Ok(pool);
        }

        let pool = self.pool().await?;
        let matched = resolver.resolve(&pool, expression, kind);
        Ok(pool.retain_ids(matched.iter().map(String::as_str)))
    }
}

/// 缓存叠加选项
#[derive(Debug, Clone, Copy)]
pub struct CacheOverlay {
    pub use_cached_grains: bool,
    pub use_cached_pillar: bool,
}

/// 在 inventory 记录下叠加缓存的 grains / pillar（inventory 的值优先）
pub struct CachedInventory {
    inner: Arc<dyn InventoryProvider>,
    cache: Arc<dyn CacheStore>,
    overlay: CacheOverlay,
}

impl CachedInventory {
    pub fn new(inner: Arc<dyn InventoryProvider>, cache: Arc<dyn CacheStore>, overlay: CacheOverlay) -> Self {
        Self { inner, cache, overlay }
    }

    async fn apply_cache(&self, mut pool: Pool) -> Pool {
        if !self.overlay.use_cached_grains && !self.overlay.use_cached_pillar {
            return pool;
        }

        let ids: Vec<String> = pool.ids().to_vec();
        for id in ids {
            let cached = match self.cache.fetch(&cache_bank(&id), CACHE_DATA_KEY).await {
                Ok(Some(data)) => data,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Failed to read cached attributes for {}: {}", id, e);
                    continue;
                }
            };

            if let Some(record) = pool.get_mut(&id) {
                if self.overlay.use_cached_grains {
                    overlay_under(&mut record.grains, cached.get("grains"));
                }
                if self.overlay.use_cached_pillar {
                    overlay_under(&mut record.pillar, cached.get("pillar"));
                }
            }
        }
        pool
    }
}

/// `cached` 作为底层，`current` 的值覆盖其上
fn overlay_under(current: &mut Value, cached: Option<&Value>) {
    if let Some(cached) = cached {
        let mut merged = cached.clone();
        if !current.is_null() {
            merge_values(&mut merged, current);
        }
        *current = merged;
    }
}

#[async_trait]
impl InventoryProvider for CachedInventory {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn pool(&self) -> Result<Pool, InventoryError> {
        let pool = self.inner.pool().await?;
        Ok(self.apply_cache(pool).await)
    }

    async fn fast_path(
        &self,
        expression: &TargetExpression,
        kind: ExpressionType,
    ) -> Result<Option<Pool>, InventoryError> {
        match self.inner.fast_path(expression, kind).await? {
            Some(pool) => Ok(Some(self.apply_cache(pool).await)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::pool::TargetRecord;
    use crate::plugins::cache::MemoryCache;
    use serde_json::json;

    fn fleet() -> Pool {
        let mut pool = Pool::new();
        pool.insert("a", TargetRecord::new().with_grains(json!({"role": "edge"})));
        pool.insert("b", TargetRecord::new().with_grains(json!({"role": "core"})));
        pool.insert(
            "c",
            TargetRecord::new()
                .with_grains(json!({"role": "edge"}))
                .with_pillar(json!({"maintenance": true})),
        );
        pool
    }

    fn compound(resolver: &Resolver, pool: &Pool, expr: &str) -> Vec<String> {
        resolver
            .resolve(pool, &TargetExpression::from(expr), ExpressionType::Compound)
            .into_vec()
    }

    #[test]
    fn test_grain_equality_scenario() {
        let resolver = Resolver::default();
        let matched = resolver.resolve(&fleet(), &"role:edge".into(), ExpressionType::Grain);
        assert_eq!(matched.ids(), &["a", "c"]);
    }

    #[test]
    fn test_compound_with_engine_prefixes() {
        let resolver = Resolver::default();
        let pool = fleet();
        assert_eq!(compound(&resolver, &pool, "G@role:edge and not I@maintenance:true"), vec!["a"]);
        assert_eq!(compound(&resolver, &pool, "L@b,c or a"), vec!["a", "b", "c"]);
        assert_eq!(compound(&resolver, &pool, "E@^[ab]$ and not b"), vec!["a"]);
        assert_eq!(compound(&resolver, &pool, "P@role:^co"), vec!["b"]);
    }

    #[test]
    fn test_malformed_and_unknown_engine_yield_empty() {
        let resolver = Resolver::default();
        let pool = fleet();
        assert!(compound(&resolver, &pool, "and G@role:edge").is_empty());
        assert!(compound(&resolver, &pool, "Z@whatever or a").is_empty());
        assert!(matches!(
            resolver.try_resolve(&pool, &"X@foo".into(), ExpressionType::Compound),
            Err(ResolveError::UnknownEngine(_))
        ));
    }

    #[test]
    fn test_word_with_at_sign_is_glob() {
        let mut pool = Pool::new();
        pool.insert("admin@sw1", TargetRecord::new());
        let resolver = Resolver::default();
        assert_eq!(compound(&resolver, &pool, "admin@sw*"), vec!["admin@sw1"]);
    }

    #[test]
    fn test_nodegroups() {
        let mut nodegroups = BTreeMap::new();
        nodegroups.insert("edges".to_string(), "G@role:edge".to_string());
        nodegroups.insert("quiet_edges".to_string(), "N@edges and not I@maintenance:true".to_string());
        nodegroups.insert("loop".to_string(), "N@loop".to_string());
        let resolver = Resolver::new(ResolveOptions {
            nodegroups,
            ..Default::default()
        });
        let pool = fleet();

        assert_eq!(compound(&resolver, &pool, "N@quiet_edges or b"), vec!["a", "b"]);
        assert_eq!(
            resolver.resolve(&pool, &"edges".into(), ExpressionType::Nodegroup).ids(),
            &["a", "c"]
        );
        assert!(compound(&resolver, &pool, "N@undefined").is_empty());
        assert!(matches!(
            resolver.try_resolve(&pool, &"loop".into(), ExpressionType::Nodegroup),
            Err(ResolveError::NodegroupRecursion(_))
        ));
    }

    #[test]
    fn test_list_accepts_words() {
        let resolver = Resolver::default();
        let expr = TargetExpression::from(vec!["c".to_string(), "a".to_string()]);
        assert_eq!(resolver.resolve(&fleet(), &expr, ExpressionType::List).ids(), &["a", "c"]);
    }

    struct StaticInventory(Pool);

    #[async_trait]
    impl InventoryProvider for StaticInventory {
        fn name(&self) -> &str {
            "static"
        }

        async fn pool(&self) -> Result<Pool, InventoryError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_cached_inventory_overlays_under_roster() {
        let cache = Arc::new(MemoryCache::new());
        cache
            .store(
                &cache_bank("b"),
                CACHE_DATA_KEY,
                &json!({"grains": {"role": "edge", "model": "mx480"}}),
            )
            .await
            .unwrap();

        let inventory = CachedInventory::new(
            Arc::new(StaticInventory(fleet())),
            cache,
            CacheOverlay {
                use_cached_grains: true,
                use_cached_pillar: true,
            },
        );

        let resolver = Resolver::default();
        let pool = inventory
            .targets(&"G@model:mx480".into(), ExpressionType::Compound, &resolver)
            .await
            .unwrap();

        assert_eq!(pool.ids(), &["b"]);
        let grains = &pool.get("b").unwrap().grains;
        assert_eq!(grains["role"], json!("core"));
        assert_eq!(grains["model"], json!("mx480"));
    }
}
