// ============================================================================
// SProx - Roster inventory
// ============================================================================
//
// 文件: src/plugins/roster.rs
// 职责: 基于 roster 文件的 inventory 提供者
// 边界:
//   - ✅ 读取 YAML / JSON roster 文件
//   - ✅ 精确名称查找的快速路径
//   - ✅ 未配置 roster 时的直接目标回退
//   - ❌ 不应包含表达式求值（交给 Resolver）
//   - ❌ 不应包含缓存叠加（交给 CachedInventory）
//
// ============================================================================

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::debug;

use crate::core::resolver::{InventoryError, InventoryProvider};
use crate::models::pool::{Pool, TargetRecord};
use crate::models::target::{ExpressionType, TargetExpression};

/// glob 中带通配语义的字符
const GLOB_SPECIAL: &[char] = &['*', '?', '['];

fn is_literal_glob(pattern: &str) -> bool {
    !pattern.is_empty() && !pattern.contains(GLOB_SPECIAL)
}

/// roster 文件：`id -> { grains?, pillar?, <静态属性> }`
///
/// ```yaml
/// edge1:
///   proxy:
///     proxytype: local
///   grains:
///     role: edge
/// core1: {}
/// ```
#[derive(Debug, Clone)]
pub struct FileRoster {
    path: PathBuf,
}

impl FileRoster {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<Pool, InventoryError> {
        let shown = self.path.display().to_string();
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| InventoryError::Read {
                path: shown.clone(),
                source,
            })?;

        let pool = parse_roster(&content).map_err(|reason| match reason {
            RosterParseError::Syntax(reason) => InventoryError::Parse {
                path: shown.clone(),
                reason,
            },
            RosterParseError::Entry(id) => InventoryError::InvalidEntry(id),
        })?;

        debug!("Loaded {} targets from roster {}", pool.len(), shown);
        Ok(pool)
    }
}

enum RosterParseError {
    Syntax(String),
    Entry(String),
}

/// 解析 roster 文本（YAML 是 JSON 的超集），保持文件中的顺序
fn parse_roster(content: &str) -> Result<Pool, RosterParseError> {
    let document: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| RosterParseError::Syntax(e.to_string()))?;

    let mapping = match document {
        serde_yaml::Value::Mapping(mapping) => mapping,
        serde_yaml::Value::Null => return Ok(Pool::new()),
        _ => {
            return Err(RosterParseError::Syntax(
                "top level must be a mapping of target ids".to_string(),
            ))
        }
    };

    let mut pool = Pool::new();
    for (key, entry) in mapping {
        let id = match key {
            serde_yaml::Value::String(s) => s,
            serde_yaml::Value::Number(n) => n.to_string(),
            other => return Err(RosterParseError::Entry(format!("{:?}", other))),
        };

        let attributes = match serde_json::to_value(&entry) {
            Ok(Value::Object(map)) => map,
            Ok(Value::Null) => Map::new(),
            _ => return Err(RosterParseError::Entry(id)),
        };

        pool.insert(id, record_from_attributes(attributes));
    }
    Ok(pool)
}

/// 拆出 grains / pillar，其余作为静态属性
fn record_from_attributes(mut attributes: Map<String, Value>) -> TargetRecord {
    let mut record = TargetRecord::new();
    if let Some(grains) = attributes.remove("grains") {
        record.grains = grains;
    }
    if let Some(pillar) = attributes.remove("pillar") {
        record.pillar = pillar;
    }
    record.with_static_attributes(attributes)
}

#[async_trait]
impl InventoryProvider for FileRoster {
    fn name(&self) -> &str {
        "file"
    }

    async fn pool(&self) -> Result<Pool, InventoryError> {
        self.load().await
    }

    async fn fast_path(
        &self,
        expression: &TargetExpression,
        kind: ExpressionType,
    ) -> Result<Option<Pool>, InventoryError> {
        match kind {
            ExpressionType::List => {
                let pool = self.load().await?;
                let items = expression.list_items();
                Ok(Some(pool.retain_ids(items.iter().map(String::as_str))))
            }
            ExpressionType::Glob if is_literal_glob(&expression.pattern()) => {
                let pool = self.load().await?;
                let id = expression.pattern();
                Ok(Some(pool.retain_ids([id.as_str()])))
            }
            _ => Ok(None),
        }
    }
}

/// 未配置 roster：列表表达式直接作为目标，不含通配符的 glob 作为单个目标
#[derive(Debug, Clone, Default)]
pub struct DirectTargets;

#[async_trait]
impl InventoryProvider for DirectTargets {
    fn name(&self) -> &str {
        "direct"
    }

    async fn pool(&self) -> Result<Pool, InventoryError> {
        Ok(Pool::new())
    }

    async fn fast_path(
        &self,
        expression: &TargetExpression,
        kind: ExpressionType,
    ) -> Result<Option<Pool>, InventoryError> {
        let ids = match kind {
            ExpressionType::List => expression.list_items(),
            ExpressionType::Glob if is_literal_glob(&expression.pattern()) => {
                vec![expression.pattern()]
            }
            _ => return Ok(None),
        };

        Ok(Some(
            ids.into_iter()
                .map(|id| (id, TargetRecord::new()))
                .collect(),
        ))
    }
}
