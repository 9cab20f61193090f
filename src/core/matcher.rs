// ============================================================================
// SProx - 基础匹配器
// ============================================================================
//
// 文件: src/core/matcher.rs
// 职责: 单一（非布尔）目标选择规则的实现
// 边界:
//   - ✅ glob / list / pcre 匹配目标 ID
//   - ✅ grain / pillar 属性等值与正则匹配
//   - ✅ 返回池内位置集合，保证结果顺序与池一致
//   - ❌ 不应包含布尔组合逻辑
//   - ❌ 不应包含节点组展开
//   - ❌ 不应修改目标池
//
// ============================================================================

use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::collections::BTreeSet;

use super::resolver::ResolveError;
use crate::models::pool::{scalar_text, traverse, Pool, TargetRecord};

/// 匹配结果：目标在池中的位置集合
pub type Matches = BTreeSet<usize>;

/// 属性来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeSource {
    Grains,
    Pillar,
}

impl AttributeSource {
    fn data<'a>(&self, record: &'a TargetRecord) -> &'a Value {
        match self {
            AttributeSource::Grains => &record.grains,
            AttributeSource::Pillar => &record.pillar,
        }
    }
}

/// 全部目标（布尔运算的全集）
pub fn universe(pool: &Pool) -> Matches {
    (0..pool.len()).collect()
}

/// shell glob 匹配目标 ID
///
/// 模式本身非法时（例如未闭合的 `[`）退化为字面相等比较。
pub fn glob_match(pool: &Pool, pattern: &str) -> Matches {
    match glob::Pattern::new(pattern) {
        Ok(compiled) => pool
            .ids()
            .iter()
            .enumerate()
            .filter(|(_, id)| compiled.matches(id))
            .map(|(pos, _)| pos)
            .collect(),
        Err(_) => pool.position(pattern).into_iter().collect(),
    }
}

/// 精确成员匹配
pub fn list_match<S: AsRef<str>>(pool: &Pool, items: &[S]) -> Matches {
    items
        .iter()
        .filter_map(|item| pool.position(item.as_ref()))
        .collect()
}

/// 正则搜索目标 ID（不要求整体匹配，大小写不敏感）
pub fn pcre_match(pool: &Pool, pattern: &str) -> Result<Matches, ResolveError> {
    let regex = compile_regex(pattern)?;
    Ok(pool
        .ids()
        .iter()
        .enumerate()
        .filter(|(_, id)| regex.is_match(id))
        .map(|(pos, _)| pos)
        .collect())
}

/// 属性等值匹配：`path<delim>value`
///
/// 叶子为数组时任一元素相等即匹配；路径不存在则不匹配。
pub fn attribute_match(
    pool: &Pool,
    source: AttributeSource,
    expression: &str,
    delimiter: &str,
) -> Result<Matches, ResolveError> {
    let (path, expected) = split_attribute_expression(expression, delimiter)?;

    Ok(pool
        .iter()
        .enumerate()
        .filter(|(_, (_, record))| {
            traverse(source.data(record), path, delimiter)
                .map(|leaf| leaf_equals(leaf, expected))
                .unwrap_or(false)
        })
        .map(|(pos, _)| pos)
        .collect())
}

/// 属性正则匹配：`path<delim>regex`
///
/// 路径不存在时按空字符串参与匹配，从不报错。
pub fn attribute_pcre_match(
    pool: &Pool,
    source: AttributeSource,
    expression: &str,
    delimiter: &str,
) -> Result<Matches, ResolveError> {
    let (path, pattern) = split_attribute_expression(expression, delimiter)?;
    let regex = compile_regex(pattern)?;

    Ok(pool
        .iter()
        .enumerate()
        .filter(|(_, (_, record))| match traverse(source.data(record), path, delimiter) {
            Some(leaf) => leaf_matches(leaf, &regex),
            None => regex.is_match(""),
        })
        .map(|(pos, _)| pos)
        .collect())
}

/// 拆分属性表达式：最后一段为值，其余为路径
fn split_attribute_expression<'a>(
    expression: &'a str,
    delimiter: &str,
) -> Result<(&'a str, &'a str), ResolveError> {
    match expression.rsplit_once(delimiter) {
        Some((path, value)) if !path.is_empty() => Ok((path, value)),
        _ => Err(ResolveError::InsufficientAttributeArgs(expression.to_string())),
    }
}

fn compile_regex(pattern: &str) -> Result<Regex, ResolveError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| ResolveError::InvalidRegex {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

fn leaf_equals(leaf: &Value, expected: &str) -> bool {
    match leaf {
        Value::Array(items) => items.iter().any(|item| leaf_equals(item, expected)),
        other => scalar_text(other).map(|text| text == expected).unwrap_or(false),
    }
}

fn leaf_matches(leaf: &Value, regex: &Regex) -> bool {
    match leaf {
        Value::Array(items) => items.iter().any(|item| leaf_matches(item, regex)),
        Value::Object(_) => regex.is_match(&leaf.to_string()),
        other => regex.is_match(&scalar_text(other).unwrap_or_default()),
    }
}
