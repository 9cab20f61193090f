// ============================================================================
// SProx - 目标表达式数据模型
// ============================================================================
//
// 文件: src/models/target.rs
// 职责: 目标表达式与解析结果的数据结构定义
// 边界:
//   - ✅ 表达式类型枚举
//   - ✅ 表达式输入形式（文本 / 词列表）
//   - ✅ 有序去重的目标集合
//   - ❌ 不应包含表达式求值逻辑
//
// ============================================================================

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// 目标表达式类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionType {
    /// shell glob 匹配 ID（默认）
    #[default]
    Glob,
    /// ID 列表
    List,
    /// 正则匹配 ID
    Pcre,
    /// grain 等值匹配
    Grain,
    /// grain 正则匹配
    GrainPcre,
    /// pillar 等值匹配
    Pillar,
    /// pillar 正则匹配
    PillarPcre,
    /// 节点组引用
    Nodegroup,
    /// 布尔组合表达式
    Compound,
}

impl ExpressionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpressionType::Glob => "glob",
            ExpressionType::List => "list",
            ExpressionType::Pcre => "pcre",
            ExpressionType::Grain => "grain",
            ExpressionType::GrainPcre => "grain_pcre",
            ExpressionType::Pillar => "pillar",
            ExpressionType::PillarPcre => "pillar_pcre",
            ExpressionType::Nodegroup => "nodegroup",
            ExpressionType::Compound => "compound",
        }
    }

    /// 复合表达式中的引擎前缀字母（`G@role:edge`）
    pub fn from_engine_letter(letter: &str) -> Option<Self> {
        match letter {
            "G" => Some(ExpressionType::Grain),
            "P" => Some(ExpressionType::GrainPcre),
            "I" => Some(ExpressionType::Pillar),
            "J" => Some(ExpressionType::PillarPcre),
            "L" => Some(ExpressionType::List),
            "E" => Some(ExpressionType::Pcre),
            "N" => Some(ExpressionType::Nodegroup),
            _ => None,
        }
    }
}

impl fmt::Display for ExpressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ExpressionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "glob" => Ok(ExpressionType::Glob),
            "list" => Ok(ExpressionType::List),
            "pcre" => Ok(ExpressionType::Pcre),
            "grain" => Ok(ExpressionType::Grain),
            "grain_pcre" => Ok(ExpressionType::GrainPcre),
            "pillar" => Ok(ExpressionType::Pillar),
            "pillar_pcre" => Ok(ExpressionType::PillarPcre),
            "nodegroup" => Ok(ExpressionType::Nodegroup),
            "compound" => Ok(ExpressionType::Compound),
            other => Err(format!("unsupported target type: {}", other)),
        }
    }
}

/// 目标表达式输入
///
/// 文本形式按空白切分为词；结构化调用方可以直接给出词列表。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetExpression {
    Text(String),
    Words(Vec<String>),
}

impl TargetExpression {
    /// 复合表达式的词序列
    pub fn words(&self) -> Vec<String> {
        match self {
            TargetExpression::Text(text) => text.split_whitespace().map(str::to_string).collect(),
            TargetExpression::Words(words) => words.clone(),
        }
    }

    /// 列表表达式的成员（文本按逗号切分）
    pub fn list_items(&self) -> Vec<String> {
        match self {
            TargetExpression::Text(text) => text
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect(),
            TargetExpression::Words(words) => words.clone(),
        }
    }

    /// 单一模式文本；词列表以空格拼接
    pub fn pattern(&self) -> String {
        match self {
            TargetExpression::Text(text) => text.clone(),
            TargetExpression::Words(words) => words.join(" "),
        }
    }
}

impl From<&str> for TargetExpression {
    fn from(text: &str) -> Self {
        TargetExpression::Text(text.to_string())
    }
}

impl From<String> for TargetExpression {
    fn from(text: String) -> Self {
        TargetExpression::Text(text)
    }
}

impl From<Vec<String>> for TargetExpression {
    fn from(words: Vec<String>) -> Self {
        TargetExpression::Words(words)
    }
}

impl fmt::Display for TargetExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetExpression::Text(text) => write!(f, "{}", text),
            TargetExpression::Words(words) => write!(f, "[{}]", words.join(", ")),
        }
    }
}

/// 解析后的目标集合：有序、无重复
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TargetSet {
    ids: Vec<String>,
    #[serde(skip)]
    seen: HashSet<String>,
}

impl TargetSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加目标；重复 ID 被忽略，返回是否新增
    pub fn push(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.seen.contains(&id) {
            return false;
        }
        self.seen.insert(id.clone());
        self.ids.push(id);
        true
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.ids.iter()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.ids
    }
}

impl<S: Into<String>> FromIterator<S> for TargetSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        let mut set = TargetSet::new();
        for id in iter {
            set.push(id);
        }
        set
    }
}

impl IntoIterator for TargetSet {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_set_dedups_and_keeps_order() {
        let set: TargetSet = vec!["b", "a", "b", "c", "a"].into_iter().collect();
        assert_eq!(set.ids(), &["b", "a", "c"]);
        assert!(set.contains("c"));
    }

    #[test]
    fn test_expression_words_and_list_items() {
        let text = TargetExpression::from("  G@role:edge   and not  web* ");
        assert_eq!(text.words(), vec!["G@role:edge", "and", "not", "web*"]);

        let list = TargetExpression::from("r1, r2,,r3");
        assert_eq!(list.list_items(), vec!["r1", "r2", "r3"]);
    }

    #[test]
    fn test_engine_letters() {
        assert_eq!(ExpressionType::from_engine_letter("G"), Some(ExpressionType::Grain));
        assert_eq!(ExpressionType::from_engine_letter("N"), Some(ExpressionType::Nodegroup));
        assert_eq!(ExpressionType::from_engine_letter("S"), None);
        assert_eq!("grain_pcre".parse::<ExpressionType>(), Ok(ExpressionType::GrainPcre));
    }
}
