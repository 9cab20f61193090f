// ============================================================================
// SProx - 目标池数据模型
// ============================================================================
//
// 文件: src/models/pool.rs
// 职责: 目标池（inventory pool）数据结构定义
// 边界:
//   - ✅ 目标记录数据结构定义
//   - ✅ 保持插入顺序的目标池
//   - ✅ 属性路径遍历
//   - ❌ 不应包含目标表达式解析
//   - ❌ 不应包含 inventory 文件读取
//
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// 单个目标的属性记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    /// 静态属性（连接参数、驱动类型等）
    #[serde(default)]
    pub static_attributes: Map<String, Value>,
    /// grains（设备事实），已合并缓存
    #[serde(default = "empty_object")]
    pub grains: Value,
    /// pillar（外部数据），已合并缓存
    #[serde(default = "empty_object")]
    pub pillar: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl Default for TargetRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetRecord {
    /// 创建空记录
    pub fn new() -> Self {
        Self {
            static_attributes: Map::new(),
            grains: empty_object(),
            pillar: empty_object(),
        }
    }

    /// 设置 grains
    pub fn with_grains(mut self, grains: Value) -> Self {
        self.grains = grains;
        self
    }

    /// 设置 pillar
    pub fn with_pillar(mut self, pillar: Value) -> Self {
        self.pillar = pillar;
        self
    }

    /// 设置静态属性
    pub fn with_static_attributes(mut self, attrs: Map<String, Value>) -> Self {
        self.static_attributes = attrs;
        self
    }

    /// 获取目标声明的驱动类型（`proxy.proxytype`）
    pub fn proxytype(&self) -> Option<&str> {
        self.static_attributes
            .get("proxy")
            .and_then(|proxy| proxy.get("proxytype"))
            .and_then(Value::as_str)
    }
}

/// 目标池：target-id -> 属性记录
///
/// 迭代顺序为插入顺序；解析结果的顺序以此为准。
#[derive(Debug, Clone, Default)]
pub struct Pool {
    /// 按插入顺序排列的目标 ID
    order: Vec<String>,
    /// ID 到插入位置的索引
    index: HashMap<String, usize>,
    /// 目标记录
    records: Vec<TargetRecord>,
}

impl Pool {
    /// 创建空目标池
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入目标；已存在时替换记录但保留原位置
    pub fn insert(&mut self, id: impl Into<String>, record: TargetRecord) {
        let id = id.into();
        match self.index.get(&id) {
            Some(&pos) => self.records[pos] = record,
            None => {
                self.index.insert(id.clone(), self.order.len());
                self.order.push(id);
                self.records.push(record);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&TargetRecord> {
        self.index.get(id).map(|&pos| &self.records[pos])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut TargetRecord> {
        match self.index.get(id) {
            Some(&pos) => Some(&mut self.records[pos]),
            None => None,
        }
    }

    /// 目标在池中的位置
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// 按位置取 ID
    pub fn id_at(&self, pos: usize) -> Option<&str> {
        self.order.get(pos).map(String::as_str)
    }

    /// 全部目标 ID（插入顺序）
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    /// 按插入顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TargetRecord)> {
        self.order
            .iter()
            .map(String::as_str)
            .zip(self.records.iter())
    }

    /// 只保留给定 ID 的子池，顺序不变
    pub fn retain_ids<'a, I>(&self, ids: I) -> Pool
    where
        I: IntoIterator<Item = &'a str>,
    {
        let wanted: std::collections::HashSet<&str> = ids.into_iter().collect();
        let mut subset = Pool::new();
        for (id, record) in self.iter() {
            if wanted.contains(id) {
                subset.insert(id, record.clone());
            }
        }
        subset
    }
}

impl FromIterator<(String, TargetRecord)> for Pool {
    fn from_iter<T: IntoIterator<Item = (String, TargetRecord)>>(iter: T) -> Self {
        let mut pool = Pool::new();
        for (id, record) in iter {
            pool.insert(id, record);
        }
        pool
    }
}

/// 按分隔符遍历嵌套属性
///
/// 对象按键取值；数组优先按数字下标取值，否则取第一个包含该键的对象元素。
/// 路径不存在时返回 `None`。
pub fn traverse<'a>(data: &'a Value, path: &str, delimiter: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(data);
    }

    let mut current = data;
    for key in path.split(delimiter) {
        current = match current {
            Value::Object(map) => map.get(key)?,
            Value::Array(items) => match key.parse::<usize>() {
                Ok(idx) => items.get(idx)?,
                Err(_) => items
                    .iter()
                    .find_map(|item| item.as_object().and_then(|obj| obj.get(key)))?,
            },
            _ => return None,
        };
    }
    Some(current)
}

/// 将标量值转为用于比较的文本
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => None,
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// 深度合并：`overlay` 中的值覆盖 `base`，对象递归合并
pub fn merge_values(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pool_keeps_insertion_order() {
        let mut pool = Pool::new();
        pool.insert("c", TargetRecord::new());
        pool.insert("a", TargetRecord::new());
        pool.insert("b", TargetRecord::new());
        pool.insert("a", TargetRecord::new().with_grains(json!({"x": 1})));

        assert_eq!(pool.ids(), &["c", "a", "b"]);
        assert_eq!(pool.get("a").map(|r| r.grains.clone()), Some(json!({"x": 1})));
        assert_eq!(pool.position("b"), Some(2));
    }

    #[test]
    fn test_traverse_nested_object_and_list() {
        let data = json!({
            "os": {"family": "junos"},
            "interfaces": [{"name": "xe-0/0/0"}, {"mtu": 9000}],
        });

        assert_eq!(traverse(&data, "os:family", ":"), Some(&json!("junos")));
        assert_eq!(traverse(&data, "interfaces:0:name", ":"), Some(&json!("xe-0/0/0")));
        assert_eq!(traverse(&data, "interfaces:mtu", ":"), Some(&json!(9000)));
        assert_eq!(traverse(&data, "os.family", "."), Some(&json!("junos")));
        assert_eq!(traverse(&data, "os:missing", ":"), None);
    }

    #[test]
    fn test_merge_values_overlay_wins() {
        let mut base = json!({"a": 1, "nested": {"x": 1, "y": 2}});
        merge_values(&mut base, &json!({"a": 2, "nested": {"y": 3}, "b": true}));
        assert_eq!(base, json!({"a": 2, "nested": {"x": 1, "y": 3}, "b": true}));
    }

    #[test]
    fn test_proxytype_from_static_attributes() {
        let mut attrs = Map::new();
        attrs.insert("proxy".to_string(), json!({"proxytype": "dummy"}));
        let record = TargetRecord::new().with_static_attributes(attrs);
        assert_eq!(record.proxytype(), Some("dummy"));
        assert_eq!(TargetRecord::new().proxytype(), None);
    }
}
