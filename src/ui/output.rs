// ============================================================================
// SProx - 结果输出组件
// ============================================================================
//
// 文件: src/ui/output.rs
// 职责: 单个目标结果的终端渲染
// 边界:
//   - ✅ nested / json / yaml / raw 四种输出格式
//   - ✅ 控制台 ResultSink（流式输出、收集输出、进度条）
//   - ❌ 不应包含调度逻辑
//   - ❌ 不应包含统计逻辑
//
// ============================================================================

use indicatif::ProgressBar;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::core::reporter::ResultSink;
use crate::models::execution::ExecutionResult;
use crate::models::pool::scalar_text;
use crate::tf;
use crate::utils::colors::Colors;
use crate::utils::logger::Logger;

const INDENT: usize = 4;

/// 结果输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Outputter {
    /// 缩进的层级文本
    #[default]
    Nested,
    Json,
    Yaml,
    /// 单行 JSON
    Raw,
}

impl FromStr for Outputter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nested" => Ok(Outputter::Nested),
            "json" => Ok(Outputter::Json),
            "yaml" => Ok(Outputter::Yaml),
            "raw" => Ok(Outputter::Raw),
            other => Err(format!("unknown output format: {}", other)),
        }
    }
}

impl fmt::Display for Outputter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Outputter::Nested => "nested",
            Outputter::Json => "json",
            Outputter::Yaml => "yaml",
            Outputter::Raw => "raw",
        };
        write!(f, "{}", name)
    }
}

impl Outputter {
    /// 渲染单个目标的结果
    pub fn render(&self, result: &ExecutionResult) -> Result<String, String> {
        let mut document = Map::new();
        document.insert(result.target_id.clone(), result.value.clone());
        match self {
            Outputter::Nested => Ok(render_nested_entry(result)),
            _ => self.serialize(&Value::Object(document)),
        }
    }

    /// 把全部结果渲染为一个文档（收集模式）
    pub fn render_all(&self, results: &BTreeMap<String, ExecutionResult>) -> Result<String, String> {
        match self {
            Outputter::Nested => Ok(results
                .values()
                .map(render_nested_entry)
                .collect::<Vec<_>>()
                .join("\n")),
            _ => {
                let document: Map<String, Value> = results
                    .iter()
                    .map(|(id, result)| (id.clone(), result.value.clone()))
                    .collect();
                self.serialize(&Value::Object(document))
            }
        }
    }

    fn serialize(&self, document: &Value) -> Result<String, String> {
        match self {
            Outputter::Json => serde_json::to_string_pretty(document).map_err(|e| e.to_string()),
            Outputter::Raw => serde_json::to_string(document).map_err(|e| e.to_string()),
            Outputter::Yaml => serde_yaml::to_string(document)
                .map(|text| text.trim_end().to_string())
                .map_err(|e| e.to_string()),
            Outputter::Nested => Ok(render_nested(document, 0)),
        }
    }
}

fn render_nested_entry(result: &ExecutionResult) -> String {
    let header = format!("{}:", result.target_id);
    let header = if result.is_success() {
        Colors::info(&header)
    } else {
        Colors::error(&header)
    };
    format!("{}\n{}", header, render_nested(&result.value, INDENT))
}

/// 层级文本渲染
pub fn render_nested(value: &Value, indent: usize) -> String {
    let pad = " ".repeat(indent);
    match value {
        Value::Object(map) if map.is_empty() => format!("{}{{}}", pad),
        Value::Object(map) => map
            .iter()
            .map(|(key, child)| format!("{}{}:\n{}", pad, key, render_nested(child, indent + INDENT)))
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Array(items) if items.is_empty() => format!("{}[]", pad),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(_) | Value::Array(_) => {
                    format!("{}-\n{}", pad, render_nested(item, indent + INDENT))
                }
                leaf => format!("{}- {}", pad, leaf_text(leaf)),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        leaf => format!("{}{}", pad, leaf_text(leaf)),
    }
}

fn leaf_text(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        other => scalar_text(other).unwrap_or_default(),
    }
}

/// 控制台结果输出
pub struct ConsoleSink {
    outputter: Outputter,
    progress: Option<ProgressBar>,
}

impl ConsoleSink {
    pub fn new(outputter: Outputter) -> Self {
        Self {
            outputter,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressBar>) -> Self {
        self.progress = progress;
        self
    }

    fn print(&self, text: &str) {
        match &self.progress {
            Some(bar) => bar.println(text),
            None => println!("{}", text),
        }
    }

    fn report_render_error(&self, target: &str, reason: String) {
        Logger::error(tf!("output.serialize_failed", target, reason));
    }
}

impl ResultSink for ConsoleSink {
    fn tick(&mut self, _result: &ExecutionResult) {
        if let Some(bar) = &self.progress {
            bar.inc(1);
        }
    }

    fn emit(&mut self, result: &ExecutionResult) {
        match self.outputter.render(result) {
            Ok(text) => self.print(&text),
            Err(reason) => self.report_render_error(&result.target_id, reason),
        }
    }

    fn emit_all(&mut self, results: &BTreeMap<String, ExecutionResult>) {
        if results.is_empty() {
            return;
        }
        match self.outputter.render_all(results) {
            Ok(text) => self.print(&text),
            Err(reason) => self.report_render_error("*", reason),
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.progress.take() {
            bar.finish_and_clear();
        }
    }
}
