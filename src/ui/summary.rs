// ============================================================================
// SProx - 执行结果汇总组件
// ============================================================================
//
// 文件: src/ui/summary.rs
// 职责: 运行结束后的汇总显示
// 边界:
//   - ✅ 目标数 / 返回数 / 未返回 / 出错 / 不可达 / 中止统计
//   - ✅ verbose 模式下列出各类目标 ID
//   - ✅ 国际化文本支持
//   - ❌ 不应包含统计逻辑
//   - ❌ 不应包含任务执行逻辑
//
// ============================================================================

use std::io::{self, Write};
use std::time::Duration;

use crate::core::reporter::RunSummary;
use crate::utils::colors::Colors;
use crate::utils::constants::icons;
use crate::utils::logger::Logger;
use crate::{t, tf};

/// 构建汇总内容
pub fn summary_lines(jid: &str, summary: &RunSummary, duration: Option<Duration>, verbose: bool) -> Vec<String> {
    let mut lines = vec![
        "".to_string(),
        Colors::bold(&t!("summary.title")),
        "═══════════════════════════════════════".to_string(),
        format!("{} {}", icons::EXEC, tf!("summary.jid", jid)),
        format!("{} {}", icons::TARGET, tf!("summary.targeted", summary.targeted)),
        format!("{} {}", icons::SUCCESS, tf!("summary.returned", summary.returned())),
    ];

    let categories = [
        (icons::TIME, "summary.timed_out", &summary.timed_out),
        (icons::ERROR, "summary.failed", &summary.failed),
        (icons::UNREACHABLE, "summary.unreachable", &summary.unreachable),
        (icons::SKIP, "summary.aborted", &summary.aborted),
    ];
    for (icon, key, ids) in categories {
        if ids.is_empty() {
            continue;
        }
        lines.push(format!("{} {}", icon, tf!(key, ids.len())));
        if verbose {
            let mut sorted = ids.clone();
            sorted.sort();
            lines.extend(sorted.iter().map(|id| format!("    - {}", id)));
        }
    }

    if let Some(duration) = duration {
        lines.push(format!(
            "{} {}",
            icons::TIME,
            tf!("summary.duration", format!("{:.2}s", duration.as_secs_f64()))
        ));
    }
    lines.push(tf!("summary.exit_code", summary.exit_code));
    lines
}

/// 渲染运行汇总
pub fn render_run_summary(jid: &str, summary: &RunSummary, duration: Option<Duration>, verbose: bool) {
    for line in summary_lines(jid, summary, duration, verbose) {
        Logger::info(line);
    }
    let _ = io::stdout().flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RunSummary {
        RunSummary {
            targeted: 5,
            timed_out: vec!["e3".to_string()],
            failed: vec!["e2".to_string(), "e1".to_string()],
            unreachable: vec![],
            aborted: vec![],
            exit_code: 69,
        }
    }

    #[test]
    fn test_empty_categories_are_omitted() {
        Colors::set_enabled(false);
        let lines = summary_lines("20261016120000000000", &sample(), None, false);
        assert!(lines.iter().any(|l| l.ends_with("# of devices targeted: 5")));
        assert!(lines.iter().any(|l| l.ends_with("# of devices returned: 4")));
        assert!(lines.iter().any(|l| l.ends_with("# of devices with errors: 2")));
        assert!(!lines.iter().any(|l| l.contains("unreachable")));
        assert_eq!(lines.last().map(String::as_str), Some("Exit code: 69"));
    }

    #[test]
    fn test_verbose_lists_sorted_ids() {
        Colors::set_enabled(false);
        let lines = summary_lines("jid", &sample(), Some(Duration::from_millis(1500)), true);
        let errors = lines
            .iter()
            .position(|l| l.contains("with errors"))
            .unwrap();
        assert_eq!(lines[errors + 1], "    - e1");
        assert_eq!(lines[errors + 2], "    - e2");
        assert!(lines.iter().any(|l| l.ends_with("Execution time: 1.50s")));
    }
}
