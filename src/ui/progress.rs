// ============================================================================
// SProx - 进度条组件
// ============================================================================
//
// 文件: src/ui/progress.rs
// 职责: 运行进度条的创建
// 边界:
//   - ✅ 基于 indicatif 的进度条样式
//   - ✅ 非终端输出时不显示进度条
//   - ❌ 不应包含结果渲染逻辑
//
// ============================================================================

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::t;
use crate::utils::constants::progress_chars;

/// 创建目标进度条
///
/// stdout 不是终端时返回 None。
pub fn target_progress(total: usize) -> Option<ProgressBar> {
    if !atty::is(atty::Stream::Stdout) {
        return None;
    }
    Some(build(total))
}

fn build(total: usize) -> ProgressBar {
    let style = ProgressStyle::default_bar()
        .template(progress_chars::TEMPLATE)
        .map(|style| style.progress_chars(progress_chars::BAR))
        .unwrap_or_else(|_| ProgressStyle::default_bar());

    let bar = ProgressBar::new(total as u64);
    bar.set_style(style);
    bar.set_message(t!("progress.message"));
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_length_matches_targets() {
        let bar = build(7);
        assert_eq!(bar.length(), Some(7));
        bar.inc(2);
        assert_eq!(bar.position(), 2);
        bar.finish_and_clear();
    }
}
