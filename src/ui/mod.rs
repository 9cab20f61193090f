// ============================================================================
// SProx - UI 模块
// ============================================================================
//
// 文件: src/ui/mod.rs
// 职责: 终端展示组件入口
// 边界:
//   - ✅ 结果输出、进度条、运行汇总
//   - ❌ 不应包含执行逻辑
//
// ============================================================================

pub mod output;
pub mod progress;
pub mod summary;

pub use output::{ConsoleSink, Outputter};
pub use summary::render_run_summary;
