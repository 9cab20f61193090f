// ============================================================================
// SProx - 外部协作者模块
// ============================================================================
//
// 文件: src/plugins/mod.rs
// 职责: inventory、缓存、驱动、事件与结果转发的具体实现
// 边界:
//   - ✅ 各插件子模块导出
//   - ❌ 不应包含调度与解析逻辑
//
// ============================================================================

pub mod cache;
pub mod drivers;
pub mod events;
pub mod returner;
pub mod roster;

pub use cache::{CacheStore, JsonFileCache, MemoryCache};
pub use events::{EventSink, LogEventSink, NullEventSink};
pub use returner::{returner_by_name, Returner};
pub use roster::{DirectTargets, FileRoster};
