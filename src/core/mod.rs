// ============================================================================
// SProx - Core 核心模块
// ============================================================================
//
// 文件: src/core/mod.rs
// 职责: 核心业务逻辑模块入口和导出
// 边界:
//   - ✅ 核心子模块导出
//   - ✅ 常用类型重新导出
//   - ❌ 不应包含具体业务实现
//   - ❌ 不应包含 CLI 相关逻辑
//   - ❌ 不应包含 UI 相关逻辑
//
// ============================================================================

pub mod bridge;
pub mod compound;
pub mod executor;
pub mod matcher;
pub mod registry;
pub mod reporter;
pub mod resolver;
pub mod scheduler;
pub mod worker;

// 重新导出常用类型
pub use bridge::{BridgeEvent, BridgeRequest, DisabledBridge, LongLivedBridge};
pub use executor::{ExecuteOptions, Executor, RunOutcome, RunRequest};
pub use registry::{DriverRegistry, Operation, OperationRegistry, ProxyDriver, Session};
pub use reporter::{NullSink, ResultSink, RunSummary};
pub use resolver::{
    CacheOverlay, CachedInventory, InventoryError, InventoryProvider, ResolveError,
    ResolveOptions, Resolver,
};
pub use scheduler::{BatchScheduler, SchedulerConfig};
pub use worker::{Worker, WorkerError, WorkerOptions, WorkerServices, WorkerState};
