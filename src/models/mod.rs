// ============================================================================
// SProx - 数据模型模块
// ============================================================================
//
// 文件: src/models/mod.rs
// 职责: 数据模型模块入口和导出
// 边界:
//   - ✅ 数据模型子模块导出
//   - ❌ 不应包含业务逻辑
//
// ============================================================================

pub mod config;
pub mod execution;
pub mod pool;
pub mod target;

pub use execution::{BatchSize, Classification, ExecutionResult, ExecutionUnit};
pub use pool::{Pool, TargetRecord};
pub use target::{ExpressionType, TargetExpression, TargetSet};
