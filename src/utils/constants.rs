// ============================================================================
// SProx - 常量定义
// ============================================================================
//
// 文件: src/utils/constants.rs
// 职责: 应用程序常量定义
// 边界:
//   - ✅ 应用名称、默认文件名
//   - ✅ 进程退出码定义
//   - ✅ 终端图标字符定义
//   - ❌ 不应包含动态配置
//   - ❌ 不应包含业务逻辑
//
// ============================================================================

/// 应用名称常量
pub const APP_NAME: &str = "SPROX";

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "sprox.toml";

/// 默认 roster 文件名
pub const DEFAULT_ROSTER_FILE: &str = "roster.yml";

/// 默认缓存目录
pub const DEFAULT_CACHE_DIR: &str = ".sprox/cache";

/// 目标未响应时的合成返回内容
pub const NO_RESPONSE_MESSAGE: &str = "Minion did not respond. No job will be sent.";

/// failhard 中止后剩余目标的标记内容
pub const ABORTED_MESSAGE: &str = "Execution aborted: failhard triggered";

/// 进程退出码
///
/// 最终退出码取整个运行过程中观察到的最大值。
pub mod exit_codes {
    /// 全部成功
    pub const EX_OK: i32 = 0;
    /// 应用错误 / 通用失败
    pub const EX_GENERIC: i32 = 1;
    /// 目标无响应（超时）或不可达
    pub const EX_UNAVAILABLE: i32 = 69;
    /// 内部异常（工作任务 panic 等）
    pub const EX_SOFTWARE: i32 = 70;
}

/// 终端图标
pub mod icons {
    /// 成功图标
    pub const SUCCESS: &str = "✓";
    /// 错误图标
    pub const ERROR: &str = "✗";
    /// 目标图标
    pub const TARGET: &str = "◉";
    /// 超时图标
    pub const TIME: &str = "⧖";
    /// 不可达图标
    pub const UNREACHABLE: &str = "⊘";
    /// 跳过/中止图标
    pub const SKIP: &str = "○";
    /// 执行图标
    pub const EXEC: &str = "▸";
}

/// 进度条样式
pub mod progress_chars {
    /// indicatif 进度条字符（已完成、当前、未完成）
    pub const BAR: &str = "█▓░";
    /// 进度条模板
    pub const TEMPLATE: &str = "{spinner} [{bar:30}] {pos}/{len} {msg}";
}
