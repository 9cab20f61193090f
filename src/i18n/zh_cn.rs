// ============================================================================
// SProx - 中文翻译表
// ============================================================================
//
// 文件: src/i18n/zh_cn.rs
// 职责: 中文用户提示文案
// 边界:
//   - ✅ 中文翻译字符串
//   - ❌ 不应包含翻译逻辑
//   - ❌ 不应包含其他语言翻译
//
// ============================================================================

/// 中文翻译表
pub const TRANSLATIONS: &[(&str, &str)] = &[
    // 运行命令
    ("run.no_function", "请指定要执行的函数。"),
    (
        "run.no_match",
        "没有设备匹配该目标，请检查目标表达式、目标类型或 roster 文件。",
    ),
    ("run.preview_header", "{} 匹配的目标 ({}):"),
    ("run.start", "执行 {}，目标 {} 个，批次大小 {}"),
    (
        "run.no_existing_proxy",
        "没有可用的常驻 proxy worker，所有目标均以临时 worker 执行",
    ),
    ("run.returner_unavailable", "returner 不可用: {}"),
    ("run.inventory_failed", "加载 roster 失败: {}"),
    // 汇总
    ("summary.title", "执行汇总"),
    ("summary.jid", "任务 ID: {}"),
    ("summary.targeted", "目标设备数: {}"),
    ("summary.returned", "已返回设备数: {}"),
    ("summary.timed_out", "未返回设备数: {}"),
    ("summary.failed", "出错设备数: {}"),
    ("summary.unreachable", "不可达设备数: {}"),
    ("summary.aborted", "已中止设备数: {}"),
    ("summary.duration", "执行耗时: {}"),
    ("summary.exit_code", "退出码: {}"),
    // 输出
    ("output.serialize_failed", "无法渲染 {} 的结果: {}"),
    ("progress.message", "台设备"),
    // 初始化命令
    ("init.exists", "配置文件已存在: {}（使用 --force 覆盖）"),
    ("init.created", "已创建配置文件: {}"),
    (
        "init.next_step",
        "将 inventory.roster_file 指向你的 roster，然后运行: sprox '*' test.ping",
    ),
];
