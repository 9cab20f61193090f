// ============================================================================
// SProx - 国际化模块
// ============================================================================
//
// 文件: src/i18n/mod.rs
// 职责: 面向用户文案的翻译查找
// 边界:
//   - ✅ 按配置语言选择翻译表
//   - ✅ t! / tf! 翻译宏
//   - ✅ 中文表缺失的键回退到英文
//   - ❌ 不应包含具体翻译内容
//   - ❌ 不应包含业务逻辑
//
// ============================================================================

pub mod en_us;
pub mod zh_cn;

type Table = &'static [(&'static str, &'static str)];

fn table_for(language: &str) -> Table {
    match language {
        "zh_cn" => zh_cn::TRANSLATIONS,
        _ => en_us::TRANSLATIONS,
    }
}

fn lookup(table: Table, key: &str) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// 获取翻译文本
///
/// 每次调用都读取当前配置的语言；配置未初始化时使用英文。
pub fn get_translation(key: &str) -> String {
    use crate::models::config::Config;

    let language = Config::get_language().unwrap_or_else(|_| "en_us".to_string());
    lookup(table_for(&language), key)
        .or_else(|| lookup(en_us::TRANSLATIONS, key))
        .map(str::to_string)
        .unwrap_or_else(|| format!("Unknown translation key: {}", key))
}

/// 简单翻译宏
#[macro_export]
macro_rules! t {
    ($key:expr) => {
        $crate::i18n::get_translation($key)
    };
}

/// 依次替换模板中的 `{}` 占位符
pub fn format_with_args(template: String, args: Vec<String>) -> String {
    let mut result = template;
    let mut cursor = 0;
    for arg in args.iter() {
        match result[cursor..].find("{}") {
            Some(offset) => {
                let pos = cursor + offset;
                result.replace_range(pos..pos + 2, arg);
                cursor = pos + arg.len();
            }
            None => break,
        }
    }
    result
}

/// 带参数的翻译宏
#[macro_export]
macro_rules! tf {
    ($key:expr, $($arg:expr),*) => {{
        let template = $crate::i18n::get_translation($key);
        let args = vec![$(format!("{}", $arg)),*];
        $crate::i18n::format_with_args(template, args)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_with_args_is_sequential() {
        let out = format_with_args("{} of {}".to_string(), vec!["3".to_string(), "5".to_string()]);
        assert_eq!(out, "3 of 5");
    }

    #[test]
    fn test_argument_containing_placeholder_is_not_reexpanded() {
        let out = format_with_args("{} and {}".to_string(), vec!["{}".to_string(), "x".to_string()]);
        assert_eq!(out, "{} and x");
    }

    #[test]
    fn test_tables_share_keys() {
        for (key, _) in en_us::TRANSLATIONS {
            assert!(lookup(zh_cn::TRANSLATIONS, key).is_some(), "missing zh_cn key {}", key);
        }
    }
}
