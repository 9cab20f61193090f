// ============================================================================
// SProx - 初始化命令处理
// ============================================================================
//
// 文件: src/cli/init.rs
// 职责: 处理配置文件初始化命令
// 边界:
//   - ✅ 初始化命令参数解析
//   - ✅ 默认配置文件生成
//   - ✅ 配置文件存在性检查
//   - ❌ 不应包含配置文件格式定义
//   - ❌ 不应包含配置验证逻辑
//
// ============================================================================

use anyhow::Result;
use clap::Args;
use std::path::Path;

use crate::models::config::Config;
use crate::utils::constants::exit_codes;
use crate::utils::logger::Logger;
use crate::{t, tf};

/// 初始化命令参数
#[derive(Debug, Args)]
pub struct InitArgs {
    /// 强制覆盖已存在的配置文件
    #[arg(short, long)]
    pub force: bool,
}

/// 处理初始化命令
pub fn handle_init(args: InitArgs, config_path: &Path) -> Result<i32> {
    if config_path.exists() && !args.force {
        Logger::warn(tf!("init.exists", config_path.display()));
        return Ok(exit_codes::EX_OK);
    }

    Config::create_default_config_file(&config_path.to_path_buf())?;
    Logger::success(tf!("init.created", config_path.display()));
    Logger::info(t!("init.next_step"));
    Ok(exit_codes::EX_OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_creates_and_respects_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sprox.toml");

        assert_eq!(handle_init(InitArgs { force: false }, &path).unwrap(), 0);
        let created = Config::load_config(&path).unwrap();
        assert!(created.inventory.nodegroups.contains_key("edges"));

        std::fs::write(&path, "[output]\nformat = \"json\"\n").unwrap();
        handle_init(InitArgs { force: false }, &path).unwrap();
        assert_eq!(Config::load_config(&path).unwrap().output.format, "json");

        handle_init(InitArgs { force: true }, &path).unwrap();
        assert_eq!(Config::load_config(&path).unwrap().output.format, "nested");
    }
}
