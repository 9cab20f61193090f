// ============================================================================
// SProx - CLI 模块
// ============================================================================
//
// 文件: src/cli/mod.rs
// 职责: CLI 命令行接口模块入口和路由
// 边界:
//   - ✅ CLI 结构定义和命令枚举
//   - ✅ 全局参数合并到配置
//   - ✅ 命令路由分发，返回进程退出码
//   - ❌ 不应包含具体命令实现逻辑
//   - ❌ 不应包含数据模型定义
//
// ============================================================================

pub mod init;
pub mod run;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::models::config::{Config, RuntimeArgs};
use crate::utils::colors::Colors;
use crate::utils::constants::DEFAULT_CONFIG_FILE;
use crate::utils::logger::init_tracing;
use init::{handle_init, InitArgs};
use run::{run, RunArgs};

/// SProx - agentless batch execution against inventory targets
#[derive(Debug, Parser)]
#[command(name = "sprox")]
#[command(about = "Resolve targets from a roster and run functions on them in concurrent batches")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Global verbose mode
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Interface language (zh_cn, en_us)
    #[arg(short, long, global = true)]
    pub language: Option<String>,

    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Diagnostic log level (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Commands
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a function on the targets matched by an expression
    Run(RunArgs),
    /// Initialize configuration file
    Init(InitArgs),
}

/// 解析命令行并执行，返回进程退出码
pub async fn run_cli() -> Result<i32> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level);

    Config::initialize(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    Config::merge_runtime_args(build_runtime_args(&cli))?;
    Colors::set_enabled(Config::snapshot()?.output.colored);

    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Init(args) => handle_init(args, &cli.config),
    }
}

/// 全局参数转换为运行时覆盖
fn build_runtime_args(cli: &Cli) -> RuntimeArgs {
    RuntimeArgs {
        verbose: if cli.verbose { Some(true) } else { None },
        colored: if cli.no_color { Some(false) } else { None },
        language: cli.language.clone(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::target::ExpressionType;

    #[test]
    fn test_parse_run_with_globals() {
        let cli = Cli::try_parse_from([
            "sprox", "-v", "--no-color", "run", "-G", "role:edge", "test.ping",
        ])
        .unwrap();
        assert!(cli.verbose);
        let runtime = build_runtime_args(&cli);
        assert_eq!(runtime.colored, Some(false));
        assert_eq!(runtime.verbose, Some(true));

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.expression_type(), ExpressionType::Grain);
                assert_eq!(args.tgt, "role:edge");
                assert_eq!(args.fun.as_deref(), Some("test.ping"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_target_type_flags_are_exclusive() {
        let parsed = Cli::try_parse_from(["sprox", "run", "-L", "-E", "a", "test.ping"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_parse_init() {
        let cli = Cli::try_parse_from(["sprox", "--config", "custom.toml", "init", "--force"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("custom.toml"));
        assert!(matches!(cli.command, Commands::Init(InitArgs { force: true })));
    }
}
