// ============================================================================
// SProx - 程序入口
// ============================================================================
//
// 文件: src/main.rs
// 职责: 启动异步运行时并把运行结果转换为进程退出码
// 边界:
//   - ✅ 顶层错误输出
//   - ❌ 不应包含命令实现
//
// ============================================================================

use sprox::cli::run_cli;
use sprox::utils::constants::exit_codes;
use sprox::utils::logger::Logger;

#[tokio::main]
async fn main() {
    let code = match run_cli().await {
        Ok(code) => code,
        Err(e) => {
            Logger::error(format!("{:#}", e));
            exit_codes::EX_GENERIC
        }
    };
    std::process::exit(code);
}
