// ============================================================================
// SProx - 内置连接驱动
// ============================================================================
//
// 文件: src/plugins/drivers.rs
// 职责: local / dummy 两个内置驱动及其会话
// 边界:
//   - ✅ local：在控制端主机上执行命令（子进程随会话释放而终止）
//   - ✅ dummy：无传输，回显命令，便于演练与测试
//   - ❌ 不应包含 SSH / 厂商 API 等远程传输
//
// ============================================================================

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::debug;

use crate::core::registry::{CommandOutput, ProxyDriver, Session, TargetContext};
use crate::core::worker::WorkerError;

/// 在本机执行命令的驱动
#[derive(Debug, Default)]
pub struct LocalDriver;

#[async_trait]
impl ProxyDriver for LocalDriver {
    fn name(&self) -> &str {
        "local"
    }

    async fn connect(&self, context: &TargetContext) -> Result<Box<dyn Session>, WorkerError> {
        debug!("Opening local session for {}", context.target_id);
        Ok(Box::new(LocalSession {
            target_id: context.target_id.clone(),
        }))
    }
}

struct LocalSession {
    target_id: String,
}

#[async_trait]
impl Session for LocalSession {
    async fn collect_grains(&mut self) -> Result<Value, WorkerError> {
        Ok(json!({
            "id": self.target_id,
            "kernel": std::env::consts::OS,
            "cpuarch": std::env::consts::ARCH,
            "os_family": std::env::consts::FAMILY,
        }))
    }

    async fn run_command(&mut self, command: &str) -> Result<CommandOutput, WorkerError> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| WorkerError::Application(format!("failed to spawn '{}': {}", command, e)))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status.code().unwrap_or(1),
        })
    }

    async fn close(&mut self) -> Result<(), WorkerError> {
        Ok(())
    }
}

/// 无传输驱动
///
/// 目标静态属性中 `proxy.fail_connect: true` 时模拟连接失败。
#[derive(Debug, Default)]
pub struct DummyDriver;

#[async_trait]
impl ProxyDriver for DummyDriver {
    fn name(&self) -> &str {
        "dummy"
    }

    async fn connect(&self, context: &TargetContext) -> Result<Box<dyn Session>, WorkerError> {
        let fail = context
            .static_attributes
            .get("proxy")
            .and_then(|proxy| proxy.get("fail_connect"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if fail {
            return Err(WorkerError::Connection {
                target: context.target_id.clone(),
                reason: "connection refused".to_string(),
            });
        }

        Ok(Box::new(DummySession {
            target_id: context.target_id.clone(),
        }))
    }
}

struct DummySession {
    target_id: String,
}

#[async_trait]
impl Session for DummySession {
    async fn collect_grains(&mut self) -> Result<Value, WorkerError> {
        Ok(json!({"id": self.target_id, "proxytype": "dummy"}))
    }

    async fn run_command(&mut self, command: &str) -> Result<CommandOutput, WorkerError> {
        Ok(CommandOutput {
            stdout: command.to_string(),
            ..Default::default()
        })
    }

    async fn close(&mut self) -> Result<(), WorkerError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn context(id: &str) -> TargetContext {
        TargetContext {
            target_id: id.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_local_session_runs_command() {
        let mut session = LocalDriver.connect(&context("localhost")).await.unwrap();
        let output = session.run_command("echo hi; exit 3").await.unwrap();
        assert_eq!(output.stdout.trim(), "hi");
        assert_eq!(output.status, 3);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_dummy_connect_failure() {
        let mut attrs = Map::new();
        attrs.insert("proxy".to_string(), json!({"proxytype": "dummy", "fail_connect": true}));
        let ctx = TargetContext {
            static_attributes: attrs,
            ..context("r9")
        };
        assert!(matches!(
            DummyDriver.connect(&ctx).await,
            Err(WorkerError::Connection { .. })
        ));
    }
}
