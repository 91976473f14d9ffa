//! 子进程沙箱：每次执行在独立临时目录中启动解释器
//!
//! 临时目录内写入 scope.json / script.py / runner.py，解释器运行 runner.py（prelude），
//! 由其读取绑定、授予能力、执行脚本并写回 outcome.json。
//! 子进程环境被清空（仅保留白名单变量），工作目录为临时目录，超时后随句柄一起被杀死；
//! 每次调用输出结构化审计日志（JSON）。

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::process::Command;

use crate::config::SandboxSection;
use crate::core::{AgentError, ScriptFailure};
use crate::sandbox::{CapabilitySet, Scope, ScriptSandbox};

const PRELUDE: &str = include_str!("prelude.py");

#[derive(Debug, Deserialize)]
struct Outcome {
    ok: bool,
    #[serde(default)]
    scope: Option<Map<String, Value>>,
    #[serde(default)]
    error: Option<OutcomeError>,
}

#[derive(Debug, Deserialize)]
struct OutcomeError {
    #[serde(rename = "type")]
    kind: String,
    message: String,
    #[serde(default)]
    traceback: String,
}

/// 子进程沙箱：解释器、超时、环境白名单
pub struct ProcessSandbox {
    interpreter: String,
    timeout: Duration,
    passthrough_env: Vec<String>,
    max_output_chars: usize,
}

impl ProcessSandbox {
    pub fn new(interpreter: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout: Duration::from_secs(timeout_secs),
            passthrough_env: vec!["PATH".to_string()],
            max_output_chars: 4000,
        }
    }

    pub fn from_config(cfg: &SandboxSection) -> Self {
        Self {
            interpreter: cfg.interpreter.clone(),
            timeout: Duration::from_secs(cfg.timeout_secs),
            passthrough_env: cfg.passthrough_env.clone(),
            max_output_chars: cfg.max_output_chars,
        }
    }

    async fn prepare(&self, dir: &Path, script: &str, scope: &Scope) -> Result<(), AgentError> {
        let scope_json = serde_json::to_vec(scope)
            .map_err(|e| AgentError::Config(format!("scope is not serializable: {e}")))?;
        tokio::fs::write(dir.join("scope.json"), scope_json).await?;
        tokio::fs::write(dir.join("script.py"), script).await?;
        tokio::fs::write(dir.join("runner.py"), PRELUDE).await?;
        Ok(())
    }

    fn command(&self, dir: &Path, capabilities: &CapabilitySet) -> Command {
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg("runner.py")
            .current_dir(dir)
            .env_clear()
            .env("HOME", dir)
            .env("MPLBACKEND", "Agg")
            .env("MPLCONFIGDIR", dir)
            .env("ANALYST_CAPABILITIES", capabilities.to_env_value())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for name in &self.passthrough_env {
            if let Ok(v) = std::env::var(name) {
                cmd.env(name, v);
            }
        }
        cmd
    }

    fn clip(&self, bytes: &[u8]) -> String {
        let s = String::from_utf8_lossy(bytes);
        let s = s.trim();
        if s.chars().count() > self.max_output_chars {
            format!("{}...[truncated]", s.chars().take(self.max_output_chars).collect::<String>())
        } else {
            s.to_string()
        }
    }
}

#[async_trait]
impl ScriptSandbox for ProcessSandbox {
    async fn run(
        &self,
        script: &str,
        scope: Scope,
        capabilities: &CapabilitySet,
    ) -> Result<Scope, AgentError> {
        let start = Instant::now();
        let dir = tempfile::Builder::new().prefix("analyst-sandbox-").tempdir()?;
        self.prepare(dir.path(), script, &scope).await?;

        let output = tokio::time::timeout(self.timeout, self.command(dir.path(), capabilities).output())
            .await
            .map_err(|_| AgentError::Timeout(format!("script ran longer than {}s", self.timeout.as_secs())))?
            .map_err(|e| {
                AgentError::ScriptFailed(ScriptFailure::new(
                    "SandboxError",
                    format!("failed to start interpreter '{}': {}", self.interpreter, e),
                ))
            })?;

        let stdout = self.clip(&output.stdout);
        let stderr = self.clip(&output.stderr);
        let outcome_path = dir.path().join("outcome.json");
        let outcome: Option<Outcome> = match tokio::fs::read(&outcome_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).ok(),
            Err(_) => None,
        };

        let audit = serde_json::json!({
            "event": "sandbox_audit",
            "interpreter": self.interpreter,
            "capabilities": capabilities.to_env_value(),
            "exit": output.status.code(),
            "ok": outcome.as_ref().map(|o| o.ok).unwrap_or(false),
            "duration_ms": start.elapsed().as_millis() as u64,
            "script_chars": script.len(),
        });
        tracing::info!(audit = %audit.to_string(), "sandbox");
        if !stdout.is_empty() {
            tracing::debug!(stdout = %stdout, "sandbox stdout");
        }

        match outcome {
            Some(Outcome { ok: true, scope: Some(bindings), .. }) => {
                let mut out = Scope::new();
                for (k, v) in bindings {
                    out.insert(k, v);
                }
                Ok(out)
            }
            Some(Outcome { error: Some(err), .. }) => Err(AgentError::ScriptFailed(
                ScriptFailure::new(err.kind, err.message).with_traceback(err.traceback),
            )),
            _ => Err(AgentError::ScriptFailed(
                ScriptFailure::new(
                    "SandboxError",
                    format!("interpreter exited with {:?} without producing an outcome", output.status.code()),
                )
                .with_traceback(stderr),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::RESULT_SLOT;
    use serde_json::json;

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn test_script_reads_scope_and_sets_result() {
        if !python_available() {
            return;
        }
        let sandbox = ProcessSandbox::new("python3", 30);
        let scope = Scope::new().bind("numbers", json!([1, 2, 3]));
        let mut out = sandbox
            .run("result = sum(numbers) * 2", scope, &CapabilitySet::new())
            .await
            .unwrap();
        assert_eq!(out.take_result(), Some(json!(12)));
        assert_eq!(out.get("numbers"), Some(&json!([1, 2, 3])));
    }

    #[tokio::test]
    async fn test_runtime_fault_is_structured() {
        if !python_available() {
            return;
        }
        let sandbox = ProcessSandbox::new("python3", 30);
        let err = sandbox
            .run("x = {}\nresult = x['missing']", Scope::new(), &CapabilitySet::new())
            .await
            .unwrap_err();
        match err {
            AgentError::ScriptFailed(f) => {
                assert_eq!(f.kind, "KeyError");
                assert!(f.traceback.contains("<script>"));
            }
            other => panic!("expected ScriptFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_access_to_undeclared_bindings() {
        if !python_available() {
            return;
        }
        let sandbox = ProcessSandbox::new("python3", 30);
        let err = sandbox
            .run("result = secret", Scope::new().bind("visible", json!(1)), &CapabilitySet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ScriptFailed(ref f) if f.kind == "NameError"));
    }

    #[tokio::test]
    async fn test_bytes_become_binary_marker() {
        if !python_available() {
            return;
        }
        let sandbox = ProcessSandbox::new("python3", 30);
        let mut out = sandbox
            .run("result = b'\\x89PNG\\r\\n'", Scope::new(), &CapabilitySet::new())
            .await
            .unwrap();
        let v = out.take_result().unwrap();
        assert_eq!(v["__kind__"], "binary");
        assert_eq!(v["mime"], "image/png");
        assert!(out.get(RESULT_SLOT).is_none());
    }

    #[tokio::test]
    async fn test_timeout_kills_script() {
        if !python_available() {
            return;
        }
        let sandbox = ProcessSandbox::new("python3", 1);
        let err = sandbox
            .run("while True:\n    pass", Scope::new(), &CapabilitySet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_script_failure() {
        let sandbox = ProcessSandbox::new("definitely-not-an-interpreter-xyz", 5);
        let err = sandbox
            .run("result = 1", Scope::new(), &CapabilitySet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ScriptFailed(ref f) if f.kind == "SandboxError"));
    }
}
