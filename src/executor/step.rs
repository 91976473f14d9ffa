//! 自修正步骤执行器
//!
//! 执行 -> 校验 -> 失败则带着失败脚本、确切错误与上下文预览请求 Oracle 重写整段脚本 -> 再执行，
//! 最多 `max_retries` 次；预算耗尽时返回 `StepFailed`。每次失败写入 ExecutionLog（仅供诊断）。

use std::sync::Arc;
use std::time::Instant;

use crate::core::{AgentError, ExecutionLog, RecoveryAction, RecoveryEngine, StepResult};
use crate::executor::{extract_code, ResultShape};
use crate::llm::Oracle;
use crate::sandbox::{CapabilitySet, Scope, ScriptSandbox};

/// 脚本执行前的静态检查（如分析脚本禁止访问文件 / URL）
pub type ScriptGuard = fn(&str) -> Result<(), AgentError>;

/// 首个候选脚本：调用方直接给出，或由 Oracle 按 prompt 生成
#[derive(Debug, Clone)]
pub enum InitialScript {
    Supplied(String),
    Generate(String),
}

/// 一次步骤执行所需的全部输入（由工具适配器组装）
#[derive(Debug, Clone)]
pub struct ScriptJob {
    pub step: String,
    /// 本步骤的任务描述（进入修正 prompt）
    pub task: String,
    pub scope: Scope,
    pub capabilities: CapabilitySet,
    pub shape: ResultShape,
    pub initial: InitialScript,
    /// 可用数据的简短预览（进入修正 prompt）
    pub data_preview: String,
    /// 工具特有的脚本要求（进入修正 prompt）
    pub instructions: String,
    pub guard: Option<ScriptGuard>,
}

impl ScriptJob {
    pub fn new(step: impl Into<String>, task: impl Into<String>, shape: ResultShape, initial: InitialScript) -> Self {
        Self {
            step: step.into(),
            task: task.into(),
            scope: Scope::new(),
            capabilities: CapabilitySet::new(),
            shape,
            initial,
            data_preview: String::new(),
            instructions: String::new(),
            guard: None,
        }
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn data_preview(mut self, preview: impl Into<String>) -> Self {
        self.data_preview = preview.into();
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn guard(mut self, guard: ScriptGuard) -> Self {
        self.guard = Some(guard);
        self
    }
}

pub struct StepExecutor {
    sandbox: Arc<dyn ScriptSandbox>,
    oracle: Arc<Oracle>,
    recovery: RecoveryEngine,
    max_retries: u32,
}

impl StepExecutor {
    pub fn new(sandbox: Arc<dyn ScriptSandbox>, oracle: Arc<Oracle>, max_retries: u32) -> Self {
        Self {
            sandbox,
            oracle,
            recovery: RecoveryEngine::new(),
            max_retries: max_retries.max(1),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn oracle(&self) -> &Arc<Oracle> {
        &self.oracle
    }

    /// 运行自修正循环；成功返回的值一定满足 `job.shape`
    pub async fn execute(&self, job: &ScriptJob, log: &mut ExecutionLog) -> Result<StepResult, AgentError> {
        let mut script = match &job.initial {
            InitialScript::Supplied(s) => s.clone(),
            InitialScript::Generate(prompt) => extract_code(&self.oracle.generate(prompt).await),
        };
        let mut last_error = String::new();

        for attempt in 1..=self.max_retries {
            let start = Instant::now();
            tracing::debug!(step = %job.step, attempt, script = %script, "running script");
            let err = match self.attempt(job, &script).await {
                Ok(result) => {
                    tracing::info!(
                        step = %job.step,
                        attempt,
                        kind = result.kind_name(),
                        duration_ms = start.elapsed().as_millis() as u64,
                        "step succeeded"
                    );
                    return Ok(result);
                }
                Err(e) => e,
            };

            let hint = match self.recovery.handle(&err) {
                RecoveryAction::CorrectScript(hint) => hint,
                _ => return Err(err),
            };
            tracing::warn!(step = %job.step, attempt, error = %err, "attempt failed");
            last_error = err.to_string();
            log.record(&job.step, attempt, &last_error, &script);

            if attempt < self.max_retries {
                let prompt = correction_prompt(job, &script, &hint);
                script = extract_code(&self.oracle.generate(&prompt).await);
            }
        }

        tracing::error!(step = %job.step, attempts = self.max_retries, error = %last_error, "step failed");
        Err(AgentError::StepFailed {
            step: job.step.clone(),
            attempts: self.max_retries,
            last_error,
        })
    }

    async fn attempt(&self, job: &ScriptJob, script: &str) -> Result<StepResult, AgentError> {
        if Oracle::is_failure(script) {
            return Err(AgentError::OracleUnusable(if script.trim().is_empty() {
                "empty response".to_string()
            } else {
                script.to_string()
            }));
        }
        if let Some(guard) = job.guard {
            guard(script)?;
        }
        let mut bindings = self
            .sandbox
            .run(script, job.scope.clone(), &job.capabilities)
            .await?;
        let value = bindings.take_result().ok_or_else(|| {
            AgentError::ContractViolation("no result produced: the script must assign `result`".to_string())
        })?;
        job.shape.coerce(value)
    }
}

/// 修正 prompt：失败脚本原文 + 确切错误 + 数据预览 + 契约，要求输出完整替换脚本
fn correction_prompt(job: &ScriptJob, failed_script: &str, error: &str) -> String {
    format!(
        r#"The following Python script failed while working on this task:
{task}

```python
{failed_script}
```

Error:
{error}

Available data:
{preview}

Requirements:
{instructions}
- Top-level statements only; do not wrap the logic in a function.
- Assign the final value to `result`; it must be {shape}.

Return the complete corrected script in a single ```python block."#,
        task = job.task,
        failed_script = failed_script,
        error = error,
        preview = if job.data_preview.is_empty() { "(none)" } else { job.data_preview.as_str() },
        instructions = job.instructions,
        shape = job.shape.describe(),
    )
}
