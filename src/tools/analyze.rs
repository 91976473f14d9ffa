//! analyze：只从 `context`（先前各步骤的结果）读取数据，生成任意形状的答案
//!
//! 脚本在执行前经过静态检查：出现文件 / URL / 网络访问即视为契约违反并进入修正。

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{AgentError, ExecutionLog, StepResult};
use crate::executor::{InitialScript, ResultShape, ScriptJob, StepExecutor};
use crate::plan::ToolKind;
use crate::sandbox::{CapabilitySet, Scope};
use crate::tools::{prompts, PreviewLimits, ToolAdapter, ToolCall};

const FORBIDDEN: &[&str] = &[
    "open(",
    "read_csv(",
    "read_excel(",
    "read_parquet(",
    "read_json(",
    "read_html(",
    "read_table(",
    "requests.get(",
    "requests.post(",
    "requests.request(",
    "requests.Session(",
    "urlopen(",
    "urlretrieve(",
    "urllib.request",
    "httpx.",
    "socket.",
    "os.listdir",
    "os.path",
    "pathlib",
    "duckdb.",
];

/// 分析脚本不得访问上下文以外的数据
pub fn forbid_external_access(script: &str) -> Result<(), AgentError> {
    match FORBIDDEN.iter().find(|p| script.contains(*p)) {
        Some(p) => Err(AgentError::ContractViolation(format!(
            "analysis scripts must read data only from `context`, but the script uses `{p}`"
        ))),
        None => Ok(()),
    }
}

pub struct AnalyzeTool {
    executor: Arc<StepExecutor>,
    capabilities: CapabilitySet,
    preview: PreviewLimits,
}

impl AnalyzeTool {
    pub fn new(executor: Arc<StepExecutor>, capabilities: CapabilitySet, preview: PreviewLimits) -> Self {
        Self {
            executor,
            capabilities,
            preview,
        }
    }
}

#[async_trait]
impl ToolAdapter for AnalyzeTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Analyze
    }

    async fn invoke(&self, call: ToolCall<'_>, log: &mut ExecutionLog) -> Result<StepResult, AgentError> {
        let step = call.step;
        let step_task = step.task_text();
        let context_preview = call.context.preview(self.preview.rows, self.preview.chars);
        let prompt = prompts::analyze_prompt(call.task, &step_task, &context_preview, &self.capabilities);

        let job = ScriptJob::new(&step.name, &step_task, ResultShape::Any, InitialScript::Generate(prompt))
            .scope(Scope::new().bind("context", call.context.to_wire()))
            .capabilities(self.capabilities.clone())
            .data_preview(context_preview)
            .instructions(prompts::ANALYZE_INSTRUCTIONS)
            .guard(forbid_external_access);
        self.executor.execute(&job, log).await
    }
}
