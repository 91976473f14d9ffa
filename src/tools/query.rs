//! query：用 DuckDB 从大型列式 / 远程数据集中检索数据，结果必须是表

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{AgentError, ExecutionLog, StepResult};
use crate::executor::{InitialScript, ResultShape, ScriptJob, StepExecutor};
use crate::plan::ToolKind;
use crate::sandbox::{CapabilitySet, Scope};
use crate::tools::{prompts, PreviewLimits, ToolAdapter, ToolCall};

pub struct QueryTool {
    executor: Arc<StepExecutor>,
    capabilities: CapabilitySet,
    preview: PreviewLimits,
}

impl QueryTool {
    pub fn new(executor: Arc<StepExecutor>, capabilities: CapabilitySet, preview: PreviewLimits) -> Self {
        Self {
            executor,
            capabilities,
            preview,
        }
    }
}

#[async_trait]
impl ToolAdapter for QueryTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Query
    }

    async fn invoke(&self, call: ToolCall<'_>, log: &mut ExecutionLog) -> Result<StepResult, AgentError> {
        let step = call.step;
        let step_task = step.task_text();
        let source = step.input_str("source");
        let context_preview = call.context.preview(self.preview.rows, self.preview.chars);

        let prompt = prompts::query_prompt(call.task, &step_task, source, &context_preview, &self.capabilities);
        let job = ScriptJob::new(&step.name, &step_task, ResultShape::Table, InitialScript::Generate(prompt))
            .scope(
                Scope::new()
                    .bind("source", source.map(Value::from).unwrap_or(Value::Null))
                    .bind("context", call.context.to_wire()),
            )
            .capabilities(self.capabilities.clone())
            .data_preview(format!(
                "source: {}\n{}",
                source.unwrap_or("(see the task)"),
                context_preview
            ))
            .instructions(prompts::QUERY_INSTRUCTIONS);
        self.executor.execute(&job, log).await
    }
}
