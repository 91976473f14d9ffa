//! summarize：纯 Oracle 步骤，为非技术读者总结先前结果

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{AgentError, ExecutionLog, StepResult};
use crate::executor::StepExecutor;
use crate::plan::ToolKind;
use crate::tools::{oracle_step, prompts, PreviewLimits, ToolAdapter, ToolCall};

pub struct SummarizeTool {
    executor: Arc<StepExecutor>,
    preview: PreviewLimits,
}

impl SummarizeTool {
    pub fn new(executor: Arc<StepExecutor>, preview: PreviewLimits) -> Self {
        Self { executor, preview }
    }
}

#[async_trait]
impl ToolAdapter for SummarizeTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Summarize
    }

    async fn invoke(&self, call: ToolCall<'_>, log: &mut ExecutionLog) -> Result<StepResult, AgentError> {
        let findings = call.context.preview(self.preview.rows, self.preview.chars);
        let prompt = prompts::summarize_prompt(call.task, &call.step.task_text(), &findings);
        let text = oracle_step(
            self.executor.oracle(),
            &call.step.name,
            self.executor.max_retries(),
            log,
            &prompt,
            None,
        )
        .await?;
        Ok(StepResult::Text(text))
    }
}
