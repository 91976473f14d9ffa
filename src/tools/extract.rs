//! extract：从上传的附件中提取内容
//!
//! 附件名先解析为实际文件（失败立即返回 Resolution，不重试）；
//! 图片直接走视觉 Oracle，其余类型生成解析脚本：表格 -> 表（多表 -> 名称到表的映射），文本 -> 字符串。

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{AgentError, ExecutionLog, StepResult};
use crate::executor::{bytes_to_data_uri, InitialScript, ResultShape, ScriptJob, StepExecutor};
use crate::plan::ToolKind;
use crate::sandbox::{CapabilitySet, Scope};
use crate::submission::AttachmentKind;
use crate::tools::{oracle_step, prompts, ToolAdapter, ToolCall};

pub struct ExtractTool {
    executor: Arc<StepExecutor>,
    capabilities: CapabilitySet,
}

impl ExtractTool {
    pub fn new(executor: Arc<StepExecutor>, capabilities: CapabilitySet) -> Self {
        Self {
            executor,
            capabilities,
        }
    }
}

#[async_trait]
impl ToolAdapter for ExtractTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Extract
    }

    async fn invoke(&self, call: ToolCall<'_>, log: &mut ExecutionLog) -> Result<StepResult, AgentError> {
        let step = call.step;
        let reference = step.input_str("file").unwrap_or_default();
        let file = call.attachments.resolve(reference)?;
        let step_task = step.task_text();
        tracing::info!(step = %step.name, file = %file.name, kind = %file.kind, "extracting attachment");

        if file.kind == AttachmentKind::Image {
            let bytes = tokio::fs::read(&file.path).await?;
            let uri = bytes_to_data_uri(AttachmentKind::image_mime(&file.name), &bytes);
            let prompt = prompts::vision_prompt(call.task, &step_task);
            let text = oracle_step(
                self.executor.oracle(),
                &step.name,
                self.executor.max_retries(),
                log,
                &prompt,
                Some(&uri),
            )
            .await?;
            return Ok(StepResult::Text(text));
        }

        let kind = file.kind.to_string();
        let prompt = prompts::extract_prompt(call.task, &step_task, &file.name, &kind, &self.capabilities);
        let job = ScriptJob::new(&step.name, &step_task, ResultShape::TablesOrText, InitialScript::Generate(prompt))
            .scope(
                Scope::new()
                    .bind("file_path", file.path.to_string_lossy().into_owned().into())
                    .bind("file_name", file.name.clone().into())
                    .bind("file_kind", kind.clone().into()),
            )
            .capabilities(self.capabilities.clone())
            .data_preview(format!("file `{}` ({}) at `file_path`", file.name, kind))
            .instructions(prompts::EXTRACT_INSTRUCTIONS);
        self.executor.execute(&job, log).await
    }
}
