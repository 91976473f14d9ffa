//! 工具层：适配器 trait 与注册表，以及 fetch / query / extract / analyze / summarize 五种适配器

pub mod analyze;
pub mod extract;
pub mod fetch;
pub mod html_table;
pub mod prompts;
pub mod query;
pub mod registry;
pub mod summarize;

use crate::core::{AgentError, ExecutionLog};
use crate::llm::Oracle;

pub use analyze::AnalyzeTool;
pub use extract::ExtractTool;
pub use fetch::FetchTool;
pub use query::QueryTool;
pub use registry::{ToolAdapter, ToolCall, ToolRegistry};
pub use summarize::SummarizeTool;

/// prompt 中上下文预览的大小
#[derive(Debug, Clone, Copy)]
pub struct PreviewLimits {
    pub rows: usize,
    pub chars: usize,
}

impl Default for PreviewLimits {
    fn default() -> Self {
        Self { rows: 5, chars: 2000 }
    }
}

/// 纯 Oracle 步骤（总结、图像理解）：不可用的回复按失败计数，最多 max_attempts 次
pub(crate) async fn oracle_step(
    oracle: &Oracle,
    step: &str,
    max_attempts: u32,
    log: &mut ExecutionLog,
    prompt: &str,
    image_url: Option<&str>,
) -> Result<String, AgentError> {
    let mut last_error = String::new();
    for attempt in 1..=max_attempts.max(1) {
        let reply = match image_url {
            Some(url) => oracle.generate_with_image(prompt, url).await,
            None => oracle.generate(prompt).await,
        };
        if !Oracle::is_failure(&reply) {
            return Ok(reply.trim().to_string());
        }
        last_error = AgentError::OracleUnusable(reply.trim().to_string()).to_string();
        tracing::warn!(step = %step, attempt, error = %last_error, "oracle step failed");
        log.record(step, attempt, &last_error, "");
    }
    Err(AgentError::StepFailed {
        step: step.to_string(),
        attempts: max_attempts.max(1),
        last_error,
    })
}
