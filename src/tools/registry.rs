//! 工具适配器注册表
//!
//! 每种 ToolKind 对应一个 ToolAdapter：组装 scope、契约与 prompt，交给 StepExecutor 执行；
//! ToolRegistry 按 ToolKind 注册与分发。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{AgentError, ExecutionContext, ExecutionLog, StepResult};
use crate::plan::{PlanStep, ToolKind};
use crate::submission::AttachmentSet;

/// 一次工具调用可见的全部输入
pub struct ToolCall<'a> {
    pub step: &'a PlanStep,
    /// 原始任务全文（提供路径、schema 等提示）
    pub task: &'a str,
    pub context: &'a ExecutionContext,
    pub attachments: &'a AttachmentSet,
}

/// 工具适配器 trait
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    fn kind(&self) -> ToolKind;

    async fn invoke(&self, call: ToolCall<'_>, log: &mut ExecutionLog) -> Result<StepResult, AgentError>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<ToolKind, Arc<dyn ToolAdapter>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl ToolAdapter + 'static) {
        self.tools.insert(tool.kind(), Arc::new(tool));
    }

    pub fn get(&self, kind: ToolKind) -> Option<Arc<dyn ToolAdapter>> {
        self.tools.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<ToolKind> {
        ToolKind::ALL.into_iter().filter(|k| self.tools.contains_key(k)).collect()
    }

    pub async fn invoke(&self, call: ToolCall<'_>, log: &mut ExecutionLog) -> Result<StepResult, AgentError> {
        let kind = call.step.tool;
        let tool = self
            .tools
            .get(&kind)
            .ok_or_else(|| AgentError::PlanMalformed(format!("no adapter registered for tool '{kind}'")))?;
        tool.invoke(call, log).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Constant;

    #[async_trait]
    impl ToolAdapter for Constant {
        fn kind(&self) -> ToolKind {
            ToolKind::Summarize
        }

        async fn invoke(&self, call: ToolCall<'_>, _log: &mut ExecutionLog) -> Result<StepResult, AgentError> {
            Ok(StepResult::Text(format!("summary of {}", call.step.name)))
        }
    }

    #[tokio::test]
    async fn test_dispatch_by_kind() {
        let mut registry = ToolRegistry::new();
        registry.register(Constant);
        assert_eq!(registry.kinds(), vec![ToolKind::Summarize]);

        let ctx = ExecutionContext::new();
        let attachments = AttachmentSet::empty();
        let mut log = ExecutionLog::new();
        let step = PlanStep::new("s", ToolKind::Summarize, json!("x"));
        let call = ToolCall { step: &step, task: "t", context: &ctx, attachments: &attachments };
        assert_eq!(
            registry.invoke(call, &mut log).await.unwrap(),
            StepResult::Text("summary of s".into())
        );

        let step = PlanStep::new("q", ToolKind::Query, json!("x"));
        let call = ToolCall { step: &step, task: "t", context: &ctx, attachments: &attachments };
        assert!(matches!(registry.invoke(call, &mut log).await, Err(AgentError::PlanMalformed(_))));
    }
}
