//! 编排器：PLANNING -> EXECUTING(i) -> SUCCESS | FAILED，外层整体重试
//!
//! 步骤严格按计划顺序串行执行；任一步骤失败即中止本次运行。
//! RecoveryEngine 判定为 Replan 且仍有预算时，丢弃整个上下文，从原始任务文本重新规划（新的 TaskRun）；
//! 判定为 Abort（如附件解析失败）时直接结束。

use std::path::PathBuf;

use crate::core::{AgentError, RecoveryAction, RecoveryEngine, RunPhase, TaskRun};
use crate::plan::Planner;
use crate::submission::{Attachment, AttachmentSet};
use crate::tools::{ToolCall, ToolRegistry};

pub struct Orchestrator {
    planner: Planner,
    tools: ToolRegistry,
    recovery: RecoveryEngine,
    max_run_retries: u32,
    attachment_preview_chars: usize,
    workspace_root: Option<PathBuf>,
}

impl Orchestrator {
    pub fn new(planner: Planner, tools: ToolRegistry, max_run_retries: u32) -> Self {
        Self {
            planner,
            tools,
            recovery: RecoveryEngine::new(),
            max_run_retries: max_run_retries.max(1),
            attachment_preview_chars: 1500,
            workspace_root: None,
        }
    }

    pub fn with_attachment_preview_chars(mut self, chars: usize) -> Self {
        self.attachment_preview_chars = chars;
        self
    }

    pub fn with_workspace_root(mut self, root: Option<PathBuf>) -> Self {
        self.workspace_root = root;
        self
    }

    /// 运行一个任务；从不返回错误，失败记录在返回的 TaskRun.error 中
    pub async fn run(&self, task: &str, attachments: Vec<Attachment>) -> TaskRun {
        let attachments = match AttachmentSet::materialize(attachments, self.workspace_root.as_deref()) {
            Ok(set) => set,
            Err(e) => {
                tracing::error!(error = %e, "failed to materialize attachments");
                let mut run = TaskRun::new(task);
                run.error = Some(e.to_string());
                run.phase = RunPhase::Failed;
                return run;
            }
        };
        let previews = attachments.previews(self.attachment_preview_chars);

        let mut attempt = 1;
        loop {
            let mut run = TaskRun::new(task);
            tracing::info!(run = %run.id, attempt, "task run started");

            let err = match self.run_once(&mut run, &attachments, &previews).await {
                Ok(()) => {
                    advance(&mut run, RunPhase::Success);
                    tracing::info!(run = %run.id, steps = run.context.len(), "task run succeeded");
                    return run;
                }
                Err(e) => e,
            };

            tracing::error!(run = %run.id, attempt, error = %err, "task run failed");
            run.error = Some(err.to_string());
            advance(&mut run, RunPhase::Failed);

            let retryable = !matches!(self.recovery.handle(&err), RecoveryAction::Abort);
            if !retryable || attempt >= self.max_run_retries {
                return run;
            }
            attempt += 1;
            tracing::info!(attempt, "re-planning from the original task");
        }
    }

    async fn run_once(
        &self,
        run: &mut TaskRun,
        attachments: &AttachmentSet,
        previews: &str,
    ) -> Result<(), AgentError> {
        self.planner.plan(run, previews).await?;

        for i in 0..run.plan.len() {
            advance(run, RunPhase::Executing { step: i });
            let step = &run.plan[i];
            if let Some(missing) = step.depends_on.iter().find(|d| !run.context.contains(d)) {
                return Err(AgentError::PlanMalformed(format!(
                    "step '{}' needs '{}', which has not been produced",
                    step.name, missing
                )));
            }
            tracing::info!(step = %step.name, tool = %step.tool, index = i, "executing step");

            let call = ToolCall {
                step,
                task: &run.original_task,
                context: &run.context,
                attachments,
            };
            let result = self.tools.invoke(call, &mut run.log).await?;
            run.context.insert(step.name.clone(), result)?;
        }

        run.final_result = run.context.last().map(|(_, r)| r.clone());
        Ok(())
    }
}

fn advance(run: &mut TaskRun, next: RunPhase) {
    if !run.phase.can_advance_to(&next) {
        tracing::debug!(from = ?run.phase, to = ?next, "unexpected phase transition");
    }
    run.phase = next;
}
