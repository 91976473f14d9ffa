//! 无界面运行时：供 CLI 与 HTTP 前端调用
//!
//! handle_task 运行一个任务并返回 TaskReport；边界从不抛错，失败写在 report.error 中。

use std::path::PathBuf;

use serde::Serialize;
use uuid::Uuid;

use crate::config::{load_config, AppConfig};
use crate::core::{AgentBuilder, CorrectionRecord, Orchestrator, StepResult, TaskRun};
use crate::plan::PlanStep;
use crate::submission::Attachment;

/// 返回给调用方的任务报告
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub run_id: Uuid,
    pub task: String,
    /// 规划器输出的思路 / 原始计划文本（诊断用）
    pub plan_or_reasoning: String,
    /// 各表格结果的前几行 Markdown（诊断用）
    pub intermediate_table_previews: String,
    pub final_result: Option<StepResult>,
    pub error: Option<String>,
    pub plan: Vec<PlanStep>,
    pub corrections: Vec<CorrectionRecord>,
}

impl TaskReport {
    pub fn from_run(run: TaskRun, preview_rows: usize) -> Self {
        Self {
            intermediate_table_previews: run.table_previews(preview_rows),
            run_id: run.id,
            task: run.original_task,
            plan_or_reasoning: run.reasoning,
            final_result: run.final_result,
            error: run.error,
            plan: run.plan,
            corrections: run.log.records().to_vec(),
        }
    }
}

/// 加载配置（失败时使用默认值）并装配编排器
pub fn create_orchestrator(config_path: Option<PathBuf>) -> (Orchestrator, AppConfig) {
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    (AgentBuilder::new(cfg.clone()).build(), cfg)
}

/// 运行一个任务并生成报告
pub async fn handle_task(
    orchestrator: &Orchestrator,
    task: &str,
    attachments: Vec<Attachment>,
    preview_rows: usize,
) -> TaskReport {
    tracing::info!(chars = task.len(), attachments = attachments.len(), "task received");
    let run = orchestrator.run(task, attachments).await;
    TaskReport::from_run(run, preview_rows)
}
