//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction：步骤执行器据此决定是否请求修正脚本，
//! Orchestrator 据此决定是否整体重新规划。

use crate::core::{AgentError, RecoveryAction};

/// 语义化错误恢复：将错误映射为可执行动作（修正脚本 / 重新规划 / 终止）
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::ScriptFailed(failure) => RecoveryAction::CorrectScript(failure.to_string()),
            AgentError::ContractViolation(msg) => RecoveryAction::CorrectScript(format!(
                "The script ran but violated the result contract: {msg}"
            )),
            AgentError::OracleUnusable(msg) => RecoveryAction::CorrectScript(format!(
                "No usable script was produced ({msg}). Write the complete script again."
            )),
            AgentError::Timeout(msg) => RecoveryAction::CorrectScript(format!(
                "The script exceeded its execution deadline ({msg}). Make it cheaper."
            )),
            AgentError::PlanMalformed(_) | AgentError::StepFailed { .. } | AgentError::Fetch(_) => {
                RecoveryAction::Replan
            }
            // 缺失的文件不会因为重写脚本或重新规划而出现
            AgentError::Resolution(_) | AgentError::Io(_) | AgentError::Config(_) => {
                RecoveryAction::Abort
            }
        }
    }
}
