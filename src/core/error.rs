//! Agent 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 AgentError 决定 CorrectScript / Replan / Abort。

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// 沙箱内脚本运行失败的结构化描述（异常类型 + 消息 + 堆栈文本）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptFailure {
    pub kind: String,
    pub message: String,
    pub traceback: String,
}

impl ScriptFailure {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            traceback: String::new(),
        }
    }

    pub fn with_traceback(mut self, traceback: impl Into<String>) -> Self {
        self.traceback = traceback.into();
        self
    }
}

impl fmt::Display for ScriptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if !self.traceback.trim().is_empty() {
            write!(f, "\n{}", self.traceback.trim_end())?;
        }
        Ok(())
    }
}

/// 任务运行过程中可能出现的错误（Oracle、计划、脚本、契约、资源解析等）
#[derive(Error, Debug)]
pub enum AgentError {
    /// Oracle 返回了哨兵错误文本或空输出
    #[error("Oracle output unusable: {0}")]
    OracleUnusable(String),

    #[error("Plan malformed: {0}")]
    PlanMalformed(String),

    #[error("Script execution failed: {0}")]
    ScriptFailed(ScriptFailure),

    /// 脚本运行成功但 result 缺失或形状不符
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    /// 逻辑资源（如附件名）无法映射到实际文件；不重试
    #[error("Resolution failed: {0}")]
    Resolution(String),

    #[error("Step '{step}' failed after {attempts} attempts. Last error: {last_error}")]
    StepFailed {
        step: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 将失败脚本与错误交给 Oracle 生成替换脚本
    CorrectScript(String),
    /// 丢弃当前上下文，从原始任务文本重新规划
    Replan,
    /// 终止当前任务
    Abort,
}
