//! 核心编排层：错误与恢复、执行上下文、运行状态、编排器与构建器

pub mod builder;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod state;

pub use builder::{create_llm_from_config, AgentBuilder};
pub use context::{
    Column, ColumnType, CorrectionRecord, ExecutionContext, ExecutionLog, StepResult, Table, TaskRun,
    WIRE_KIND_KEY,
};
pub use error::{AgentError, RecoveryAction, ScriptFailure};
pub use orchestrator::Orchestrator;
pub use recovery::RecoveryEngine;
pub use state::RunPhase;
