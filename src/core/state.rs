//! 任务运行状态机：PLANNING -> EXECUTING(i) -> SUCCESS | FAILED
//!
//! 整体重试时从 Planning 重新开始（新的 TaskRun）。

use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RunPhase {
    Planning,
    Executing { step: usize },
    Success,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Success | RunPhase::Failed)
    }

    /// 合法转移：Planning -> Executing(0)；Executing(i) -> Executing(i+1)；非终态 -> Success/Failed
    pub fn can_advance_to(&self, next: &RunPhase) -> bool {
        match (self, next) {
            (RunPhase::Planning, RunPhase::Executing { step: 0 }) => true,
            (RunPhase::Executing { step: a }, RunPhase::Executing { step: b }) => *b == a + 1,
            (RunPhase::Planning, RunPhase::Success) => false,
            (s, RunPhase::Success | RunPhase::Failed) => !s.is_terminal(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        assert!(RunPhase::Planning.can_advance_to(&RunPhase::Executing { step: 0 }));
        assert!(RunPhase::Executing { step: 0 }.can_advance_to(&RunPhase::Executing { step: 1 }));
        assert!(!RunPhase::Executing { step: 0 }.can_advance_to(&RunPhase::Executing { step: 2 }));
        assert!(RunPhase::Planning.can_advance_to(&RunPhase::Failed));
        assert!(!RunPhase::Planning.can_advance_to(&RunPhase::Success));
        assert!(!RunPhase::Success.can_advance_to(&RunPhase::Failed));
    }
}
