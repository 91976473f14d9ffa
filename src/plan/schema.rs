//! 计划 JSON Schema（schemars 生成），拼入规划 prompt 以约束输出格式

use schemars::{schema_for, JsonSchema};
use serde::Deserialize;

use crate::plan::PlanStep;

/// 规划器期望的完整输出
#[allow(dead_code)]
#[derive(Deserialize, JsonSchema)]
struct PlanFormat {
    /// 简短的分步思路
    reasoning: String,
    /// 按执行顺序排列的步骤
    steps: Vec<PlanStep>,
}

pub fn plan_schema_json() -> String {
    let schema = schema_for!(PlanFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}
