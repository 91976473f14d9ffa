//! 规划层：计划步骤、计划 Schema、Planner

pub mod planner;
pub mod schema;
pub mod step;

pub use planner::{parse_plan, validate_steps, Planner};
pub use schema::plan_schema_json;
pub use step::{PlanStep, ToolKind};
