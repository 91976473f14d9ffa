//! 自修正执行层：脚本提取、结果契约、执行器循环

pub mod code;
pub mod shape;
pub mod step;

pub use code::extract_code;
pub use shape::{bytes_to_data_uri, is_data_uri, ResultShape};
pub use step::{InitialScript, ScriptGuard, ScriptJob, StepExecutor};
