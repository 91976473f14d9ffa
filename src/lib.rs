//! bee-analyst - Rust 数据分析智能体
//!
//! 模块划分：
//! - **agent**: 无头运行时（handle_task -> TaskReport，供 CLI / HTTP 调用）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、恢复策略、执行上下文、状态机、编排器与构建器
//! - **executor**: 自修正步骤执行器、结果形状校验、代码块提取
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）与 Oracle
//! - **plan**: Planner、计划解析与校验
//! - **sandbox**: 脚本沙箱（Scope、能力集、python 子进程实现）
//! - **submission**: 附件、任务文件识别、临时落盘与名称解析
//! - **tools**: 工具适配器（fetch、query、extract、analyze、summarize）与注册表
//! - **server**: axum HTTP 前端（feature `web`）

pub mod agent;
pub mod config;
pub mod core;
pub mod executor;
pub mod llm;
pub mod observability;
pub mod plan;
pub mod sandbox;
#[cfg(feature = "web")]
pub mod server;
pub mod submission;
pub mod tools;
