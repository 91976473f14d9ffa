//! 构建器：从配置装配 LLM、沙箱、步骤执行器、工具注册表与编排器
//!
//! CLI 与 HTTP 前端共用同一套装配逻辑；测试可通过 with_llm / with_sandbox 注入替身。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::Orchestrator;
use crate::executor::StepExecutor;
use crate::llm::{create_deepseek_client, LlmClient, MockLlmClient, OpenAiClient, Oracle};
use crate::plan::Planner;
use crate::sandbox::{CapabilitySet, ProcessSandbox, ScriptSandbox};
use crate::tools::{
    AnalyzeTool, ExtractTool, FetchTool, PreviewLimits, QueryTool, SummarizeTool, ToolRegistry,
};

/// 根据配置与环境变量选择 LLM 后端（DeepSeek / OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let has_deepseek = std::env::var("DEEPSEEK_API_KEY").is_ok();
    let has_openai = std::env::var("OPENAI_API_KEY").is_ok();

    if has_deepseek && (provider == "deepseek" || !has_openai) {
        let model = cfg.llm.deepseek.model.clone();
        tracing::info!(model = ?model, "Using DeepSeek LLM");
        Arc::new(create_deepseek_client(model.as_deref(), cfg.llm.base_url.as_deref()))
    } else if has_openai {
        let model = cfg
            .llm
            .openai
            .model
            .clone()
            .unwrap_or_else(|| cfg.llm.model.clone());
        tracing::info!(model = %model, "Using OpenAI-compatible LLM");
        let client = OpenAiClient::new(
            cfg.llm.base_url.as_deref(),
            &model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
        );
        match &cfg.llm.vision_model {
            Some(vision) => Arc::new(client.with_vision_model(vision)),
            None => Arc::new(client),
        }
    } else {
        tracing::warn!("No API key set, using Mock LLM (every oracle call will fail)");
        Arc::new(MockLlmClient::new())
    }
}

pub struct AgentBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    sandbox: Option<Arc<dyn ScriptSandbox>>,
}

impl AgentBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            sandbox: None,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_sandbox(mut self, sandbox: Arc<dyn ScriptSandbox>) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn build_llm(&self) -> Arc<dyn LlmClient> {
        self.llm
            .clone()
            .unwrap_or_else(|| create_llm_from_config(&self.config))
    }

    pub fn build_sandbox(&self) -> Arc<dyn ScriptSandbox> {
        self.sandbox
            .clone()
            .unwrap_or_else(|| Arc::new(ProcessSandbox::from_config(&self.config.sandbox)))
    }

    /// 所有工具共享同一个执行器（同一沙箱、Oracle 与重试预算）
    pub fn build_tool_registry(&self, executor: Arc<StepExecutor>) -> ToolRegistry {
        let caps = &self.config.sandbox.capabilities;
        let preview = PreviewLimits {
            rows: self.config.agent.preview_rows,
            chars: self.config.agent.preview_chars,
        };
        let grant = |list: &[crate::sandbox::Capability]| list.iter().collect::<CapabilitySet>();

        let mut tools = ToolRegistry::new();
        tools.register(FetchTool::new(
            executor.clone(),
            grant(&caps.fetch),
            &self.config.tools.fetch,
            preview,
        ));
        tools.register(QueryTool::new(executor.clone(), grant(&caps.query), preview));
        tools.register(ExtractTool::new(executor.clone(), grant(&caps.extract)));
        tools.register(AnalyzeTool::new(executor.clone(), grant(&caps.analyze), preview));
        tools.register(SummarizeTool::new(executor, preview));
        tools
    }

    pub fn build(&self) -> Orchestrator {
        let oracle = Arc::new(Oracle::new(self.build_llm(), self.config.llm.timeouts.request));
        let executor = Arc::new(StepExecutor::new(
            self.build_sandbox(),
            oracle.clone(),
            self.config.agent.max_step_retries,
        ));
        let planner = Planner::new(oracle, self.config.agent.max_plan_retries);
        Orchestrator::new(
            planner,
            self.build_tool_registry(executor),
            self.config.agent.max_run_retries,
        )
        .with_attachment_preview_chars(self.config.tools.extract.text_preview_chars)
        .with_workspace_root(self.config.app.workspace_root.clone())
    }
}
