//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 `.env`（API Key），再读 TOML 文件，最后用环境变量 `ANALYST__*` 覆盖
//! （双下划线表示嵌套，如 `ANALYST__AGENT__MAX_STEP_RETRIES=5`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::sandbox::Capability;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub sandbox: SandboxSection,
    pub agent: AgentSection,
    pub tools: ToolsSection,
    pub web: WebSection,
}

/// [app] 段：应用名、工作目录
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 附件临时目录的父目录，未设置时用系统临时目录
    pub workspace_root: Option<PathBuf>,
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：deepseek / openai；优先级由 API Key 与 provider 共同决定
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 图像理解使用的模型；未设置时用 openai.model
    pub vision_model: Option<String>,
    #[serde(default)]
    pub deepseek: LlmDeepSeekSection,
    #[serde(default)]
    pub openai: LlmOpenAiSection,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            vision_model: None,
            deepseek: LlmDeepSeekSection::default(),
            openai: LlmOpenAiSection::default(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmDeepSeekSection {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmOpenAiSection {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次 Oracle 调用超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    90
}

/// [sandbox] 段：脚本解释器、单次执行超时、各工具授予的能力集
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxSection {
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    #[serde(default = "default_sandbox_timeout_secs")]
    pub timeout_secs: u64,
    /// 捕获 stdout/stderr 的最大字符数（写入日志用）
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,
    /// 传递给子进程的环境变量名（其余环境变量一律清除）
    #[serde(default = "default_passthrough_env")]
    pub passthrough_env: Vec<String>,
    #[serde(default)]
    pub capabilities: CapabilitiesSection,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            timeout_secs: default_sandbox_timeout_secs(),
            max_output_chars: default_max_output_chars(),
            passthrough_env: default_passthrough_env(),
            capabilities: CapabilitiesSection::default(),
        }
    }
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_sandbox_timeout_secs() -> u64 {
    120
}

fn default_max_output_chars() -> usize {
    4000
}

fn default_passthrough_env() -> Vec<String> {
    vec![
        "PATH".into(),
        "LANG".into(),
        "PYTHONPATH".into(),
        "VIRTUAL_ENV".into(),
    ]
}

/// [sandbox.capabilities] 段：每种工具可用的库能力
#[derive(Debug, Clone, Deserialize)]
pub struct CapabilitiesSection {
    #[serde(default = "default_fetch_caps")]
    pub fetch: Vec<Capability>,
    #[serde(default = "default_query_caps")]
    pub query: Vec<Capability>,
    #[serde(default = "default_extract_caps")]
    pub extract: Vec<Capability>,
    #[serde(default = "default_analyze_caps")]
    pub analyze: Vec<Capability>,
}

impl Default for CapabilitiesSection {
    fn default() -> Self {
        Self {
            fetch: default_fetch_caps(),
            query: default_query_caps(),
            extract: default_extract_caps(),
            analyze: default_analyze_caps(),
        }
    }
}

fn default_fetch_caps() -> Vec<Capability> {
    vec![Capability::Tabular, Capability::Html]
}

fn default_query_caps() -> Vec<Capability> {
    vec![Capability::Tabular, Capability::Sql]
}

fn default_extract_caps() -> Vec<Capability> {
    vec![Capability::Tabular, Capability::Documents]
}

fn default_analyze_caps() -> Vec<Capability> {
    vec![
        Capability::Tabular,
        Capability::Plotting,
        Capability::Stats,
    ]
}

/// [agent] 段：重试预算与预览大小
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    /// 单步骤最多执行次数（含首次）
    #[serde(default = "default_max_step_retries")]
    pub max_step_retries: u32,
    /// 整体任务最多运行次数（含首次）
    #[serde(default = "default_max_run_retries")]
    pub max_run_retries: u32,
    /// 规划阶段最多请求次数
    #[serde(default = "default_max_plan_retries")]
    pub max_plan_retries: u32,
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_step_retries: default_max_step_retries(),
            max_run_retries: default_max_run_retries(),
            max_plan_retries: default_max_plan_retries(),
            preview_rows: default_preview_rows(),
            preview_chars: default_preview_chars(),
        }
    }
}

fn default_max_step_retries() -> u32 {
    3
}

fn default_max_run_retries() -> u32 {
    2
}

fn default_max_plan_retries() -> u32 {
    3
}

fn default_preview_rows() -> usize {
    5
}

fn default_preview_chars() -> usize {
    2000
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ToolsSection {
    #[serde(default)]
    pub fetch: FetchSection,
    #[serde(default)]
    pub extract: ExtractSection,
}

/// [tools.fetch] 段：抓取网页的超时、UA、HTML 片段长度、域名白名单（空表示不限制）
#[derive(Debug, Clone, Deserialize)]
pub struct FetchSection {
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_max_html_chars")]
    pub max_html_chars: usize,
    #[serde(default)]
    pub allowed_domains: Vec<String>,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout_secs(),
            user_agent: default_user_agent(),
            max_html_chars: default_max_html_chars(),
            allowed_domains: Vec::new(),
        }
    }
}

fn default_fetch_timeout_secs() -> u64 {
    20
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".to_string()
}

fn default_max_html_chars() -> usize {
    5000
}

/// [tools.extract] 段
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractSection {
    /// 规划 prompt 中文本类附件的预览字符数
    #[serde(default = "default_text_preview_chars")]
    pub text_preview_chars: usize,
}

impl Default for ExtractSection {
    fn default() -> Self {
        Self {
            text_preview_chars: default_text_preview_chars(),
        }
    }
}

fn default_text_preview_chars() -> usize {
    1500
}

/// [web] 段：HTTP 前端监听端口（环境变量 ANALYST_WEB_PORT 优先）
#[derive(Debug, Clone, Deserialize)]
pub struct WebSection {
    #[serde(default = "default_web_port")]
    pub port: u16,
}

impl Default for WebSection {
    fn default() -> Self {
        Self {
            port: default_web_port(),
        }
    }
}

fn default_web_port() -> u16 {
    8080
}

/// 从 config 目录加载配置，环境变量 ANALYST__* 可覆盖
///
/// 1. 读取 `.env`（若存在），用于 OPENAI_API_KEY / DEEPSEEK_API_KEY
/// 2. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 3. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 4. 最后叠加环境变量 ANALYST__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let _ = dotenvy::dotenv();

    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("ANALYST")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.agent.max_step_retries, 3);
        assert_eq!(cfg.agent.max_run_retries, 2);
        assert_eq!(cfg.sandbox.interpreter, "python3");
        assert!(cfg.sandbox.capabilities.query.contains(&Capability::Sql));
        assert!(cfg.tools.fetch.allowed_domains.is_empty());
    }

    #[test]
    fn test_load_from_explicit_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[agent]\nmax_step_retries = 5\n\n[sandbox]\ntimeout_secs = 7\n\n[sandbox.capabilities]\nanalyze = [\"tabular\"]\n"
        )
        .unwrap();
        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.agent.max_step_retries, 5);
        assert_eq!(cfg.agent.max_plan_retries, 3);
        assert_eq!(cfg.sandbox.timeout_secs, 7);
        assert_eq!(cfg.sandbox.capabilities.analyze, vec![Capability::Tabular]);
    }
}
