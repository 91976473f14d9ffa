//! DeepSeek 后端（OpenAI 兼容格式）
//!
//! - Base URL: https://api.deepseek.com（可被 `llm.base_url` 覆盖）
//! - 模型: deepseek-chat（默认），可用 `DEEPSEEK_MODEL` 或 `[llm.deepseek].model` 覆盖
//! - DeepSeek 无图像理解能力，图像请求会落到 vision_model 上，通常需单独配置 OpenAI 后端

use crate::llm::OpenAiClient;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";

/// 创建 DeepSeek 客户端；Key 取自 `DEEPSEEK_API_KEY`，模型优先取参数，其次 `DEEPSEEK_MODEL`
pub fn create_deepseek_client(model: Option<&str>, base_url: Option<&str>) -> OpenAiClient {
    let api_key = std::env::var("DEEPSEEK_API_KEY")
        .ok()
        .unwrap_or_else(|| "sk-placeholder".to_string());

    let model = model
        .map(String::from)
        .or_else(|| std::env::var("DEEPSEEK_MODEL").ok())
        .unwrap_or_else(|| DEEPSEEK_CHAT.to_string());

    OpenAiClient::new(
        Some(base_url.unwrap_or(DEEPSEEK_BASE_URL)),
        &model,
        Some(api_key.as_str()),
    )
}
