//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient：complete（文本）、complete_with_image（图像理解）。

use async_trait::async_trait;

use crate::llm::Message;

/// LLM 客户端 trait；错误以字符串返回，由 Oracle 统一转为哨兵文本
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;

    /// 图像理解：prompt + 一张以 data URI 或 URL 表示的图片
    async fn complete_with_image(&self, _prompt: &str, _image_url: &str) -> Result<String, String> {
        Err("this provider does not support image input".to_string())
    }
}
