//! Oracle：对 LlmClient 的任务级封装
//!
//! 调用永不返回 Err：后端错误或超时都被转成以 `LLM error` 开头的哨兵文本，
//! 由调用方通过 [`Oracle::is_failure`] 识别并按“可纠正错误”处理。

use std::sync::Arc;
use std::time::Duration;

use crate::llm::{LlmClient, Message};

pub const ORACLE_ERROR_PREFIX: &str = "LLM error";

const SYSTEM_PROMPT: &str = "You are a precise and efficient data analyst. \
Follow the requested output format exactly and never add commentary around code.";

pub struct Oracle {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl Oracle {
    pub fn new(llm: Arc<dyn LlmClient>, timeout_secs: u64) -> Self {
        Self {
            llm,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 文本生成
    pub async fn generate(&self, prompt: &str) -> String {
        let messages = [Message::system(SYSTEM_PROMPT), Message::user(prompt)];
        match tokio::time::timeout(self.timeout, self.llm.complete(&messages)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "oracle call failed");
                format!("{ORACLE_ERROR_PREFIX}: {e}")
            }
            Err(_) => {
                tracing::warn!(secs = self.timeout.as_secs(), "oracle call timed out");
                format!("{ORACLE_ERROR_PREFIX}: timed out after {}s", self.timeout.as_secs())
            }
        }
    }

    /// 图像理解：image_url 为 data URI 或 http(s) URL
    pub async fn generate_with_image(&self, prompt: &str, image_url: &str) -> String {
        match tokio::time::timeout(self.timeout, self.llm.complete_with_image(prompt, image_url)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "oracle vision call failed");
                format!("{ORACLE_ERROR_PREFIX}: {e}")
            }
            Err(_) => format!("{ORACLE_ERROR_PREFIX}: timed out after {}s", self.timeout.as_secs()),
        }
    }

    /// 空回复或哨兵文本均视为不可用
    pub fn is_failure(text: &str) -> bool {
        let t = text.trim();
        t.is_empty() || t.starts_with(ORACLE_ERROR_PREFIX)
    }
}
