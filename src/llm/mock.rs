//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按顺序返回预置回复，并记录收到的每条 prompt；预置回复耗尽后返回错误，
//! 由 Oracle 转为哨兵文本。未配置任何 API Key 时也用它兜底。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, Message, Role};

#[derive(Debug, Default)]
pub struct MockLlmClient {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 已收到的 prompt（按调用顺序）
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn next(&self, prompt: String) -> Result<String, String> {
        if let Ok(mut p) = self.prompts.lock() {
            p.push(prompt);
        }
        self.responses
            .lock()
            .map_err(|e| e.to_string())?
            .pop_front()
            .ok_or_else(|| "mock: no scripted response left".to_string())
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.next(last_user)
    }

    async fn complete_with_image(&self, prompt: &str, image_url: &str) -> Result<String, String> {
        let head: String = image_url.chars().take(32).collect();
        self.next(format!("{prompt}\n[image: {head}]"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses_in_order() {
        let mock = MockLlmClient::with_responses(["one", "two"]);
        assert_eq!(mock.complete(&[Message::user("a")]).await.unwrap(), "one");
        assert_eq!(mock.complete(&[Message::user("b")]).await.unwrap(), "two");
        assert!(mock.complete(&[Message::user("c")]).await.is_err());
        assert_eq!(mock.prompts(), vec!["a", "b", "c"]);
    }
}
