//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock），以及面向任务的 Oracle 封装

pub mod deepseek;
pub mod message;
pub mod mock;
pub mod openai;
pub mod oracle;
pub mod traits;

pub use deepseek::{create_deepseek_client, DEEPSEEK_CHAT};
pub use message::{Message, Role};
pub use mock::MockLlmClient;
pub use openai::OpenAiClient;
pub use oracle::{Oracle, ORACLE_ERROR_PREFIX};
pub use traits::LlmClient;
