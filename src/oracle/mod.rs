//! Oracle 层：LLM 传输（OpenAI 兼容 / DeepSeek）、结构化 ReasoningOracle 适配、离线与脚本化实现

pub mod deepseek;
pub mod llm;
pub mod message;
pub mod mock;
pub mod openai;
pub mod retry;
pub mod traits;

pub use deepseek::{create_deepseek_client, DEEPSEEK_CHAT, DEEPSEEK_REASONER};
pub use llm::{extract_json, parse_oracle_reply, LlmOracle};
pub use message::{Message, Role};
pub use mock::{MockOracle, ScriptedOracle};
pub use openai::{OpenAiClient, TokenUsage, OPENAI_DEFAULT_MODEL};
pub use retry::ask_with_retries;
pub use traits::{LlmClient, LlmError, OracleError, ReasoningOracle, Stage};
