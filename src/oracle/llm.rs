//! LlmOracle：把文本型 LlmClient 适配为结构化 ReasoningOracle
//!
//! prompt 作为 system 消息，context 以格式化 JSON 作为 user 消息；从回复中提取 JSON 对象
//! （```json 代码块或最外层花括号），提取或解析失败即 OracleError::Unparseable。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::oracle::{LlmClient, Message, OracleError, ReasoningOracle};

/// 错误信息中保留的原始回复最大字符数
const RAW_PREVIEW_CHARS: usize = 500;

/// 从模型输出中截取 JSON 文本：优先 ```json 代码块，其次最外层 `{ ... }`
pub fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// 解析模型回复为 JSON 对象
pub fn parse_oracle_reply(output: &str) -> Result<Value, OracleError> {
    let raw: String = output.chars().take(RAW_PREVIEW_CHARS).collect();
    let json_str = extract_json(output).ok_or_else(|| OracleError::Unparseable {
        raw: raw.clone(),
        reason: "no JSON object found".to_string(),
    })?;
    let value: Value = serde_json::from_str(json_str).map_err(|e| OracleError::Unparseable {
        raw: raw.clone(),
        reason: e.to_string(),
    })?;
    if !value.is_object() {
        return Err(OracleError::Unparseable {
            raw,
            reason: "reply is not a JSON object".to_string(),
        });
    }
    Ok(value)
}

pub struct LlmOracle {
    client: Arc<dyn LlmClient>,
}

impl LlmOracle {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReasoningOracle for LlmOracle {
    async fn complete(&self, prompt: &str, context: &Value) -> Result<Value, OracleError> {
        let context_text =
            serde_json::to_string_pretty(context).unwrap_or_else(|_| context.to_string());
        let messages = vec![Message::system(prompt), Message::user(context_text)];
        let output = self.client.complete(&messages).await?;
        tracing::debug!(chars = output.len(), "oracle reply received");
        parse_oracle_reply(&output)
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.client.token_usage()
    }
}
