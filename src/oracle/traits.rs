//! Oracle 抽象
//!
//! 两层：LlmClient 是文本传输（OpenAI 兼容 / DeepSeek），ReasoningOracle 是核心消费的结构化接口
//! `complete(prompt, context) -> Value`。Planner / Error Repair / Evaluator 只依赖 ReasoningOracle。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::oracle::Message;

/// LLM 传输层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited")]
    RateLimited { retry_after_ms: Option<u64> },

    /// 服务端明确拒绝（鉴权失败、请求非法等），重试无意义
    #[error("Request rejected: {0}")]
    Rejected(String),
}

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// Oracle 错误：传输失败、回复不是 JSON、JSON 结构不符三者可区分
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("oracle unavailable: {0}")]
    Unavailable(String),

    #[error("oracle rate limited")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("oracle rejected the request: {0}")]
    Rejected(String),

    #[error("unparseable oracle reply ({reason})")]
    Unparseable { raw: String, reason: String },

    #[error("oracle reply has invalid shape: {0}")]
    InvalidShape(String),
}

impl From<LlmError> for OracleError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Network(msg) => OracleError::Unavailable(msg),
            LlmError::RateLimited { retry_after_ms } => OracleError::RateLimited { retry_after_ms },
            LlmError::Rejected(msg) => OracleError::Rejected(msg),
        }
    }
}

/// 调用方阶段；写入 context 的 `stage` 字段，便于日志与脚本化测试按阶段区分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Planning,
    Repair,
    Evaluation,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Planning => "planning",
            Stage::Repair => "repair",
            Stage::Evaluation => "evaluation",
        }
    }

    /// 从 context 的 `stage` 字段读取
    pub fn from_context(context: &Value) -> Option<Self> {
        context
            .get("stage")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
    }
}

/// 推理 Oracle：给定 prompt 与结构化上下文，返回结构化 JSON
#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    async fn complete(&self, prompt: &str, context: &Value) -> Result<Value, OracleError>;

    /// 累计 token 使用统计，默认 (0, 0, 0)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_from_context() {
        let ctx = serde_json::json!({"stage": "repair", "step": {}});
        assert_eq!(Stage::from_context(&ctx), Some(Stage::Repair));
        assert_eq!(Stage::from_context(&serde_json::json!({})), None);
    }

    #[test]
    fn test_llm_error_maps_to_oracle_error() {
        let err: OracleError = LlmError::Rejected("bad key".to_string()).into();
        assert_eq!(err, OracleError::Rejected("bad key".to_string()));
        let err: OracleError = LlmError::Network("reset".to_string()).into();
        assert!(matches!(err, OracleError::Unavailable(_)));
    }
}
