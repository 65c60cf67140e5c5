//! Echo 工具（测试用）

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{Tool, ToolFault, ToolInput};

/// Echo 工具：回显文本
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo text back unchanged. Args: {\"text\": \"message\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "Text to echo" }
            },
            "required": ["text"]
        })
    }

    async fn invoke(&self, input: &ToolInput) -> Result<Value, ToolFault> {
        match input.get("text") {
            Some(Value::String(text)) => Ok(Value::String(text.clone())),
            Some(other) => Ok(Value::String(other.to_string())),
            None => Err(ToolFault::new("missing required argument `text`")
                .with_detail(serde_json::json!({ "received": input }))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    #[tokio::test]
    async fn test_echo_returns_text() {
        let mut input = Map::new();
        input.insert("text".to_string(), json!("hi"));
        assert_eq!(EchoTool.invoke(&input).await.unwrap(), json!("hi"));
    }

    #[tokio::test]
    async fn test_echo_requires_text() {
        let err = EchoTool.invoke(&Map::new()).await.unwrap_err();
        assert!(err.message.contains("text"));
    }
}
