//! Oracle 回复的线上格式与 JSON Schema（schemars 自动生成）
//!
//! Schema 注入 context 的 `reply_schema` 字段，减少 LLM 输出格式错误；
//! 回复先经 serde 严格校验，形状不符即 `OracleError::InvalidShape`，不做静默修正。

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::oracle::OracleError;

/// Planner 回复：`{"steps": [...]}`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PlanReply {
    /// 按执行顺序排列的步骤，至少一个
    pub steps: Vec<PlannedStep>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PlannedStep {
    /// 可省略；省略时按声明顺序编号 1..n。显式 id 必须严格递增
    #[serde(default)]
    pub id: Option<u32>,
    #[serde(default)]
    pub description: String,
    /// 工具名，必须来自 context 中的 tools 列表
    #[serde(alias = "tool_name")]
    pub tool: String,
    /// 工具参数，依工具的 parameters schema 而定
    #[serde(default, alias = "tool_input")]
    pub input: Map<String, Value>,
}

/// Error Repair 回复，按 `outcome` 区分
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RepairReply {
    /// 修订后的步骤（保持原 id）
    #[serde(alias = "revised_step")]
    Revised {
        #[serde(default)]
        description: Option<String>,
        #[serde(alias = "tool_name")]
        tool: String,
        #[serde(default, alias = "tool_input")]
        input: Map<String, Value>,
        #[serde(default, alias = "reason")]
        rationale: String,
    },
    /// 无法修复
    Unrecoverable {
        #[serde(default, alias = "reason")]
        rationale: String,
    },
}

/// Evaluator 回复
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct VerdictReply {
    pub satisfied: bool,
    #[serde(default)]
    pub rationale: String,
    /// 未满足时列出尚缺的内容；满足时为空
    #[serde(default)]
    pub missing: Vec<String>,
}

/// 生成类型 T 的 JSON Schema（作为 context 的一部分发送给 oracle）
pub fn schema_value<T: JsonSchema>() -> Value {
    serde_json::to_value(schema_for!(T)).unwrap_or(Value::Null)
}

/// 严格反序列化 oracle 回复；失败映射为 InvalidShape
pub fn parse_reply<T: DeserializeOwned>(value: Value) -> Result<T, OracleError> {
    serde_json::from_value(value).map_err(|e| OracleError::InvalidShape(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plan_reply_accepts_aliases() {
        let reply: PlanReply = parse_reply(json!({
            "steps": [{"tool_name": "calculator", "tool_input": {"expression": "5!"}}]
        }))
        .unwrap();
        assert_eq!(reply.steps[0].tool, "calculator");
        assert_eq!(reply.steps[0].input["expression"], "5!");
        assert!(reply.steps[0].id.is_none());
    }

    #[test]
    fn test_plan_reply_requires_steps() {
        let err = parse_reply::<PlanReply>(json!({"plan": []})).unwrap_err();
        assert!(matches!(err, OracleError::InvalidShape(msg) if msg.contains("steps")));
    }

    #[test]
    fn test_repair_reply_variants() {
        let revised: RepairReply = parse_reply(json!({
            "outcome": "revised",
            "tool": "echo",
            "input": {"text": "x"},
            "rationale": "use echo"
        }))
        .unwrap();
        assert!(matches!(revised, RepairReply::Revised { ref tool, .. } if tool == "echo"));

        let gave_up: RepairReply =
            parse_reply(json!({"outcome": "unrecoverable", "reason": "no way"})).unwrap();
        assert!(matches!(gave_up, RepairReply::Unrecoverable { ref rationale } if rationale == "no way"));

        assert!(parse_reply::<RepairReply>(json!({"outcome": "maybe"})).is_err());
    }

    #[test]
    fn test_verdict_reply_needs_satisfied() {
        assert!(parse_reply::<VerdictReply>(json!({"rationale": "?"})).is_err());
        let v: VerdictReply = parse_reply(json!({"satisfied": true})).unwrap();
        assert!(v.missing.is_empty());
    }

    #[test]
    fn test_schema_mentions_fields() {
        let schema = schema_value::<PlanReply>().to_string();
        assert!(schema.contains("steps"));
        assert!(schema.contains("tool"));
    }
}
