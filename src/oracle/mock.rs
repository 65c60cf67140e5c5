//! 离线 Oracle（用于测试与无 API Key 时本地跑通流程）
//!
//! - MockOracle：确定性规则，按 stage 给出单步 echo 计划 / 拒绝修复 / 「有成功步骤即满足」的结论
//! - ScriptedOracle：按 stage 排队的预设回复，队列只剩一条时重复返回它（模拟始终相同的输出）

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::oracle::{OracleError, ReasoningOracle, Stage};

/// Mock Oracle：不调用任何模型
#[derive(Debug, Default)]
pub struct MockOracle;

#[async_trait]
impl ReasoningOracle for MockOracle {
    async fn complete(&self, _prompt: &str, context: &Value) -> Result<Value, OracleError> {
        match Stage::from_context(context) {
            Some(Stage::Planning) => {
                let task = context
                    .pointer("/intent/task")
                    .and_then(|v| v.as_str())
                    .unwrap_or("(no task)");
                Ok(json!({
                    "steps": [{
                        "description": "Echo the task back",
                        "tool": "echo",
                        "input": {"text": format!("Echo from Mock: {task}")}
                    }]
                }))
            }
            Some(Stage::Repair) => Ok(json!({
                "outcome": "unrecoverable",
                "reason": "mock oracle cannot repair steps"
            })),
            Some(Stage::Evaluation) => {
                let any_success = context
                    .get("execution_log")
                    .and_then(|v| v.as_array())
                    .map(|log| log.iter().any(|r| r["status"] == "succeeded"))
                    .unwrap_or(false);
                if any_success {
                    Ok(json!({"satisfied": true, "rationale": "a step completed successfully"}))
                } else {
                    Ok(json!({
                        "satisfied": false,
                        "rationale": "no step completed successfully",
                        "missing": ["at least one successful step"]
                    }))
                }
            }
            None => Err(OracleError::InvalidShape(
                "context carries no stage".to_string(),
            )),
        }
    }
}

/// 脚本化 Oracle：测试中按阶段预设回复，并记录每次调用的 context
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    scripts: Mutex<HashMap<Stage, VecDeque<Result<Value, OracleError>>>>,
    calls: Mutex<Vec<(Stage, Value)>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, stage: Stage, reply: Value) -> Self {
        self.push(stage, Ok(reply));
        self
    }

    pub fn with_error(self, stage: Stage, err: OracleError) -> Self {
        self.push(stage, Err(err));
        self
    }

    pub fn push(&self, stage: Stage, reply: Result<Value, OracleError>) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.entry(stage).or_default().push_back(reply);
        }
    }

    /// 某阶段被调用的次数
    pub fn call_count(&self, stage: Stage) -> usize {
        self.calls
            .lock()
            .map(|c| c.iter().filter(|(s, _)| *s == stage).count())
            .unwrap_or(0)
    }

    /// 某阶段每次调用收到的 context
    pub fn contexts(&self, stage: Stage) -> Vec<Value> {
        self.calls
            .lock()
            .map(|c| {
                c.iter()
                    .filter(|(s, _)| *s == stage)
                    .map(|(_, v)| v.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReasoningOracle for ScriptedOracle {
    async fn complete(&self, _prompt: &str, context: &Value) -> Result<Value, OracleError> {
        let stage = Stage::from_context(context)
            .ok_or_else(|| OracleError::InvalidShape("context carries no stage".to_string()))?;
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((stage, context.clone()));
        }
        let mut scripts = self
            .scripts
            .lock()
            .map_err(|_| OracleError::Unavailable("script lock poisoned".to_string()))?;
        let queue = scripts.entry(stage).or_default();
        match queue.len() {
            0 => Err(OracleError::Unavailable(format!(
                "no scripted reply for stage {}",
                stage.as_str()
            ))),
            1 => queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(OracleError::Unavailable("empty script".to_string()))),
            _ => queue
                .pop_front()
                .unwrap_or_else(|| Err(OracleError::Unavailable("empty script".to_string()))),
        }
    }
}
