//! Planner：把 Intent（及上一轮 Verdict）交给 oracle，产出经校验的 Plan
//!
//! 空计划、id 不递增、缺工具名都是 InvalidShape，进入有界重试；重试耗尽则返回 OracleError。
//! 未注册的工具名不拒绝，而是标记 `deferred_lookup`，交给 Executor / Error Repair 处理。

use std::sync::Arc;

use serde_json::{json, Value};

use crate::cognition::schema::{parse_reply, schema_value, PlanReply};
use crate::core::types::{Plan, Step, StepId, Verdict};
use crate::core::RecoveryEngine;
use crate::intent::Intent;
use crate::memory::WorkingMemory;
use crate::oracle::{ask_with_retries, OracleError, ReasoningOracle, Stage};
use crate::tools::ToolRegistry;

pub struct Planner {
    oracle: Arc<dyn ReasoningOracle>,
    registry: Arc<ToolRegistry>,
    recovery: RecoveryEngine,
    prompt: String,
    max_retries: u32,
}

impl Planner {
    pub fn new(
        oracle: Arc<dyn ReasoningOracle>,
        registry: Arc<ToolRegistry>,
        prompt: impl Into<String>,
        max_retries: u32,
    ) -> Self {
        Self {
            oracle,
            registry,
            recovery: RecoveryEngine::new(),
            prompt: prompt.into(),
            max_retries,
        }
    }

    pub async fn generate(
        &self,
        intent: &Intent,
        memory: &WorkingMemory,
        last_verdict: Option<&Verdict>,
    ) -> Result<Plan, OracleError> {
        let context = json!({
            "stage": Stage::Planning,
            "intent": intent,
            "tools": self.registry.catalog(),
            "memory": memory.snapshot(),
            "last_verdict": last_verdict,
            "reply_schema": schema_value::<PlanReply>(),
        });

        let plan = ask_with_retries(
            self.oracle.as_ref(),
            &self.recovery,
            &self.prompt,
            context,
            self.max_retries,
            |reply| self.admit(reply),
        )
        .await?;

        tracing::info!(
            cycle = memory.cycle(),
            steps = plan.len(),
            replan = last_verdict.is_some(),
            "plan generated"
        );
        Ok(plan)
    }

    /// 校验并转换 oracle 回复
    fn admit(&self, reply: Value) -> Result<Plan, OracleError> {
        let reply: PlanReply = parse_reply(reply)?;
        // 未给出 id 的步骤接在前一步之后编号
        let mut previous_id: StepId = 0;
        let steps = reply
            .steps
            .into_iter()
            .map(|planned| {
                let id = planned.id.unwrap_or(previous_id.saturating_add(1));
                previous_id = id;
                let description = if planned.description.trim().is_empty() {
                    format!("invoke {}", planned.tool)
                } else {
                    planned.description
                };
                let mut step = Step::new(id, description, planned.tool, planned.input);
                if !self.registry.contains(&step.tool_name) {
                    tracing::warn!(step_id = id, tool = %step.tool_name, "plan references unregistered tool");
                    step.deferred_lookup = true;
                }
                step
            })
            .collect();
        Plan::new(steps).map_err(|e| OracleError::InvalidShape(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::ScriptedOracle;
    use crate::tools::{CalculatorTool, EchoTool};

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(CalculatorTool);
        Arc::new(registry)
    }

    fn intent() -> Intent {
        Intent::new("compute factorial", "factorial of 5").unwrap()
    }

    fn planner(oracle: Arc<ScriptedOracle>) -> Planner {
        Planner::new(oracle, registry(), "plan", 2)
    }

    #[tokio::test]
    async fn test_generate_numbers_steps_and_flags_unknown_tools() {
        let oracle = Arc::new(ScriptedOracle::new().with_reply(
            Stage::Planning,
            json!({"steps": [
                {"tool": "calculator", "input": {"expression": "5!"}},
                {"description": "look it up", "tool": "encyclopedia", "input": {}}
            ]}),
        ));
        let plan = planner(oracle.clone())
            .generate(&intent(), &WorkingMemory::new(), None)
            .await
            .unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.steps()[0].id, 1);
        assert_eq!(plan.steps()[1].id, 2);
        assert!(!plan.steps()[0].deferred_lookup);
        assert!(plan.steps()[1].deferred_lookup);

        let ctx = &oracle.contexts(Stage::Planning)[0];
        assert_eq!(ctx["intent"]["task"], "compute factorial");
        assert_eq!(ctx["last_verdict"], Value::Null);
        assert!(ctx["tools"].as_array().unwrap().len() == 2);
    }

    #[tokio::test]
    async fn test_empty_plan_exhausts_retries() {
        let oracle = Arc::new(ScriptedOracle::new().with_reply(Stage::Planning, json!({"steps": []})));
        let err = planner(oracle.clone())
            .generate(&intent(), &WorkingMemory::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::InvalidShape(_)));
        assert_eq!(oracle.call_count(Stage::Planning), 3);
    }

    #[tokio::test]
    async fn test_non_increasing_ids_rejected() {
        let oracle = Arc::new(
            ScriptedOracle::new()
                .with_reply(
                    Stage::Planning,
                    json!({"steps": [
                        {"id": 2, "tool": "echo", "input": {"text": "a"}},
                        {"id": 1, "tool": "echo", "input": {"text": "b"}}
                    ]}),
                )
                .with_reply(
                    Stage::Planning,
                    json!({"steps": [{"id": 7, "tool": "echo", "input": {"text": "a"}}]}),
                ),
        );
        let plan = planner(oracle.clone())
            .generate(&intent(), &WorkingMemory::new(), None)
            .await
            .unwrap();
        assert_eq!(plan.steps()[0].id, 7);
        assert!(oracle.contexts(Stage::Planning)[1].get("correction").is_some());
    }

    #[tokio::test]
    async fn test_implicit_ids_follow_explicit_ones() {
        let oracle = Arc::new(ScriptedOracle::new().with_reply(
            Stage::Planning,
            json!({"steps": [
                {"id": 3, "tool": "echo", "input": {"text": "a"}},
                {"tool": "echo", "input": {"text": "b"}},
                {"id": 9, "tool": "echo", "input": {"text": "c"}},
                {"tool": "echo", "input": {"text": "d"}}
            ]}),
        ));
        let plan = planner(oracle.clone())
            .generate(&intent(), &WorkingMemory::new(), None)
            .await
            .unwrap();
        let ids: Vec<StepId> = plan.steps().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![3, 4, 9, 10]);
        assert_eq!(oracle.call_count(Stage::Planning), 1);
    }

    #[tokio::test]
    async fn test_replan_context_carries_verdict() {
        let oracle = Arc::new(ScriptedOracle::new().with_reply(
            Stage::Planning,
            json!({"steps": [{"tool": "echo", "input": {"text": "again"}}]}),
        ));
        let verdict = Verdict::unsatisfied("not yet", vec!["the number 120".to_string()]);
        planner(oracle.clone())
            .generate(&intent(), &WorkingMemory::new(), Some(&verdict))
            .await
            .unwrap();
        let ctx = &oracle.contexts(Stage::Planning)[0];
        assert_eq!(ctx["last_verdict"]["missing"][0], "the number 120");
    }
}
