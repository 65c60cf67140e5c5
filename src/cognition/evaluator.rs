//! Evaluator：判断目标是否达成
//!
//! 只读：不执行工具、不修改内存。执行日志为空时不调用 oracle，直接给出未满足结论。
//! 同样的日志与内存产生同样的 context，结论只取决于 oracle 对该 context 的回答。

use std::sync::Arc;

use serde_json::json;

use crate::cognition::schema::{parse_reply, schema_value, VerdictReply};
use crate::core::types::{ExecutionResult, Verdict};
use crate::core::RecoveryEngine;
use crate::intent::Intent;
use crate::memory::WorkingMemory;
use crate::oracle::{ask_with_retries, OracleError, ReasoningOracle, Stage};

pub struct Evaluator {
    oracle: Arc<dyn ReasoningOracle>,
    recovery: RecoveryEngine,
    prompt: String,
    max_retries: u32,
}

impl Evaluator {
    pub fn new(oracle: Arc<dyn ReasoningOracle>, prompt: impl Into<String>, max_retries: u32) -> Self {
        Self {
            oracle,
            recovery: RecoveryEngine::new(),
            prompt: prompt.into(),
            max_retries,
        }
    }

    pub async fn assess(
        &self,
        intent: &Intent,
        memory: &WorkingMemory,
        execution_log: &[ExecutionResult],
    ) -> Result<Verdict, OracleError> {
        if execution_log.is_empty() {
            return Ok(Verdict::unsatisfied(
                "no step was executed",
                vec!["no execution results to evaluate".to_string()],
            ));
        }

        let context = json!({
            "stage": Stage::Evaluation,
            "goal": intent.goal(),
            "expected_output": intent.expected_output(),
            "constraints": intent.constraints(),
            "memory": memory.snapshot(),
            "execution_log": execution_log,
            "reply_schema": schema_value::<VerdictReply>(),
        });

        let reply: VerdictReply = ask_with_retries(
            self.oracle.as_ref(),
            &self.recovery,
            &self.prompt,
            context,
            self.max_retries,
            parse_reply,
        )
        .await?;

        let verdict = normalize(reply, intent);
        tracing::info!(
            satisfied = verdict.satisfied,
            missing = verdict.missing.len(),
            "verdict reached"
        );
        Ok(verdict)
    }
}

/// satisfied 时清空 missing；未满足且 missing 为空时补一条以目标为内容的条目
fn normalize(reply: VerdictReply, intent: &Intent) -> Verdict {
    let rationale = if reply.rationale.trim().is_empty() {
        if reply.satisfied {
            "goal reported as achieved".to_string()
        } else {
            "goal reported as not achieved".to_string()
        }
    } else {
        reply.rationale
    };

    if reply.satisfied {
        return Verdict::satisfied(rationale);
    }

    let mut missing: Vec<String> = reply
        .missing
        .into_iter()
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .collect();
    if missing.is_empty() {
        missing.push(format!("goal not confirmed: {}", intent.goal()));
    }
    Verdict::unsatisfied(rationale, missing)
}
