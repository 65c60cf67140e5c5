//! Error Repair：针对失败步骤向 oracle 索取修订版步骤或「不可修复」结论
//!
//! 除 Orchestrator 传入的尝试序号外不保存任何状态。修订步骤保留原 id；
//! 若修订引用了未注册的工具，记为 malformed（同样消耗一次修复预算）。

use std::sync::Arc;

use serde_json::json;

use crate::cognition::schema::{parse_reply, schema_value, RepairReply};
use crate::core::types::{ErrorInfo, RepairAttempt, RepairOutcome, Step};
use crate::core::RecoveryEngine;
use crate::memory::WorkingMemory;
use crate::oracle::{ask_with_retries, OracleError, ReasoningOracle, Stage};
use crate::tools::ToolRegistry;

pub struct ErrorRepair {
    oracle: Arc<dyn ReasoningOracle>,
    registry: Arc<ToolRegistry>,
    recovery: RecoveryEngine,
    prompt: String,
    max_retries: u32,
}

impl ErrorRepair {
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

    pub async fn repair(
        &self,
        step: &Step,
        error: &ErrorInfo,
        memory: &WorkingMemory,
        attempt_number: u32,
    ) -> Result<RepairAttempt, OracleError> {
        let context = json!({
            "stage": Stage::Repair,
            "failed_step": step,
            "error": error,
            "attempt_number": attempt_number,
            "tools": self.registry.catalog(),
            "memory": memory.snapshot(),
            "reply_schema": schema_value::<RepairReply>(),
        });

        let reply: RepairReply = ask_with_retries(
            self.oracle.as_ref(),
            &self.recovery,
            &self.prompt,
            context,
            self.max_retries,
            parse_reply,
        )
        .await?;

        let attempt = |outcome, revised_step, rationale: String| RepairAttempt {
            original_step: step.clone(),
            error: error.clone(),
            attempt_number,
            outcome,
            revised_step,
            rationale,
        };

        let result = match reply {
            RepairReply::Unrecoverable { rationale } => {
                let rationale = if rationale.trim().is_empty() {
                    "oracle declared the failure unrecoverable".to_string()
                } else {
                    rationale
                };
                attempt(RepairOutcome::Unrecoverable, None, rationale)
            }
            RepairReply::Revised { tool, .. } if !self.registry.contains(&tool) => attempt(
                RepairOutcome::Malformed,
                None,
                format!("proposed tool '{}' is not registered", tool),
            ),
            RepairReply::Revised {
                description,
                tool,
                input,
                rationale,
            } => {
                let description = description
                    .filter(|d| !d.trim().is_empty())
                    .unwrap_or_else(|| step.description.clone());
                let revised = step.revised(description, tool, input);
                attempt(RepairOutcome::RevisedStep, Some(revised), rationale)
            }
        };

        tracing::info!(
            step_id = step.id,
            attempt = attempt_number,
            outcome = ?result.outcome,
            "repair proposed"
        );
        Ok(result)
    }
}
