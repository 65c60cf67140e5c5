//! 步骤执行器
//!
//! 按 Step.tool_name 查表并在超时内调用工具；无论成功、失败、超时还是取消都会调用 release()。
//! 成功时把输出写入 Working Memory（`step.<id>.output`，每步恰好一次），失败时不写内存。
//! 每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::time::timeout;

use crate::core::types::{ErrorInfo, ExecutionResult, Step};
use crate::core::{Interrupted, MindError, RunGuard};
use crate::memory::WorkingMemory;
use crate::tools::{ToolFault, ToolRegistry};

/// 审计日志中参数预览的最大字符数
const INPUT_PREVIEW_CHARS: usize = 200;

pub struct Executor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl Executor {
    pub fn new(registry: Arc<ToolRegistry>, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    /// 执行单个步骤；只有运行被取消或超时才返回 Err，其余失败都体现在 ExecutionResult 中
    pub async fn run(
        &self,
        step: &Step,
        memory: &mut WorkingMemory,
        guard: &RunGuard,
    ) -> Result<ExecutionResult, Interrupted> {
        let start = Instant::now();
        let cycle = memory.cycle();

        let Some(tool) = self.registry.get(&step.tool_name) else {
            let err = MindError::ToolNotFound(step.tool_name.clone());
            audit(step, "not_found", 0);
            let detail = json!({ "available_tools": self.registry.tool_names() });
            return Ok(ExecutionResult::failed(
                step,
                cycle,
                ErrorInfo::from_error(&err, detail),
                0,
            ));
        };

        let outcome = guard
            .run(timeout(self.timeout, tool.invoke(&step.tool_input)))
            .await;
        tool.release().await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let result = match outcome {
            Err(interrupted) => {
                audit(step, "interrupted", duration_ms);
                return Err(interrupted);
            }
            Ok(Err(_elapsed)) => {
                audit(step, "timeout", duration_ms);
                let err = MindError::ToolExecutionFault(format!(
                    "{} timed out after {}s",
                    step.tool_name,
                    self.timeout.as_secs()
                ));
                let detail = json!({ "timeout_secs": self.timeout.as_secs() });
                ExecutionResult::failed(step, cycle, ErrorInfo::from_error(&err, detail), duration_ms)
            }
            Ok(Ok(Err(ToolFault { message, detail }))) => {
                audit(step, "error", duration_ms);
                let err = MindError::ToolExecutionFault(message);
                ExecutionResult::failed(step, cycle, ErrorInfo::from_error(&err, detail), duration_ms)
            }
            Ok(Ok(Ok(output))) => match memory.record_step_output(step.id, output.clone()) {
                Ok(()) => {
                    audit(step, "ok", duration_ms);
                    ExecutionResult::succeeded(step, cycle, output, duration_ms)
                }
                // 输出写不进内存的步骤不算成功
                Err(e) => {
                    audit(step, "unrecorded", duration_ms);
                    let err = MindError::ToolExecutionFault(e.to_string());
                    let detail = json!({ "memory_key": step.memory_key(), "output": output });
                    ExecutionResult::failed(step, cycle, ErrorInfo::from_error(&err, detail), duration_ms)
                }
            },
        };
        Ok(result)
    }
}

fn audit(step: &Step, outcome: &str, duration_ms: u64) {
    let audit = json!({
        "event": "tool_audit",
        "step_id": step.id,
        "tool": step.tool_name,
        "ok": outcome == "ok",
        "outcome": outcome,
        "duration_ms": duration_ms,
        "input_preview": input_preview(&Value::Object(step.tool_input.clone())),
    });
    tracing::info!(audit = %audit, "tool");
}

fn input_preview(input: &Value) -> String {
    let s = input.to_string();
    if s.chars().count() > INPUT_PREVIEW_CHARS {
        format!("{}...", s.chars().take(INPUT_PREVIEW_CHARS).collect::<String>())
    } else {
        s
    }
}
