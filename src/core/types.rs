//! 数据模型：Step / Plan / ExecutionResult / ErrorInfo / RepairAttempt / Verdict / RunOutcome
//!
//! 全部可序列化（snake_case），既是 Oracle 上下文的组成部分，也是 CLI 输出的 RunOutcome 结构。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::core::MindError;

pub type StepId = u32;

/// Working Memory 中步骤输出的键（按 step id 命名空间）
pub fn step_output_key(id: StepId) -> String {
    format!("step.{id}.output")
}

/// 单个工具调用步骤；修复时生成新值，不原地修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub description: String,
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: Map<String, Value>,
    /// 规划时工具未注册，执行时再查表（失败交给 Repair）
    #[serde(default)]
    pub deferred_lookup: bool,
}

impl Step {
    pub fn new(
        id: StepId,
        description: impl Into<String>,
        tool_name: impl Into<String>,
        tool_input: Map<String, Value>,
    ) -> Self {
        Self {
            id,
            description: description.into(),
            tool_name: tool_name.into(),
            tool_input,
            deferred_lookup: false,
        }
    }

    /// 修复后的替代步骤：沿用原 id，保证执行日志中同一步骤可追溯
    pub fn revised(
        &self,
        description: impl Into<String>,
        tool_name: impl Into<String>,
        tool_input: Map<String, Value>,
    ) -> Self {
        Self::new(self.id, description, tool_name, tool_input)
    }

    pub fn memory_key(&self) -> String {
        step_output_key(self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("plan has no executable steps")]
    Empty,
    #[error("step ids must be strictly increasing ({previous} followed by {next})")]
    NonIncreasingIds { previous: StepId, next: StepId },
    #[error("step {0} does not name a tool")]
    MissingTool(StepId),
}

/// 一次 Planner 调用原子生成的步骤序列；非空且 id 严格递增
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    pub fn new(steps: Vec<Step>) -> Result<Self, PlanError> {
        if steps.is_empty() {
            return Err(PlanError::Empty);
        }
        for pair in steps.windows(2) {
            if pair[1].id <= pair[0].id {
                return Err(PlanError::NonIncreasingIds {
                    previous: pair[0].id,
                    next: pair[1].id,
                });
            }
        }
        if let Some(step) = steps.iter().find(|s| s.tool_name.trim().is_empty()) {
            return Err(PlanError::MissingTool(step.id));
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    /// 用修复后的步骤替换同一位置；id 必须一致，否则忽略并返回 false
    pub(crate) fn substitute(&mut self, index: usize, step: Step) -> bool {
        match self.steps.get_mut(index) {
            Some(slot) if slot.id == step.id => {
                *slot = step;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ToolNotFound,
    ToolExecutionError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::ToolNotFound => write!(f, "tool_not_found"),
            ErrorKind::ToolExecutionError => write!(f, "tool_execution_error"),
        }
    }
}

/// 步骤失败信息；raw_detail 为工具自定义诊断，编排器不解释
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default)]
    pub raw_detail: Value,
}

impl ErrorInfo {
    /// 从核心错误分类构造；仅工具层错误有对应 ErrorKind
    pub fn from_error(err: &MindError, raw_detail: Value) -> Self {
        let kind = match err {
            MindError::ToolNotFound(_) => ErrorKind::ToolNotFound,
            _ => ErrorKind::ToolExecutionError,
        };
        Self {
            kind,
            message: err.to_string(),
            raw_detail,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub step_id: StepId,
    pub tool_name: String,
    pub cycle: u32,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn succeeded(step: &Step, cycle: u32, output: Value, duration_ms: u64) -> Self {
        Self {
            step_id: step.id,
            tool_name: step.tool_name.clone(),
            cycle,
            status: StepStatus::Succeeded,
            output: Some(output),
            error: None,
            duration_ms,
        }
    }

    pub fn failed(step: &Step, cycle: u32, error: ErrorInfo, duration_ms: u64) -> Self {
        Self {
            step_id: step.id,
            tool_name: step.tool_name.clone(),
            cycle,
            status: StepStatus::Failed,
            output: None,
            error: Some(error),
            duration_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Succeeded
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairOutcome {
    RevisedStep,
    Unrecoverable,
    /// 修复建议未通过校验（如引用未注册工具），同样消耗一次预算
    Malformed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairAttempt {
    pub original_step: Step,
    pub error: ErrorInfo,
    pub attempt_number: u32,
    pub outcome: RepairOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revised_step: Option<Step>,
    pub rationale: String,
}

/// Evaluator 的结论；satisfied 时 missing 为空
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub satisfied: bool,
    pub rationale: String,
    #[serde(default)]
    pub missing: Vec<String>,
}

impl Verdict {
    pub fn satisfied(rationale: impl Into<String>) -> Self {
        Self {
            satisfied: true,
            rationale: rationale.into(),
            missing: Vec::new(),
        }
    }

    pub fn unsatisfied(rationale: impl Into<String>, missing: Vec<String>) -> Self {
        Self {
            satisfied: false,
            rationale: rationale.into(),
            missing,
        }
    }

    /// 未评估即终止（中止）时的占位结论
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::unsatisfied(
            reason,
            vec!["goal was not evaluated because the run was aborted".to_string()],
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminalState {
    Succeeded,
    Failed,
    Aborted,
}

impl fmt::Display for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalState::Succeeded => write!(f, "SUCCEEDED"),
            TerminalState::Failed => write!(f, "FAILED"),
            TerminalState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// oracle 在一次运行中消耗的 token；共享同一 oracle 的并发运行会互相计入
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenCount {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenCount {
    /// 由运行前后两次累计值 (prompt, completion, total) 求差
    pub fn between(before: (u64, u64, u64), after: (u64, u64, u64)) -> Self {
        Self {
            prompt_tokens: after.0.saturating_sub(before.0),
            completion_tokens: after.1.saturating_sub(before.1),
            total_tokens: after.2.saturating_sub(before.2),
        }
    }
}

/// 一次运行的最终结果（返回给 CLI / API 层）
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub terminal_state: TerminalState,
    pub final_verdict: Verdict,
    pub execution_log: Vec<ExecutionResult>,
    pub repair_history: Vec<RepairAttempt>,
    pub replans: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    pub token_usage: TokenCount,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.terminal_state == TerminalState::Succeeded
    }

    /// 某一步骤的全部执行记录（含修复前的失败）
    pub fn results_for(&self, step_id: StepId) -> impl Iterator<Item = &ExecutionResult> {
        self.execution_log.iter().filter(move |r| r.step_id == step_id)
    }
}
