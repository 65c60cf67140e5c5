//! 状态定义：RunPhase 状态机阶段与编排器内部的 RunState
//!
//! RunState 只在一次运行内存在：当前 Plan、执行日志、每步修复计数、重规划计数、最近的 Verdict。

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::core::types::{
    ErrorInfo, ExecutionResult, Plan, RepairAttempt, Step, StepId, TerminalState, Verdict,
};

/// 编排器状态机阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPhase {
    Planning,
    Executing,
    Repairing,
    Evaluating,
    Replanning,
    Succeeded,
    Failed,
    Aborted,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        self.terminal_state().is_some()
    }

    pub fn terminal_state(&self) -> Option<TerminalState> {
        match self {
            RunPhase::Succeeded => Some(TerminalState::Succeeded),
            RunPhase::Failed => Some(TerminalState::Failed),
            RunPhase::Aborted => Some(TerminalState::Aborted),
            _ => None,
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunPhase::Planning => "PLANNING",
            RunPhase::Executing => "EXECUTING",
            RunPhase::Repairing => "REPAIRING",
            RunPhase::Evaluating => "EVALUATING",
            RunPhase::Replanning => "REPLANNING",
            RunPhase::Succeeded => "SUCCEEDED",
            RunPhase::Failed => "FAILED",
            RunPhase::Aborted => "ABORTED",
        };
        f.write_str(s)
    }
}

/// 编排器内部状态，运行开始时创建、终态时丢弃
#[derive(Debug, Default)]
pub struct RunState {
    pub(crate) plan: Option<Plan>,
    /// 当前执行位置（Plan 内下标）；修复后重跑同一位置
    pub(crate) cursor: usize,
    pub(crate) execution_log: Vec<ExecutionResult>,
    pub(crate) repair_counters: HashMap<StepId, u32>,
    pub(crate) repair_history: Vec<RepairAttempt>,
    pub(crate) replans: u32,
    pub(crate) last_verdict: Option<Verdict>,
    /// REPAIRING 阶段处理中的失败
    pub(crate) pending_failure: Option<ErrorInfo>,
    pub(crate) partially_failed: bool,
    pub(crate) abort_reason: Option<String>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 安装新 Plan：游标归零、清空每步修复计数
    pub(crate) fn install_plan(&mut self, plan: Plan) {
        self.plan = Some(plan);
        self.cursor = 0;
        self.repair_counters.clear();
        self.pending_failure = None;
        self.partially_failed = false;
    }

    pub(crate) fn current_step(&self) -> Option<&Step> {
        self.plan.as_ref().and_then(|p| p.get(self.cursor))
    }

    /// 当前步骤成功后前进；返回是否还有剩余步骤
    pub(crate) fn advance(&mut self) -> bool {
        self.cursor += 1;
        self.current_step().is_some()
    }

    pub(crate) fn repair_count(&self, step_id: StepId) -> u32 {
        self.repair_counters.get(&step_id).copied().unwrap_or(0)
    }

    /// 消耗一次修复预算，返回本次的 attempt_number（从 1 开始）
    pub(crate) fn bump_repair(&mut self, step_id: StepId) -> u32 {
        let counter = self.repair_counters.entry(step_id).or_insert(0);
        *counter += 1;
        *counter
    }

    /// 用修复后的步骤替换当前位置
    pub(crate) fn substitute_current(&mut self, step: Step) -> bool {
        let cursor = self.cursor;
        match self.plan.as_mut() {
            Some(plan) => plan.substitute(cursor, step),
            None => false,
        }
    }

    /// 当前步骤永久失败：Plan 标记为部分失败，剩余步骤不再执行
    pub(crate) fn give_up_current(&mut self) {
        self.pending_failure = None;
        self.partially_failed = true;
    }

    pub fn execution_log(&self) -> &[ExecutionResult] {
        &self.execution_log
    }

    pub fn replans(&self) -> u32 {
        self.replans
    }

    pub fn last_verdict(&self) -> Option<&Verdict> {
        self.last_verdict.as_ref()
    }

    pub fn is_partially_failed(&self) -> bool {
        self.partially_failed
    }
}
