//! 运行过程事件：用于 CLI 进度输出或上层推送（阶段切换、计划、步骤、修复、结论）

use serde::Serialize;

use crate::core::state::RunPhase;
use crate::core::types::{RepairOutcome, StepId, StepStatus, TerminalState};

/// 单个过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// 状态机阶段切换
    PhaseChanged { from: RunPhase, to: RunPhase },
    /// Planner 产出新计划
    PlanReady {
        cycle: u32,
        step_count: usize,
        tools: Vec<String>,
    },
    /// 开始执行步骤
    StepStarted { step_id: StepId, tool: String },
    /// 步骤执行结束
    StepFinished {
        step_id: StepId,
        status: StepStatus,
        duration_ms: u64,
    },
    /// Error Repair 给出结果
    RepairProposed {
        step_id: StepId,
        attempt: u32,
        outcome: RepairOutcome,
    },
    /// 修复预算耗尽，步骤永久失败
    RepairExhausted { step_id: StepId, attempts: u32 },
    /// Evaluator 给出结论
    VerdictReached { satisfied: bool, missing: Vec<String> },
    /// 运行进入终态
    Terminated { state: TerminalState },
}
