//! 核心编排层：数据模型、错误与恢复、运行监管、状态机与主控循环、组件装配

pub mod builder;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod recovery;
pub mod state;
pub mod supervisor;
pub mod types;

pub use builder::MindBridgeBuilder;
pub use error::{MindError, RecoveryAction};
pub use events::RunEvent;
pub use orchestrator::{Orchestrator, OrchestratorSettings, RunLimits};
pub use recovery::RecoveryEngine;
pub use state::{RunPhase, RunState};
pub use supervisor::{Interrupted, RunGuard};
pub use types::{
    ErrorInfo, ErrorKind, ExecutionResult, Plan, PlanError, RepairAttempt, RepairOutcome,
    RunOutcome, Step, StepId, StepStatus, TerminalState, TokenCount, Verdict,
};
