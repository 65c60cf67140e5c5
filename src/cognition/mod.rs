//! 认知层：Planner / Error Repair / Evaluator，均通过 ReasoningOracle 完成推理

pub mod evaluator;
pub mod planner;
pub mod prompts;
pub mod repair;
pub mod schema;

pub use evaluator::Evaluator;
pub use planner::Planner;
pub use prompts::Prompts;
pub use repair::ErrorRepair;
pub use schema::{PlanReply, PlannedStep, RepairReply, VerdictReply};
