//! 编排器：主控状态机
//!
//! PLANNING → EXECUTING → (REPAIRING) → EVALUATING → (REPLANNING) → {SUCCEEDED, FAILED, ABORTED}。
//! 每个阶段由一个处理函数返回下一阶段；任何 MindError 都折叠为 ABORTED 并记录原因，
//! 调用方总是拿到 RunOutcome。修复与重规划都有上限，因此无论 oracle 如何回答运行都会终止。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::cognition::{ErrorRepair, Evaluator, Planner, Prompts};
use crate::config::AppConfig;
use crate::core::events::RunEvent;
use crate::core::state::{RunPhase, RunState};
use crate::core::types::{RepairOutcome, RunOutcome, TerminalState, TokenCount, Verdict};
use crate::core::{MindError, RunGuard};
use crate::intent::Intent;
use crate::memory::WorkingMemory;
use crate::oracle::ReasoningOracle;
use crate::tools::{Executor, ToolRegistry};

/// 修复 / 重规划预算与运行级超时
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLimits {
    pub max_repair_attempts: u32,
    pub max_replans: u32,
    pub run_timeout: Option<Duration>,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_repair_attempts: 3,
            max_replans: 3,
            run_timeout: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub limits: RunLimits,
    /// 每次 oracle 调用的额外重试次数
    pub oracle_retries: u32,
    pub tool_timeout_secs: u64,
    pub prompts: Prompts,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            limits: RunLimits::default(),
            oracle_retries: 2,
            tool_timeout_secs: 30,
            prompts: Prompts::default(),
        }
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &AppConfig, prompts: Prompts) -> Self {
        Self {
            limits: RunLimits {
                max_repair_attempts: config.orchestrator.max_repair_attempts,
                max_replans: config.orchestrator.max_replans,
                run_timeout: config.orchestrator.run_timeout(),
            },
            oracle_retries: config.orchestrator.oracle_retries,
            tool_timeout_secs: config.tools.tool_timeout_secs,
            prompts,
        }
    }

    pub fn with_limits(mut self, limits: RunLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// 单次运行的可变上下文；Working Memory 只属于这一次运行
struct Run<'a> {
    intent: &'a Intent,
    memory: WorkingMemory,
    state: RunState,
    guard: RunGuard,
}

pub struct Orchestrator {
    oracle: Arc<dyn ReasoningOracle>,
    planner: Planner,
    executor: Executor,
    repair: ErrorRepair,
    evaluator: Evaluator,
    limits: RunLimits,
    events: Option<mpsc::UnboundedSender<RunEvent>>,
}

impl Orchestrator {
    pub fn new(
        oracle: Arc<dyn ReasoningOracle>,
        registry: Arc<ToolRegistry>,
        settings: OrchestratorSettings,
    ) -> Self {
        let OrchestratorSettings {
            limits,
            oracle_retries,
            tool_timeout_secs,
            prompts,
        } = settings;
        Self {
            planner: Planner::new(
                oracle.clone(),
                registry.clone(),
                prompts.planner,
                oracle_retries,
            ),
            executor: Executor::new(registry.clone(), tool_timeout_secs),
            repair: ErrorRepair::new(oracle.clone(), registry, prompts.repair, oracle_retries),
            evaluator: Evaluator::new(oracle.clone(), prompts.evaluator, oracle_retries),
            oracle,
            limits,
            events: None,
        }
    }

    /// 附加事件通道（CLI 进度输出等）
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<RunEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// 执行一个 Intent 直到终态
    pub async fn run(&self, intent: &Intent, cancel_token: CancellationToken) -> RunOutcome {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", %run_id);
        self.drive(run_id, intent, cancel_token).instrument(span).await
    }

    async fn drive(&self, run_id: Uuid, intent: &Intent, cancel_token: CancellationToken) -> RunOutcome {
        let started_at = Utc::now();
        let usage_before = self.oracle.token_usage();
        tracing::info!(task = %intent.task(), goal = %intent.goal(), "run started");

        let mut run = Run {
            intent,
            memory: WorkingMemory::for_goal(intent.goal()),
            state: RunState::new(),
            guard: RunGuard::new(cancel_token).with_timeout(self.limits.run_timeout),
        };

        let mut phase = RunPhase::Planning;
        let terminal = loop {
            if let Some(terminal) = phase.terminal_state() {
                break terminal;
            }
            let next = match run.guard.check() {
                Err(interrupted) => Err(MindError::from(interrupted)),
                Ok(()) => match phase {
                    RunPhase::Planning => self.plan(&mut run).await,
                    RunPhase::Executing => self.execute(&mut run).await,
                    RunPhase::Repairing => self.repair(&mut run).await,
                    RunPhase::Evaluating => self.evaluate(&mut run).await,
                    RunPhase::Replanning => Ok(self.replan(&mut run)),
                    RunPhase::Succeeded | RunPhase::Failed | RunPhase::Aborted => Ok(phase),
                },
            };
            let next = next.unwrap_or_else(|e| {
                tracing::warn!(phase = %phase, error = %e, "run aborted");
                run.state.abort_reason = Some(e.to_string());
                RunPhase::Aborted
            });
            self.transition(phase, next);
            phase = next;
        };

        self.emit(RunEvent::Terminated { state: terminal });
        let Run { memory, state, .. } = run;
        let token_usage = TokenCount::between(usage_before, self.oracle.token_usage());
        tracing::info!(
            state = %terminal,
            total_tokens = token_usage.total_tokens,
            steps_run = state.execution_log.len(),
            repairs = state.repair_history.len(),
            replans = state.replans,
            memory_entries = memory.len(),
            "run finished"
        );

        let final_verdict = match (terminal, state.last_verdict) {
            (TerminalState::Aborted, last) => last.unwrap_or_else(|| {
                Verdict::aborted(
                    state
                        .abort_reason
                        .clone()
                        .unwrap_or_else(|| "run aborted".to_string()),
                )
            }),
            (_, Some(verdict)) => verdict,
            (_, None) => Verdict::unsatisfied("no verdict was reached", Vec::new()),
        };

        RunOutcome {
            run_id,
            terminal_state: terminal,
            final_verdict,
            execution_log: state.execution_log,
            repair_history: state.repair_history,
            replans: state.replans,
            abort_reason: state.abort_reason,
            token_usage,
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn plan(&self, run: &mut Run<'_>) -> Result<RunPhase, MindError> {
        let plan = run
            .guard
            .run(self.planner.generate(
                run.intent,
                &run.memory,
                run.state.last_verdict.as_ref(),
            ))
            .await??;
        self.emit(RunEvent::PlanReady {
            cycle: run.memory.cycle(),
            step_count: plan.len(),
            tools: plan.steps().iter().map(|s| s.tool_name.clone()).collect(),
        });
        run.state.install_plan(plan);
        Ok(RunPhase::Executing)
    }

    /// 每次只执行当前一步；成功前进，失败进入 REPAIRING 并保留位置
    async fn execute(&self, run: &mut Run<'_>) -> Result<RunPhase, MindError> {
        let Some(step) = run.state.current_step().cloned() else {
            return Ok(RunPhase::Evaluating);
        };
        self.emit(RunEvent::StepStarted {
            step_id: step.id,
            tool: step.tool_name.clone(),
        });

        let result = self.executor.run(&step, &mut run.memory, &run.guard).await?;
        self.emit(RunEvent::StepFinished {
            step_id: step.id,
            status: result.status,
            duration_ms: result.duration_ms,
        });

        let failure = result.error.clone();
        run.state.execution_log.push(result);

        match failure {
            None => {
                if run.state.advance() {
                    Ok(RunPhase::Executing)
                } else {
                    Ok(RunPhase::Evaluating)
                }
            }
            Some(error) => {
                tracing::info!(step_id = step.id, kind = %error.kind, error = %error.message, "step failed");
                run.memory.add_failure(format!(
                    "step {} ({}): {}: {}",
                    step.id, step.tool_name, error.kind, error.message
                ));
                run.state.pending_failure = Some(error);
                Ok(RunPhase::Repairing)
            }
        }
    }

    async fn repair(&self, run: &mut Run<'_>) -> Result<RunPhase, MindError> {
        let (Some(step), Some(error)) = (
            run.state.current_step().cloned(),
            run.state.pending_failure.clone(),
        ) else {
            return Ok(RunPhase::Evaluating);
        };

        let used = run.state.repair_count(step.id);
        if used >= self.limits.max_repair_attempts {
            let exhausted = MindError::RepairExhausted {
                step_id: step.id,
                attempts: used,
            };
            tracing::warn!(error = %exhausted, "step permanently failed");
            self.emit(RunEvent::RepairExhausted {
                step_id: step.id,
                attempts: used,
            });
            run.memory.add_failure(exhausted.to_string());
            run.state.give_up_current();
            return Ok(RunPhase::Evaluating);
        }

        let attempt_number = run.state.bump_repair(step.id);
        let attempt = run
            .guard
            .run(self.repair.repair(&step, &error, &run.memory, attempt_number))
            .await??;
        self.emit(RunEvent::RepairProposed {
            step_id: step.id,
            attempt: attempt_number,
            outcome: attempt.outcome,
        });

        let outcome = attempt.outcome;
        let revised = attempt.revised_step.clone();
        run.state.repair_history.push(attempt);

        match (outcome, revised) {
            (RepairOutcome::RevisedStep, Some(revised)) => {
                if !run.state.substitute_current(revised) {
                    return Ok(RunPhase::Repairing);
                }
                run.state.pending_failure = None;
                Ok(RunPhase::Executing)
            }
            (RepairOutcome::Unrecoverable, _) => {
                run.memory.add_failure(format!(
                    "step {} ({}): declared unrecoverable",
                    step.id, step.tool_name
                ));
                run.state.give_up_current();
                Ok(RunPhase::Evaluating)
            }
            // malformed：已消耗一次预算，留在 REPAIRING 再试
            _ => Ok(RunPhase::Repairing),
        }
    }

    async fn evaluate(&self, run: &mut Run<'_>) -> Result<RunPhase, MindError> {
        let verdict = run
            .guard
            .run(self.evaluator.assess(
                run.intent,
                &run.memory,
                &run.state.execution_log,
            ))
            .await??;
        self.emit(RunEvent::VerdictReached {
            satisfied: verdict.satisfied,
            missing: verdict.missing.clone(),
        });

        let satisfied = verdict.satisfied;
        run.state.last_verdict = Some(verdict);

        if satisfied {
            Ok(RunPhase::Succeeded)
        } else if run.state.replans < self.limits.max_replans {
            Ok(RunPhase::Replanning)
        } else {
            tracing::info!(error = %MindError::ReplanExhausted(run.state.replans), "goal not met");
            Ok(RunPhase::Failed)
        }
    }

    fn replan(&self, run: &mut Run<'_>) -> RunPhase {
        run.state.replans += 1;
        run.memory.begin_cycle();
        tracing::info!(replan = run.state.replans, max = self.limits.max_replans, "replanning");
        RunPhase::Planning
    }

    fn transition(&self, from: RunPhase, to: RunPhase) {
        if from == to {
            return;
        }
        tracing::debug!(from = %from, to = %to, "phase transition");
        self.emit(RunEvent::PhaseChanged { from, to });
    }

    fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}
