//! 控制循环集成测试：脚本化 oracle 驱动完整运行

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;

    use mindbridge::core::{
        Orchestrator, OrchestratorSettings, RepairOutcome, RunLimits, StepStatus, TerminalState,
    };
    use mindbridge::intent::{parse_intent_file, Intent};
    use mindbridge::oracle::{ScriptedOracle, Stage};
    use mindbridge::tools::{CalculatorTool, EchoTool, Tool, ToolFault, ToolInput, ToolRegistry};

    fn factorial_intent() -> Intent {
        Intent::new("compute factorial", "factorial of 5")
            .unwrap()
            .with_expected_output("120")
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(CalculatorTool);
        Arc::new(registry)
    }

    fn calculator_plan(expression: &str) -> Value {
        json!({"steps": [{
            "description": "compute the factorial",
            "tool": "calculator",
            "input": {"expression": expression}
        }]})
    }

    fn orchestrator(oracle: Arc<ScriptedOracle>) -> Orchestrator {
        Orchestrator::new(oracle, registry(), OrchestratorSettings::default())
    }

    #[tokio::test]
    async fn test_single_step_plan_succeeds() {
        let oracle = Arc::new(
            ScriptedOracle::new()
                .with_reply(Stage::Planning, calculator_plan("factorial(5)"))
                .with_reply(
                    Stage::Evaluation,
                    json!({"satisfied": true, "rationale": "output is 120"}),
                ),
        );
        let outcome = orchestrator(oracle.clone())
            .run(&factorial_intent(), CancellationToken::new())
            .await;

        assert_eq!(outcome.terminal_state, TerminalState::Succeeded);
        assert!(outcome.final_verdict.satisfied);
        assert!(outcome.final_verdict.missing.is_empty());
        assert_eq!(outcome.execution_log.len(), 1);
        assert_eq!(outcome.execution_log[0].output, Some(json!(120)));
        assert_eq!(outcome.replans, 0);

        let eval_ctx = &oracle.contexts(Stage::Evaluation)[0];
        assert_eq!(eval_ctx["memory"]["entries"]["step.1.output"], 120);
    }

    #[tokio::test]
    async fn test_repaired_step_reruns_with_same_id() {
        let oracle = Arc::new(
            ScriptedOracle::new()
                .with_reply(Stage::Planning, calculator_plan("5 +"))
                .with_reply(
                    Stage::Repair,
                    json!({
                        "outcome": "revised",
                        "tool": "calculator",
                        "input": {"expression": "5!"},
                        "rationale": "the expression was incomplete"
                    }),
                )
                .with_reply(Stage::Evaluation, json!({"satisfied": true, "rationale": "120"})),
        );
        let outcome = orchestrator(oracle.clone())
            .run(&factorial_intent(), CancellationToken::new())
            .await;

        assert_eq!(outcome.terminal_state, TerminalState::Succeeded);
        let statuses: Vec<StepStatus> = outcome.results_for(1).map(|r| r.status).collect();
        assert_eq!(statuses, vec![StepStatus::Failed, StepStatus::Succeeded]);
        assert_eq!(outcome.repair_history.len(), 1);
        assert_eq!(outcome.repair_history[0].attempt_number, 1);
        assert_eq!(outcome.repair_history[0].outcome, RepairOutcome::RevisedStep);

        let repair_ctx = &oracle.contexts(Stage::Repair)[0];
        assert_eq!(repair_ctx["error"]["kind"], "tool_execution_error");
        assert_eq!(repair_ctx["failed_step"]["tool_name"], "calculator");
        assert_eq!(oracle.call_count(Stage::Evaluation), 1);
    }

    #[tokio::test]
    async fn test_always_failing_plan_is_bounded() {
        let oracle = Arc::new(
            ScriptedOracle::new()
                .with_reply(Stage::Planning, calculator_plan("5 +"))
                .with_reply(
                    Stage::Repair,
                    json!({"outcome": "revised", "tool": "calculator", "input": {"expression": "5 +"}}),
                )
                .with_reply(
                    Stage::Evaluation,
                    json!({"satisfied": false, "rationale": "nothing computed", "missing": ["the value 120"]}),
                ),
        );
        let outcome = orchestrator(oracle.clone())
            .run(&factorial_intent(), CancellationToken::new())
            .await;

        assert_eq!(outcome.terminal_state, TerminalState::Failed);
        assert_eq!(outcome.replans, 3);
        assert_eq!(oracle.call_count(Stage::Planning), 4);
        assert_eq!(oracle.call_count(Stage::Evaluation), 4);
        // 每个周期：1 次原始执行 + 3 次修复后的重跑，修复预算 3
        assert_eq!(oracle.call_count(Stage::Repair), 12);
        assert_eq!(outcome.execution_log.len(), 16);
        for cycle in 0..4 {
            let repairs_in_cycle = outcome
                .repair_history
                .iter()
                .skip(cycle * 3)
                .take(3)
                .map(|a| a.attempt_number)
                .collect::<Vec<_>>();
            assert_eq!(repairs_in_cycle, vec![1, 2, 3]);
        }
        assert_eq!(outcome.final_verdict.missing, vec!["the value 120".to_string()]);

        // 重规划时上一轮 Verdict 进入 Planner 上下文
        let planning = oracle.contexts(Stage::Planning);
        assert_eq!(planning[0]["last_verdict"], Value::Null);
        assert_eq!(planning[1]["last_verdict"]["missing"][0], "the value 120");
    }

    #[tokio::test]
    async fn test_exhausted_repair_still_evaluates_partial_results() {
        let oracle = Arc::new(
            ScriptedOracle::new()
                .with_reply(
                    Stage::Planning,
                    json!({"steps": [
                        {"tool": "echo", "input": {"text": "kept"}},
                        {"tool": "calculator", "input": {"expression": "1 / 0"}},
                        {"tool": "echo", "input": {"text": "never reached"}}
                    ]}),
                )
                .with_reply(Stage::Repair, json!({"outcome": "revised", "tool": "oracle_magic", "input": {}}))
                .with_reply(Stage::Evaluation, json!({"satisfied": false})),
        );
        let settings = OrchestratorSettings::default().with_limits(RunLimits {
            max_repair_attempts: 3,
            max_replans: 0,
            run_timeout: None,
        });
        let outcome = Orchestrator::new(oracle.clone(), registry(), settings)
            .run(&factorial_intent(), CancellationToken::new())
            .await;

        assert_eq!(outcome.terminal_state, TerminalState::Failed);
        assert_eq!(outcome.execution_log.len(), 2);
        assert_eq!(outcome.repair_history.len(), 3);
        assert!(outcome
            .repair_history
            .iter()
            .all(|a| a.outcome == RepairOutcome::Malformed && a.original_step.id == 2));
        assert_eq!(
            outcome.final_verdict.missing,
            vec!["goal not confirmed: factorial of 5".to_string()]
        );

        let eval_ctx = &oracle.contexts(Stage::Evaluation)[0];
        assert_eq!(eval_ctx["memory"]["entries"]["step.1.output"], "kept");
        assert!(eval_ctx["memory"]["entries"].get("step.2.output").is_none());
        let failures = eval_ctx["memory"]["failures"].as_array().unwrap();
        assert!(failures[0].as_str().unwrap().starts_with("step 2 (calculator): tool_execution_error"));
    }

    #[tokio::test]
    async fn test_empty_plan_aborts_without_executing() {
        let oracle = Arc::new(ScriptedOracle::new().with_reply(Stage::Planning, json!({"steps": []})));
        let outcome = orchestrator(oracle.clone())
            .run(&factorial_intent(), CancellationToken::new())
            .await;

        assert_eq!(outcome.terminal_state, TerminalState::Aborted);
        assert!(!outcome.is_success());
        assert_eq!(oracle.call_count(Stage::Planning), 3);
        assert_eq!(oracle.call_count(Stage::Evaluation), 0);
        assert!(outcome.execution_log.is_empty());
        assert!(!outcome.final_verdict.satisfied);
        assert_eq!(outcome.final_verdict.missing.len(), 1);
        assert!(outcome.abort_reason.is_some());
    }

    #[tokio::test]
    async fn test_unknown_tool_in_plan_goes_through_repair() {
        let oracle = Arc::new(
            ScriptedOracle::new()
                .with_reply(
                    Stage::Planning,
                    json!({"steps": [{"tool": "math_engine", "input": {"expression": "5!"}}]}),
                )
                .with_reply(
                    Stage::Repair,
                    json!({"outcome": "revised", "tool": "calculator", "input": {"expression": "5!"}}),
                )
                .with_reply(Stage::Evaluation, json!({"satisfied": true})),
        );
        let outcome = orchestrator(oracle.clone())
            .run(&factorial_intent(), CancellationToken::new())
            .await;

        assert_eq!(outcome.terminal_state, TerminalState::Succeeded);
        let first = &outcome.execution_log[0];
        assert_eq!(first.status, StepStatus::Failed);
        assert_eq!(first.error.as_ref().unwrap().kind.to_string(), "tool_not_found");
        assert_eq!(outcome.execution_log[1].output, Some(json!(120)));
    }

    /// 挂起直到被取消的工具，记录 release 次数
    struct HangingTool {
        releases: AtomicUsize,
    }

    #[async_trait]
    impl Tool for HangingTool {
        fn name(&self) -> &str {
            "sandbox"
        }

        fn description(&self) -> &str {
            "waits forever"
        }

        async fn invoke(&self, _input: &ToolInput) -> Result<Value, ToolFault> {
            std::future::pending::<()>().await;
            Ok(Value::Null)
        }

        async fn release(&self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_cancellation_aborts_and_releases_tool() {
        let tool = Arc::new(HangingTool {
            releases: AtomicUsize::new(0),
        });
        let mut registry = ToolRegistry::new();
        registry.register_arc(tool.clone());

        let oracle = Arc::new(
            ScriptedOracle::new()
                .with_reply(Stage::Planning, json!({"steps": [{"tool": "sandbox", "input": {}}]})),
        );
        let cancel_token = CancellationToken::new();
        let trigger = cancel_token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let outcome = Orchestrator::new(oracle.clone(), Arc::new(registry), OrchestratorSettings::default())
            .run(&factorial_intent(), cancel_token)
            .await;

        assert_eq!(outcome.terminal_state, TerminalState::Aborted);
        assert_eq!(outcome.abort_reason.as_deref(), Some("Cancelled: run cancelled"));
        assert_eq!(tool.releases.load(Ordering::SeqCst), 1);
        assert!(outcome.execution_log.is_empty());
        assert_eq!(oracle.call_count(Stage::Evaluation), 0);
    }

    #[tokio::test]
    async fn test_independent_runs_do_not_share_memory() {
        let oracle = Arc::new(
            ScriptedOracle::new()
                .with_reply(Stage::Planning, calculator_plan("factorial(5)"))
                .with_reply(Stage::Evaluation, json!({"satisfied": true})),
        );
        let orchestrator = Arc::new(orchestrator(oracle.clone()));
        let intent = factorial_intent();
        let (a, b) = tokio::join!(
            orchestrator.run(&intent, CancellationToken::new()),
            orchestrator.run(&intent, CancellationToken::new())
        );
        assert_eq!(a.terminal_state, TerminalState::Succeeded);
        assert_eq!(b.terminal_state, TerminalState::Succeeded);
        assert_ne!(a.run_id, b.run_id);
        for ctx in oracle.contexts(Stage::Planning) {
            assert_eq!(ctx["memory"]["entries"], json!({}));
        }
    }

    #[test]
    fn test_demo_intent_parses() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/factorial.intent");
        let intent = parse_intent_file(path).unwrap();
        assert_eq!(intent.task(), "compute factorial");
        assert_eq!(intent.expected_output(), Some("120"));
        assert_eq!(intent.constraints().len(), 2);
    }
}
