//! MindBridge - 自主任务执行的认知控制循环
//!
//! 入口：解析命令行、初始化日志、加载配置与 Intent，运行编排器并把 RunOutcome 以 JSON 输出到 stdout。
//! 退出码：SUCCEEDED 为 0，FAILED 为 1，ABORTED（含启动前的配置 / Intent 错误）为 2。

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use mindbridge::core::builder::create_builder;
use mindbridge::core::{RunEvent, TerminalState};
use mindbridge::observability;

#[derive(Parser)]
#[command(
    name = "mindbridge",
    version,
    about = "Plan, execute, repair and evaluate tool-based tasks described by an intent file"
)]
struct Cli {
    /// Intent file with TASK / GOAL / CONSTRAINTS / OUTPUT lines.
    intent: PathBuf,

    /// Extra TOML config layered over config/default.toml.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only log warnings and errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    observability::init(cli.quiet);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("mindbridge: {:#}", err);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let builder = create_builder(cli.config).context("Failed to load configuration")?;
    let intent = builder
        .load_intent(&cli.intent)
        .with_context(|| format!("Failed to read intent {}", cli.intent.display()))?;
    let oracle = builder.build_oracle().context("Failed to create oracle")?;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<RunEvent>();
    let orchestrator = builder.build_orchestrator(oracle).with_events(event_tx);

    let events = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => tracing::info!(event = %line, "progress"),
                Err(e) => tracing::debug!(error = %e, "event not serializable"),
            }
        }
    });

    // Ctrl-C：取消当前运行，编排器会在下一个挂起点进入 ABORTED
    let cancel_token = CancellationToken::new();
    let ctrl_c_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl-C received, cancelling run");
            ctrl_c_token.cancel();
        }
    });

    let outcome = orchestrator.run(&intent, cancel_token).await;
    drop(orchestrator);
    if let Err(e) = events.await {
        tracing::debug!(error = %e, "event logger task ended abnormally");
    }

    let json = serde_json::to_string_pretty(&outcome).context("Failed to serialize outcome")?;
    println!("{}", json);

    Ok(match outcome.terminal_state {
        TerminalState::Succeeded => ExitCode::SUCCESS,
        TerminalState::Failed => ExitCode::from(1),
        TerminalState::Aborted => ExitCode::from(2),
    })
}
