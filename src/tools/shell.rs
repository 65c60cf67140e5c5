//! Shell 执行器：白名单命令，禁止危险操作
//!
//! 仅允许配置中的命令名（首词，如 ls、grep、wc）；禁止 rm -rf、wget、chmod 777 等子串。
//! 命令按空白切分后直接执行，不经过 shell：含管道、重定向、命令串联或替换的输入一律拒绝。
//! 每次调用在独立的临时目录中执行，子进程随 future 丢弃而被杀死；
//! 临时目录是本工具的作用域资源，由 release() 清理。

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::process::Command;

use crate::tools::{Tool, ToolFault, ToolInput};

/// 禁止的命令/子串（即使白名单中有同名，也不允许带这些参数）
const FORBIDDEN_SUBSTR: &[&str] = &[
    "rm -rf",
    "rm -fr",
    "rm -r",
    "wget ",
    "chmod 777",
    "chmod +s",
    "mkfs",
    "dd if=",
];

/// shell 元字符：命令不经 shell 执行，出现即拒绝
const SHELL_METACHARS: &[char] = &[';', '&', '|', '$', '`', '>', '<', '\n', '\r', '(', ')'];

/// 输出截断长度
const MAX_OUTPUT_CHARS: usize = 8_000;

/// Shell 工具：仅允许白名单内命令
pub struct ShellTool {
    allowed_commands: HashSet<String>,
    scratch_dirs: Mutex<Vec<TempDir>>,
}

impl ShellTool {
    pub fn new(allowed_commands: Vec<String>) -> Self {
        let allowed_commands = allowed_commands
            .into_iter()
            .map(|s| s.to_lowercase())
            .collect();
        Self {
            allowed_commands,
            scratch_dirs: Mutex::new(Vec::new()),
        }
    }

    /// 尚未释放的临时目录数量
    pub fn live_scratch_dirs(&self) -> usize {
        self.scratch_dirs.lock().map(|dirs| dirs.len()).unwrap_or(0)
    }

    /// 校验命令并切分为 argv
    fn parse_command(&self, raw: &str) -> Result<Vec<String>, String> {
        let raw_lower = raw.to_lowercase();
        for forbidden in FORBIDDEN_SUBSTR {
            if raw_lower.contains(forbidden) {
                return Err(format!("Forbidden pattern: {}", forbidden));
            }
        }
        if let Some(c) = raw.chars().find(|c| SHELL_METACHARS.contains(c)) {
            return Err(format!("Shell metacharacter {:?} not allowed", c));
        }
        let argv: Vec<String> = raw.split_whitespace().map(String::from).collect();
        let Some(name) = argv.first() else {
            return Err("Empty command".to_string());
        };
        if !self.allowed_commands.contains(&name.to_lowercase()) {
            return Err(format!("Command '{}' not in allowlist", name));
        }
        Ok(argv)
    }

    fn scratch_dir(&self) -> Result<std::path::PathBuf, ToolFault> {
        let dir = tempfile::Builder::new()
            .prefix("mindbridge-shell-")
            .tempdir()
            .map_err(|e| ToolFault::new(format!("cannot create scratch dir: {}", e)))?;
        let path = dir.path().to_path_buf();
        match self.scratch_dirs.lock() {
            Ok(mut dirs) => dirs.push(dir),
            Err(_) => return Err(ToolFault::new("scratch dir registry poisoned")),
        }
        Ok(path)
    }
}

fn truncate(s: &str) -> String {
    if s.chars().count() > MAX_OUTPUT_CHARS {
        format!("{}...(truncated)", s.chars().take(MAX_OUTPUT_CHARS).collect::<String>())
    } else {
        s.to_string()
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Run an allow-listed command in a scratch directory. No pipes, redirection or chaining. Args: {\"command\": \"ls -la\"}"
    }

    fn parameters_schema(&self) -> Value {
        let mut allowed: Vec<&String> = self.allowed_commands.iter().collect();
        allowed.sort();
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": format!("The shell command to execute; first word must be one of {:?}", allowed)
                }
            },
            "required": ["command"]
        })
    }

    async fn invoke(&self, input: &ToolInput) -> Result<Value, ToolFault> {
        let command = input
            .get("command")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim();
        let argv = self
            .parse_command(command)
            .map_err(|e| ToolFault::new(e).with_detail(json!({ "command": command })))?;

        let cwd = self.scratch_dir()?;
        tracing::info!(command = %command, cwd = %cwd.display(), "shell tool invoke");

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]).current_dir(&cwd).kill_on_drop(true);

        let output = cmd
            .output()
            .await
            .map_err(|e| ToolFault::new(format!("Execution failed: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(ToolFault::new(format!(
                "command exited with {:?}: {}",
                output.status.code(),
                stderr.trim()
            ))
            .with_detail(json!({
                "command": command,
                "exit_code": output.status.code(),
                "stderr": truncate(stderr.trim()),
            })));
        }
        Ok(json!({
            "stdout": truncate(stdout.trim_end()),
            "stderr": truncate(stderr.trim_end()),
        }))
    }

    async fn release(&self) {
        let drained: Vec<TempDir> = match self.scratch_dirs.lock() {
            Ok(mut dirs) => dirs.drain(..).collect(),
            Err(_) => return,
        };
        for dir in drained {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                tracing::warn!(path = %path.display(), error = %e, "scratch dir cleanup failed");
            }
        }
    }
}
