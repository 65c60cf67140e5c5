//! Intent：任务、目标、约束、期望输出；构造后不可变

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntentError {
    #[error("Invalid intent line {line_number} (expected KEY: VALUE): {line}")]
    Malformed { line_number: usize, line: String },

    #[error("Missing required intent fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("Failed to read intent file: {0}")]
    Io(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Intent {
    task: String,
    goal: String,
    constraints: Vec<String>,
    expected_output: Option<String>,
}

impl Intent {
    /// task 与 goal 必须非空（去除首尾空白后）
    pub fn new(task: impl Into<String>, goal: impl Into<String>) -> Result<Self, IntentError> {
        let task = task.into().trim().to_string();
        let goal = goal.into().trim().to_string();
        let missing: Vec<String> = [("task", &task), ("goal", &goal)]
            .into_iter()
            .filter(|(_, v)| v.is_empty())
            .map(|(k, _)| k.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(IntentError::MissingFields(missing));
        }
        Ok(Self {
            task,
            goal,
            constraints: Vec::new(),
            expected_output: None,
        })
    }

    pub fn with_constraints(mut self, constraints: Vec<String>) -> Self {
        self.constraints = constraints
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        self
    }

    pub fn with_expected_output(mut self, expected: impl Into<String>) -> Self {
        let expected = expected.into().trim().to_string();
        self.expected_output = (!expected.is_empty()).then_some(expected);
        self
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn constraints(&self) -> &[String] {
        &self.constraints
    }

    pub fn expected_output(&self) -> Option<&str> {
        self.expected_output.as_deref()
    }
}
