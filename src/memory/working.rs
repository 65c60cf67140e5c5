//! Working Memory：单次运行内的键值存储
//!
//! 每个键在同一规划周期内只能写一次，跨周期（重规划后）允许覆盖；运行中从不删除。
//! 失败说明单独追加到 failures 列表，不占用键空间，因此不会覆盖成功步骤的输出。

use std::collections::{BTreeMap, HashSet};

use serde_json::{json, Value};
use thiserror::Error;

use crate::core::types::{step_output_key, StepId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("key '{key}' was already written in cycle {cycle}")]
    AlreadyWritten { key: String, cycle: u32 },
}

#[derive(Clone, Debug, Default)]
pub struct WorkingMemory {
    goal: Option<String>,
    entries: BTreeMap<String, Value>,
    written_this_cycle: HashSet<String>,
    failures: Vec<String>,
    cycle: u32,
}

impl WorkingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_goal(goal: impl Into<String>) -> Self {
        Self {
            goal: Some(goal.into()),
            ..Self::default()
        }
    }

    pub fn goal(&self) -> Option<&str> {
        self.goal.as_deref()
    }

    /// 当前规划周期（0 为首次规划）
    pub fn cycle(&self) -> u32 {
        self.cycle
    }

    /// 进入下一规划周期：已有条目保留，但允许被新周期覆盖
    pub fn begin_cycle(&mut self) {
        self.cycle += 1;
        self.written_this_cycle.clear();
    }

    pub fn record(&mut self, key: impl Into<String>, value: Value) -> Result<(), MemoryError> {
        let key = key.into();
        if self.written_this_cycle.contains(&key) {
            return Err(MemoryError::AlreadyWritten {
                key,
                cycle: self.cycle,
            });
        }
        self.written_this_cycle.insert(key.clone());
        self.entries.insert(key, value);
        Ok(())
    }

    pub fn record_step_output(&mut self, step_id: StepId, output: Value) -> Result<(), MemoryError> {
        self.record(step_output_key(step_id), output)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn step_output(&self, step_id: StepId) -> Option<&Value> {
        self.entries.get(&step_output_key(step_id))
    }

    pub fn entries(&self) -> &BTreeMap<String, Value> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 记录失败说明（由编排器写入，供下一次规划 / 修复参考）
    pub fn add_failure(&mut self, failure: impl Into<String>) {
        self.failures.push(failure.into());
    }

    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    /// 供 Oracle 上下文使用的 JSON 快照（键有序，保证相同内存产生相同上下文）
    pub fn snapshot(&self) -> Value {
        json!({
            "goal": self.goal,
            "cycle": self.cycle,
            "entries": self.entries,
            "failures": self.failures,
        })
    }
}
