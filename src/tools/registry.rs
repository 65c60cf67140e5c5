//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / invoke / release），由 ToolRegistry 按名注册与查找；
//! 名称缺失是类型化的查找失败，由 Executor 转为 tool_not_found。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub type ToolInput = Map<String, Value>;

/// 工具执行故障；detail 为工具自定义诊断（如退出码、stderr），原样进入 ErrorInfo.raw_detail
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct ToolFault {
    pub message: String,
    pub detail: Value,
}

impl ToolFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: Value::Null,
        }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }
}

impl From<String> for ToolFault {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ToolFault {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步调用与作用域资源释放
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（Step.tool_name 引用此名）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema（供 LLM 生成正确的参数格式）
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn invoke(&self, input: &ToolInput) -> Result<Value, ToolFault>;

    /// 释放作用域资源（沙箱进程、临时目录等）；Executor 在成功、失败、超时、取消后都会调用
    async fn release(&self) {}
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    /// 注册已共享的工具实例（调用方保留 Arc 以便观察其状态）
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "tool registered twice, keeping the latest");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// 按名称排序，保证 prompt 与错误信息稳定
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 工具目录（name / description / parameters），注入 Planner 与 Repair 的上下文
    pub fn catalog(&self) -> Value {
        let tools: Vec<Value> = self
            .tool_names()
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| {
                serde_json::json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "parameters": tool.parameters_schema()
                })
            })
            .collect();
        Value::Array(tools)
    }
}
