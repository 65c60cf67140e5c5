//! 三个 oracle 阶段的系统提示词
//!
//! 默认内置；`config/prompts/{planner,repair,evaluator}.md` 存在时覆盖对应阶段。

use std::path::Path;

pub const PLANNER_PROMPT: &str = "You are the planning stage of an autonomous task runner.\n\
Given the user's intent (task, goal, constraints, expected output), the list of available tools, \
the current working memory and, on a replan, the previous verdict, produce an ordered plan of tool calls \
that achieves the goal.\n\
Rules:\n\
- Use only tool names from `tools`, and give each step the input its parameters schema asks for.\n\
- If `last_verdict` is present, address every item in `last_verdict.missing`.\n\
- Do not repeat steps that already failed for the reasons listed in `memory.failures`.\n\
- Reply with exactly one JSON object matching `reply_schema`: {\"steps\": [{\"description\", \"tool\", \"input\"}]}. \
No prose, no Markdown.";

pub const REPAIR_PROMPT: &str = "You are the error-repair stage of an autonomous task runner.\n\
A step of the plan failed. You get the failing step, its error, the attempt number and the working memory.\n\
Either propose a corrected step or declare the failure unrecoverable.\n\
Rules:\n\
- A corrected step must use a tool name from `tools`; it may differ from the failing step's tool.\n\
- Fix the cause named in `error` (wrong arguments, wrong tool, malformed input).\n\
- If no tool can accomplish the step, reply with outcome `unrecoverable`.\n\
- Reply with exactly one JSON object matching `reply_schema`: \
{\"outcome\": \"revised\", \"tool\", \"input\", \"description\", \"rationale\"} or \
{\"outcome\": \"unrecoverable\", \"rationale\"}. No prose, no Markdown.";

pub const EVALUATOR_PROMPT: &str = "You are the evaluation stage of an autonomous task runner.\n\
Judge whether the user's goal has been achieved, using only the execution log and the working memory.\n\
Rules:\n\
- Compare the results with `goal` and, when present, `expected_output`.\n\
- Do not assume work that does not appear in the log.\n\
- When the goal is not met, list every unmet requirement in `missing`.\n\
- Reply with exactly one JSON object matching `reply_schema`: \
{\"satisfied\": bool, \"rationale\": string, \"missing\": [string]}. No prose, no Markdown.";

/// 各阶段提示词
#[derive(Debug, Clone)]
pub struct Prompts {
    pub planner: String,
    pub repair: String,
    pub evaluator: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            planner: PLANNER_PROMPT.to_string(),
            repair: REPAIR_PROMPT.to_string(),
            evaluator: EVALUATOR_PROMPT.to_string(),
        }
    }
}

impl Prompts {
    /// 从 prompts 目录加载覆盖；缺失或为空的文件保留内置默认
    pub fn load_from_dir(dir: &Path) -> Self {
        let read = |name: &str, fallback: &str| {
            std::fs::read_to_string(dir.join(name))
                .ok()
                .filter(|s| !s.trim().is_empty())
                .inspect(|_| tracing::debug!(file = name, "prompt override loaded"))
                .unwrap_or_else(|| fallback.to_string())
        };
        Self {
            planner: read("planner.md", PLANNER_PROMPT),
            repair: read("repair.md", REPAIR_PROMPT),
            evaluator: read("evaluator.md", EVALUATOR_PROMPT),
        }
    }
}
