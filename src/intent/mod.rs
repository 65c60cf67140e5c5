//! 意图层：Intent 结构与 `KEY: VALUE` 文本解析

pub mod parser;
pub mod schema;

pub use parser::{parse_intent, parse_intent_file};
pub use schema::{Intent, IntentError};
