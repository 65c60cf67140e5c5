//! 工具层：Tool trait 与注册表、步骤执行器、内置工具（echo / calculator / shell）

pub mod calculator;
pub mod echo;
pub mod executor;
pub mod registry;
pub mod shell;

pub use calculator::CalculatorTool;
pub use echo::EchoTool;
pub use executor::Executor;
pub use registry::{Tool, ToolFault, ToolInput, ToolRegistry};
pub use shell::ShellTool;
