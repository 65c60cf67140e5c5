//! 记忆层：单次运行的 Working Memory

pub mod working;

pub use working::{MemoryError, WorkingMemory};
