//! Agent core for Magpie.
//!
//! Home of the ReAct loop, the state machine alternating between a
//! streaming model call and tool dispatch, along with the tool contract,
//! the registry, and context assembly.

pub mod context;
pub mod error;
pub mod react;
pub mod tool;
pub mod tools;

pub use context::ContextBuilder;
pub use error::{AgentError, HookError, HookResult, Result};
pub use react::{AgentHooks, NoopHooks, ReactConfig, ReactLoop, TurnOutcome};
pub use tool::{RESERVED_TOOL_NAMES, Tool, ToolContext, ToolRegistry, ToolResult};
pub use tools::{
    CalculatorTool, MemoryCapability, MemoryUpdateTool, MessageTool, SharedMemoryCapability,
};

#[cfg(any(test, feature = "testing"))]
pub use tool::MockTool;
