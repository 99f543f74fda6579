//! Built-in tools.
//!
//! Only a small set ships with the core: enough to exercise dispatch
//! end-to-end. Heavier capabilities (file I/O, shell, HTTP) plug in
//! through the same [`Tool`](crate::tool::Tool) contract from outside.

mod calculator;
mod memory_update;
mod message;

pub use calculator::{CalculatorParams, CalculatorTool};
pub use memory_update::{MemoryCapability, MemoryUpdateTool, SharedMemoryCapability};
pub use message::MessageTool;
