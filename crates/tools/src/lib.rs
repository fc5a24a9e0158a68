//! External collaborators of the call bridge
//!
//! - Tool runner: tools the AI may call, executed with per-tool timeouts
//! - Instruction resolver: turns an opaque key into assistant instructions

pub mod instructions;
pub mod registry;
pub mod tool;
pub mod web_fetch;

pub use instructions::{
    compose_instructions, create_resolver, HttpInstructionCatalog, InstructionResolver,
    StaticInstructions,
};
pub use registry::{create_registry, ToolRegistry, ToolRunner};
pub use tool::{Tool, ToolError, ToolSchema};
pub use web_fetch::WebFetchTool;
