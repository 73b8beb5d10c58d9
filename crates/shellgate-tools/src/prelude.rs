//! Prelude module - commonly used types for convenient import.
//!
//! Use `use shellgate_tools::prelude::*;` to import the registry, context and
//! result types.

// Tool surface
pub use crate::{BuiltinTool, ToolContext, ToolDefinition, ToolRegistry};

// Results
pub use crate::{ToolContent, ToolError, ToolOutcome, ToolOutput, ToolResult};

// Engines
pub use crate::{FileOpGateway, SessionConfig, SessionEngine, SessionStatus};
