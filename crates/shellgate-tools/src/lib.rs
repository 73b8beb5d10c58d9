//! shellgate tools - the tool-call surface over command sessions and gated
//! file operations.
//!
//! Every tool is a [`BuiltinTool`] looked up by name in a [`ToolRegistry`].
//! A call never fails at the Rust level: [`ToolRegistry::call`] always
//! returns a [`ToolResult`], with `is_error` set for denials and failures.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod fileops;
pub mod prelude;

mod error;
mod result;
mod session;
mod tools;

pub use error::{ToolError, ToolOutcome};
pub use fileops::{DirEntry, FileInfo, FileOpGateway};
pub use result::{ToolContent, ToolOutput, ToolResult};
pub use session::{
    ExecuteOutcome, KILLED_EXIT_CODE, OutputChunk, SessionConfig, SessionEngine, SessionInfo,
    SessionStatus, TerminateOutcome,
};
pub use tools::{
    BlockCommandTool, CreateDirectoryTool, ExecuteCommandTool, ForceTerminateTool,
    GetFileInfoTool, ListAllowedDirectoriesTool, ListBlockedCommandsTool, ListDirectoryTool,
    ListSessionsTool, MoveFileTool, ReadFileTool, ReadMultipleFilesTool, ReadOutputTool,
    ReloadPolicyTool, SearchFilesTool, UnblockCommandTool, WriteFileTool,
};

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use shellgate_policy::{CommandGate, PathGate, PolicyStore};

/// A tool that executes directly in-process.
#[async_trait::async_trait]
pub trait BuiltinTool: Send + Sync {
    /// Tool name.
    fn name(&self) -> &'static str;

    /// Human-readable description advertised to callers.
    fn description(&self) -> &'static str;

    /// JSON schema for tool input parameters.
    fn input_schema(&self) -> Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome;
}

/// Shared state available to all tools.
#[derive(Debug)]
pub struct ToolContext {
    /// Policy owner.
    pub store: Arc<PolicyStore>,
    /// Path checks.
    pub paths: PathGate,
    /// Command checks and blocklist edits.
    pub commands: CommandGate,
    /// Command sessions.
    pub sessions: Arc<SessionEngine>,
    /// Gated file operations.
    pub files: FileOpGateway,
}

impl ToolContext {
    /// Build the gates, the session engine and the file gateway over `store`.
    ///
    /// `temp_dir` is where file fallbacks stage content.
    #[must_use]
    pub fn new(store: Arc<PolicyStore>, config: SessionConfig, temp_dir: PathBuf) -> Self {
        let paths = PathGate::new(Arc::clone(&store));
        let commands = CommandGate::new(Arc::clone(&store));
        let sessions = Arc::new(SessionEngine::new(
            commands.clone(),
            paths.clone(),
            config,
        ));
        let files = FileOpGateway::new(paths.clone(), temp_dir);
        Self {
            store,
            paths,
            commands,
            sessions,
            files,
        }
    }
}

/// Name, description and input schema of one tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Tool name.
    pub name: &'static str,
    /// Description.
    pub description: &'static str,
    /// JSON schema of the arguments.
    pub input_schema: Value,
}

/// Registry of tools for lookup and definition export.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn BuiltinTool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Create a registry with every tool registered.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ExecuteCommandTool));
        registry.register(Box::new(ReadOutputTool));
        registry.register(Box::new(ForceTerminateTool));
        registry.register(Box::new(ListSessionsTool));
        registry.register(Box::new(ReadFileTool));
        registry.register(Box::new(ReadMultipleFilesTool));
        registry.register(Box::new(WriteFileTool));
        registry.register(Box::new(CreateDirectoryTool));
        registry.register(Box::new(ListDirectoryTool));
        registry.register(Box::new(MoveFileTool));
        registry.register(Box::new(SearchFilesTool));
        registry.register(Box::new(GetFileInfoTool));
        registry.register(Box::new(ListAllowedDirectoriesTool));
        registry.register(Box::new(BlockCommandTool));
        registry.register(Box::new(UnblockCommandTool));
        registry.register(Box::new(ListBlockedCommandsTool));
        registry.register(Box::new(ReloadPolicyTool));
        registry
    }

    /// Register a tool.
    pub fn register(&mut self, tool: Box<dyn BuiltinTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Get a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn BuiltinTool> {
        self.tools.get(name).map(AsRef::as_ref)
    }

    /// Every tool's definition, sorted by name.
    #[must_use]
    pub fn all_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name(),
                description: t.description(),
                input_schema: t.input_schema(),
            })
            .collect();
        defs.sort_by_key(|d| d.name);
        defs
    }

    /// Run the tool `name`, turning every failure into an error result.
    pub async fn call(&self, name: &str, args: Value, ctx: &ToolContext) -> ToolResult {
        let outcome = match self.get(name) {
            Some(tool) => tool.execute(args, ctx).await,
            None => Err(ToolError::UnknownTool(name.to_string())),
        };

        match outcome {
            Ok(output) => output.into(),
            Err(e) => {
                debug!(tool = name, error = %e, "tool call failed");
                ToolResult::error(format!("Error: {e}"))
            },
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
