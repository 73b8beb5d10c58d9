//! Tool error types.

use shellgate_policy::PolicyError;
use thiserror::Error;

/// Errors produced while executing a tool.
///
/// None of these escape the registry: [`crate::ToolRegistry::call`] turns
/// every one into an error [`crate::ToolResult`].
#[derive(Debug, Error)]
pub enum ToolError {
    /// Missing or malformed tool arguments.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The policy refused the request, or a policy edit could not be saved.
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// No session is registered under the pid.
    #[error("No active session found with PID: {0}")]
    SessionNotFound(u32),

    /// The shell could not be started.
    #[error("Failed to start command \"{command}\": {source}")]
    SpawnFailed {
        /// Command that was being started.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The termination signal could not be delivered.
    #[error("Error terminating process {pid}: {source}")]
    SignalFailed {
        /// Target pid.
        pid: u32,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Every fallback tier of a file operation failed.
    #[error("{operation} failed after trying every strategy: {}", attempts.join("; "))]
    AllTiersFailed {
        /// Operation name.
        operation: &'static str,
        /// One `strategy: reason` entry per attempted tier.
        attempts: Vec<String>,
    },

    /// A file operation failed in a way no fallback can fix.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unknown tool name.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

impl ToolError {
    /// Whether this error is a policy denial.
    #[must_use]
    pub fn is_denial(&self) -> bool {
        matches!(self, Self::Policy(e) if e.is_denial())
    }
}

/// Result type for tool execution.
pub type ToolOutcome<T = crate::ToolOutput> = Result<T, ToolError>;
