//! Policy error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::Operation;

/// Errors produced by the policy gates and store.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The path is outside every allowed directory, or its directory does
    /// not grant the requested operation.
    #[error("access denied: {operation} on {} ({reason})", path.display())]
    AccessDenied {
        /// Canonical path that was checked.
        path: PathBuf,
        /// Operation that was requested.
        operation: Operation,
        /// Why the request was refused.
        reason: String,
    },

    /// The command's executable is on the blocklist.
    #[error("command \"{command}\" is blocked")]
    CommandBlocked {
        /// The blocked executable token.
        command: String,
    },

    /// The command string was empty or otherwise unusable.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// Writing the policy file failed.
    #[error("failed to persist policy to {}: {source}", path.display())]
    Persist {
        /// Policy file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Serializing the policy file failed.
    #[error("failed to serialize policy: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl PolicyError {
    /// Whether this error is a policy denial (path or command).
    #[must_use]
    pub fn is_denial(&self) -> bool {
        matches!(self, Self::AccessDenied { .. } | Self::CommandBlocked { .. })
    }
}

/// Result type for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;
