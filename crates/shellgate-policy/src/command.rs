//! Command blocklist checks, edits and alias resolution.

use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{PolicyError, PolicyResult};
use crate::store::PolicyStore;

/// Outcome of a blocklist edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// The blocklist changed and was persisted.
    Changed,
    /// The command was already in the requested state.
    Unchanged,
}

impl BlockOutcome {
    /// Whether the edit changed anything.
    #[must_use]
    pub fn is_changed(self) -> bool {
        self == Self::Changed
    }
}

/// The executable token of `command`: its first whitespace-delimited word,
/// lower-cased. `None` for a blank command.
#[must_use]
pub fn base_command(command: &str) -> Option<String> {
    command
        .split_whitespace()
        .next()
        .map(str::to_lowercase)
}

/// Checks commands against the blocklist and edits it.
#[derive(Debug, Clone)]
pub struct CommandGate {
    store: Arc<PolicyStore>,
}

impl CommandGate {
    /// Create a gate over `store`.
    #[must_use]
    pub fn new(store: Arc<PolicyStore>) -> Self {
        Self { store }
    }

    /// Whether the executable of `command` is blocked.
    #[must_use]
    pub fn is_blocked(&self, command: &str) -> bool {
        base_command(command).is_some_and(|name| self.store.snapshot().is_blocked(&name))
    }

    /// Refuse blank or blocked commands.
    ///
    /// Keyed on the command as the caller wrote it; aliases are resolved
    /// only after this check passes.
    ///
    /// # Errors
    ///
    /// [`PolicyError::InvalidCommand`] for a blank command and
    /// [`PolicyError::CommandBlocked`] for a blocked one.
    pub fn check(&self, command: &str) -> PolicyResult<()> {
        let name = base_command(command)
            .ok_or_else(|| PolicyError::InvalidCommand("command is empty".to_string()))?;

        if self.store.snapshot().is_blocked(&name) {
            warn!(command = %name, "blocked command refused");
            self.store
                .events()
                .diagnostic(&format!("blocked command refused: {name}"));
            return Err(PolicyError::CommandBlocked { command: name });
        }
        Ok(())
    }

    /// The command to actually run for `command`, after alias substitution.
    #[must_use]
    pub fn resolve(&self, command: &str) -> String {
        self.store.resolve_alias(command)
    }

    /// Add `command` to the blocklist.
    ///
    /// # Errors
    ///
    /// [`PolicyError::InvalidCommand`] for a blank name, or a persistence
    /// error if the policy file could not be rewritten.
    pub fn block(&self, command: &str) -> PolicyResult<BlockOutcome> {
        let name = normalize(command)?;
        let changed = self
            .store
            .update_blocked(|set| set.insert(name.clone()))?;
        Ok(self.outcome("blocked", &name, changed))
    }

    /// Remove `command` from the blocklist.
    ///
    /// # Errors
    ///
    /// [`PolicyError::InvalidCommand`] for a blank name, or a persistence
    /// error if the policy file could not be rewritten.
    pub fn unblock(&self, command: &str) -> PolicyResult<BlockOutcome> {
        let name = normalize(command)?;
        let changed = self.store.update_blocked(|set| set.remove(&name))?;
        Ok(self.outcome("unblocked", &name, changed))
    }

    /// The blocklist in sorted order.
    #[must_use]
    pub fn list_blocked(&self) -> Vec<String> {
        self.store.snapshot().blocked_commands.iter().cloned().collect()
    }

    fn outcome(&self, verb: &str, name: &str, changed: bool) -> BlockOutcome {
        if changed {
            info!(command = %name, "{verb} command");
            self.store
                .events()
                .diagnostic(&format!("{verb} command: {name}"));
            BlockOutcome::Changed
        } else {
            BlockOutcome::Unchanged
        }
    }
}

fn normalize(command: &str) -> PolicyResult<String> {
    let name = command.trim().to_lowercase();
    if name.is_empty() {
        return Err(PolicyError::InvalidCommand(
            "command name is empty".to_string(),
        ));
    }
    Ok(name)
}
