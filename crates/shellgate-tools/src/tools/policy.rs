//! Policy inspection and administration tools.

use serde_json::{Value, json};

use super::required_str;
use crate::{BuiltinTool, ToolContext, ToolOutcome, ToolOutput};

fn command_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "command": {
                "type": "string",
                "description": description
            }
        },
        "required": ["command"]
    })
}

/// Shows the directories the policy allows, with their permission level.
pub struct ListAllowedDirectoriesTool;

#[async_trait::async_trait]
impl BuiltinTool for ListAllowedDirectoriesTool {
    fn name(&self) -> &'static str {
        "list_allowed_directories"
    }

    fn description(&self) -> &'static str {
        "List the directories this server may access and the permission level of each."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _args: Value, ctx: &ToolContext) -> ToolOutcome {
        let directories = ctx.paths.allowed_directories();
        let text = directories
            .iter()
            .map(|d| format!("{} ({})", d.path.display(), d.permission))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(ToolOutput::text(text).with_metadata(json!({ "directories": directories })))
    }
}

/// Adds a command to the blocklist.
pub struct BlockCommandTool;

#[async_trait::async_trait]
impl BuiltinTool for BlockCommandTool {
    fn name(&self) -> &'static str {
        "block_command"
    }

    fn description(&self) -> &'static str {
        "Add a command to the blocklist. Saved to the policy file."
    }

    fn input_schema(&self) -> Value {
        command_schema("Executable name to block")
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let command = required_str(&args, "command")?;
        let outcome = ctx.commands.block(command)?;
        let name = command.trim().to_lowercase();
        let text = if outcome.is_changed() {
            format!("Command \"{name}\" is now blocked")
        } else {
            format!("Command \"{name}\" was already blocked")
        };
        Ok(ToolOutput::text(text).with_metadata(json!({ "changed": outcome.is_changed() })))
    }
}

/// Removes a command from the blocklist.
pub struct UnblockCommandTool;

#[async_trait::async_trait]
impl BuiltinTool for UnblockCommandTool {
    fn name(&self) -> &'static str {
        "unblock_command"
    }

    fn description(&self) -> &'static str {
        "Remove a command from the blocklist. Saved to the policy file."
    }

    fn input_schema(&self) -> Value {
        command_schema("Executable name to unblock")
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let command = required_str(&args, "command")?;
        let outcome = ctx.commands.unblock(command)?;
        let name = command.trim().to_lowercase();
        let text = if outcome.is_changed() {
            format!("Command \"{name}\" is no longer blocked")
        } else {
            format!("Command \"{name}\" was not blocked")
        };
        Ok(ToolOutput::text(text).with_metadata(json!({ "changed": outcome.is_changed() })))
    }
}

/// Lists the blocklist, sorted.
pub struct ListBlockedCommandsTool;

#[async_trait::async_trait]
impl BuiltinTool for ListBlockedCommandsTool {
    fn name(&self) -> &'static str {
        "list_blocked_commands"
    }

    fn description(&self) -> &'static str {
        "List the blocked commands in alphabetical order."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _args: Value, ctx: &ToolContext) -> ToolOutcome {
        let blocked = ctx.commands.list_blocked();
        let text = if blocked.is_empty() {
            "No commands are blocked".to_string()
        } else {
            blocked.join("\n")
        };
        Ok(ToolOutput::text(text).with_metadata(json!({ "blockedCommands": blocked })))
    }
}

/// Re-reads the policy file.
pub struct ReloadPolicyTool;

#[async_trait::async_trait]
impl BuiltinTool for ReloadPolicyTool {
    fn name(&self) -> &'static str {
        "reload_policy"
    }

    fn description(&self) -> &'static str {
        "Re-read the policy file. Until this is called, edits to the file have no effect."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _args: Value, ctx: &ToolContext) -> ToolOutcome {
        let policy = ctx.store.reload();
        Ok(ToolOutput::text(format!(
            "Policy reloaded: {} allowed directories, {} blocked commands, {} aliases",
            policy.directories.len(),
            policy.blocked_commands.len(),
            policy.command_aliases.len()
        )))
    }
}
