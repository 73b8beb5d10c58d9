//! Command session tools.

use serde_json::{Value, json};

use super::{optional_u64, required_pid, required_str};
use crate::session::{SessionStatus, TerminateOutcome};
use crate::{BuiltinTool, ToolContext, ToolOutcome, ToolOutput};

/// Starts a command and returns its first output.
pub struct ExecuteCommandTool;

#[async_trait::async_trait]
impl BuiltinTool for ExecuteCommandTool {
    fn name(&self) -> &'static str {
        "execute_command"
    }

    fn description(&self) -> &'static str {
        "Execute a terminal command. Waits up to timeout_ms for it to finish; \
         if it is still running, returns the output so far and its PID for read_output. \
         Optional cwd must be a directory with full access."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command to execute"
                },
                "timeout_ms": {
                    "type": "integer",
                    "description": "How long to wait for completion, in milliseconds (default: 1000, max: 600000)"
                },
                "cwd": {
                    "type": "string",
                    "description": "Working directory for the command"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let command = required_str(&args, "command")?;
        let timeout = ctx
            .sessions
            .config()
            .clamp_timeout(optional_u64(&args, "timeout_ms")?);
        let cwd = args.get("cwd").and_then(Value::as_str);

        let outcome = ctx.sessions.execute(command, timeout, cwd).await?;
        let pid = outcome.pid;

        let text = if !outcome.output.is_empty() {
            outcome.output
        } else {
            match outcome.status.exit_code() {
                None => format!(
                    "Command started with PID: {pid}. No output yet. \
                     Use read_output with this PID to get more output."
                ),
                Some(code) => {
                    format!("Command exited with code {code} and PID: {pid}. No output produced.")
                },
            }
        };

        Ok(ToolOutput::text(text).with_metadata(json!({
            "pid": pid,
            "isRunning": outcome.status.is_running(),
            "exitCode": outcome.status.exit_code(),
        })))
    }
}

/// Drains the output a session produced since the last read.
pub struct ReadOutputTool;

#[async_trait::async_trait]
impl BuiltinTool for ReadOutputTool {
    fn name(&self) -> &'static str {
        "read_output"
    }

    fn description(&self) -> &'static str {
        "Read new output from a command started with execute_command."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pid": {
                    "type": "integer",
                    "description": "PID returned by execute_command"
                }
            },
            "required": ["pid"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let pid = required_pid(&args)?;
        let chunk = ctx.sessions.read_output(pid)?;

        let text = if !chunk.output.is_empty() {
            chunk.output
        } else {
            match chunk.status.exit_code() {
                None => "No new output. Process still running. Try again later for more output."
                    .to_string(),
                Some(code) => format!("No new output. Process exited with code {code}."),
            }
        };

        Ok(ToolOutput::text(text).with_metadata(json!({
            "pid": pid,
            "isRunning": chunk.status.is_running(),
            "exitCode": chunk.status.exit_code(),
            "command": chunk.command,
        })))
    }
}

/// Kills a running session.
pub struct ForceTerminateTool;

#[async_trait::async_trait]
impl BuiltinTool for ForceTerminateTool {
    fn name(&self) -> &'static str {
        "force_terminate"
    }

    fn description(&self) -> &'static str {
        "Terminate a running command session by PID."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pid": {
                    "type": "integer",
                    "description": "PID of the session to terminate"
                }
            },
            "required": ["pid"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let pid = required_pid(&args)?;
        let text = match ctx.sessions.force_terminate(pid).await? {
            TerminateOutcome::Terminated => format!("Process with PID: {pid} has been terminated"),
            TerminateOutcome::AlreadyFinished(status) => format!(
                "Process with PID: {pid} has already {}",
                describe_terminal(status)
            ),
        };
        Ok(ToolOutput::text(text))
    }
}

fn describe_terminal(status: SessionStatus) -> String {
    match status {
        SessionStatus::Killed => "been terminated".to_string(),
        SessionStatus::Exited { code } => format!("exited with code {code}"),
        SessionStatus::Running => "finished".to_string(),
    }
}

/// Lists every registered session.
pub struct ListSessionsTool;

#[async_trait::async_trait]
impl BuiltinTool for ListSessionsTool {
    fn name(&self) -> &'static str {
        "list_sessions"
    }

    fn description(&self) -> &'static str {
        "List command sessions with their PID, command and status."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _args: Value, ctx: &ToolContext) -> ToolOutcome {
        let sessions = ctx.sessions.list_sessions();
        if sessions.is_empty() {
            return Ok(ToolOutput::text("No active command sessions")
                .with_metadata(json!({ "sessions": [] })));
        }

        let text = sessions
            .iter()
            .map(|s| {
                let status = match s.exit_code {
                    _ if s.is_running => "Running".to_string(),
                    Some(code) => format!("Exited ({code})"),
                    None => "Exited".to_string(),
                };
                format!("PID: {} - Command: {} - Status: {status}", s.pid, s.command)
            })
            .collect::<Vec<_>>()
            .join("\n");

        Ok(ToolOutput::text(text).with_metadata(json!({ "sessions": sessions })))
    }
}
