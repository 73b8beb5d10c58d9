//! The tools themselves, grouped by what they act on.

mod files;
mod policy;
mod process;

pub use files::{
    CreateDirectoryTool, GetFileInfoTool, ListDirectoryTool, MoveFileTool, ReadFileTool,
    ReadMultipleFilesTool, SearchFilesTool, WriteFileTool,
};
pub use policy::{
    BlockCommandTool, ListAllowedDirectoriesTool, ListBlockedCommandsTool, ReloadPolicyTool,
    UnblockCommandTool,
};
pub use process::{ExecuteCommandTool, ForceTerminateTool, ListSessionsTool, ReadOutputTool};

use serde_json::Value;

use crate::error::{ToolError, ToolOutcome};

fn required_str<'a>(args: &'a Value, key: &str) -> ToolOutcome<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments(format!("{key} is required")))
}

fn optional_u64(args: &Value, key: &str) -> ToolOutcome<Option<u64>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| ToolError::InvalidArguments(format!("{key} must be a non-negative integer"))),
    }
}

fn required_pid(args: &Value) -> ToolOutcome<u32> {
    let pid = optional_u64(args, "pid")?
        .ok_or_else(|| ToolError::InvalidArguments("pid is required".into()))?;
    u32::try_from(pid).map_err(|_| ToolError::InvalidArguments(format!("pid {pid} is out of range")))
}
