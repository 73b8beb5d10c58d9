//! File tools, all routed through the gated [`FileOpGateway`](crate::FileOpGateway).

use serde_json::{Value, json};

use super::required_str;
use crate::error::ToolError;
use crate::{BuiltinTool, ToolContext, ToolOutcome, ToolOutput};

fn path_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "path": {
                "type": "string",
                "description": description
            }
        },
        "required": ["path"]
    })
}

/// Reads a text file.
pub struct ReadFileTool;

#[async_trait::async_trait]
impl BuiltinTool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read the complete contents of a file. Only works within allowed directories."
    }

    fn input_schema(&self) -> Value {
        path_schema("Path of the file to read")
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let path = required_str(&args, "path")?;
        Ok(ToolOutput::text(ctx.files.read_file(path).await?))
    }
}

/// Reads several files, reporting failures per file.
pub struct ReadMultipleFilesTool;

#[async_trait::async_trait]
impl BuiltinTool for ReadMultipleFilesTool {
    fn name(&self) -> &'static str {
        "read_multiple_files"
    }

    fn description(&self) -> &'static str {
        "Read several files at once. A file that cannot be read is reported inline \
         and does not stop the others."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "paths": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Paths of the files to read"
                }
            },
            "required": ["paths"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let paths: Vec<String> = args
            .get("paths")
            .and_then(Value::as_array)
            .ok_or_else(|| ToolError::InvalidArguments("paths is required".into()))?
            .iter()
            .map(|p| {
                p.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ToolError::InvalidArguments("paths must be strings".into()))
            })
            .collect::<Result<_, _>>()?;

        let text = ctx
            .files
            .read_multiple(&paths)
            .await
            .into_iter()
            .map(|(path, result)| match result {
                Ok(content) => format!("{path}:\n{content}\n"),
                Err(e) => format!("{path}: Error - {e}"),
            })
            .collect::<Vec<_>>()
            .join("\n---\n");
        Ok(ToolOutput::text(text))
    }
}

/// Creates or overwrites a file.
pub struct WriteFileTool;

#[async_trait::async_trait]
impl BuiltinTool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Create a new file or overwrite an existing one, creating missing parent directories. \
         Requires write access."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path of the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let path = required_str(&args, "path")?;
        let content = required_str(&args, "content")?;
        let written = ctx.files.write_file(path, content).await?;
        Ok(ToolOutput::text(format!(
            "Successfully wrote to {}",
            written.display()
        )))
    }
}

/// Creates a directory tree.
pub struct CreateDirectoryTool;

#[async_trait::async_trait]
impl BuiltinTool for CreateDirectoryTool {
    fn name(&self) -> &'static str {
        "create_directory"
    }

    fn description(&self) -> &'static str {
        "Create a directory, including any missing parents. Succeeds if it already exists."
    }

    fn input_schema(&self) -> Value {
        path_schema("Path of the directory to create")
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let path = required_str(&args, "path")?;
        let created = ctx.files.create_directory(path).await?;
        Ok(ToolOutput::text(format!(
            "Successfully created directory {}",
            created.display()
        )))
    }
}

/// Lists a directory with `[DIR]`/`[FILE]` tags.
pub struct ListDirectoryTool;

#[async_trait::async_trait]
impl BuiltinTool for ListDirectoryTool {
    fn name(&self) -> &'static str {
        "list_directory"
    }

    fn description(&self) -> &'static str {
        "List the entries of a directory, each prefixed with [DIR] or [FILE]."
    }

    fn input_schema(&self) -> Value {
        path_schema("Path of the directory to list")
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let path = required_str(&args, "path")?;
        let entries = ctx.files.list_directory(path).await?;
        let text = entries
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        Ok(ToolOutput::text(text).with_metadata(json!({ "entries": entries })))
    }
}

/// Moves or renames a file or directory.
pub struct MoveFileTool;

#[async_trait::async_trait]
impl BuiltinTool for MoveFileTool {
    fn name(&self) -> &'static str {
        "move_file"
    }

    fn description(&self) -> &'static str {
        "Move or rename a file or directory. Both locations need write access."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "source": {
                    "type": "string",
                    "description": "Current path"
                },
                "destination": {
                    "type": "string",
                    "description": "New path"
                }
            },
            "required": ["source", "destination"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let source = required_str(&args, "source")?;
        let destination = required_str(&args, "destination")?;
        let (from, to) = ctx.files.move_file(source, destination).await?;
        Ok(ToolOutput::text(format!(
            "Successfully moved {} to {}",
            from.display(),
            to.display()
        )))
    }
}

/// Finds files by name.
pub struct SearchFilesTool;

#[async_trait::async_trait]
impl BuiltinTool for SearchFilesTool {
    fn name(&self) -> &'static str {
        "search_files"
    }

    fn description(&self) -> &'static str {
        "Recursively search for files and directories whose name contains the pattern \
         (case-insensitive). Paths outside allowed directories are skipped."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to start from"
                },
                "pattern": {
                    "type": "string",
                    "description": "Substring to look for in names"
                }
            },
            "required": ["path", "pattern"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        // `root` is accepted as an alias of `path`.
        let root = required_str(&args, "path").or_else(|_| required_str(&args, "root"))?;
        let pattern = required_str(&args, "pattern")?;

        let found = ctx.files.search(root, pattern).await?;
        if found.is_empty() {
            return Ok(ToolOutput::text("No matches found"));
        }
        let text = found
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join("\n");
        Ok(ToolOutput::text(text))
    }
}

/// Reports size, timestamps, type and permissions.
pub struct GetFileInfoTool;

#[async_trait::async_trait]
impl BuiltinTool for GetFileInfoTool {
    fn name(&self) -> &'static str {
        "get_file_info"
    }

    fn description(&self) -> &'static str {
        "Get metadata for a file or directory: size, timestamps, type and permissions."
    }

    fn input_schema(&self) -> Value {
        path_schema("Path to inspect")
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let path = required_str(&args, "path")?;
        let info = ctx.files.file_info(path).await?;

        let time = |t: Option<chrono::DateTime<chrono::Utc>>| {
            t.map_or_else(|| "unknown".to_string(), |t| t.to_rfc3339())
        };
        let text = [
            format!("size: {}", info.size),
            format!("created: {}", time(info.created)),
            format!("modified: {}", time(info.modified)),
            format!("accessed: {}", time(info.accessed)),
            format!("isDirectory: {}", info.is_directory),
            format!("isFile: {}", info.is_file),
            format!("permissions: {}", info.permissions),
        ]
        .join("\n");

        Ok(ToolOutput::text(text).with_metadata(json!(info)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SessionConfig, ToolRegistry};
    use shellgate_policy::{DirectoryPermission, PathEnv, PermissionLevel, Policy, PolicyStore};
    use shellgate_telemetry::EventLog;
    use std::collections::{BTreeSet, HashMap};
    use std::sync::Arc;

    fn context(root: &std::path::Path) -> ToolContext {
        let policy = Policy {
            blocked_commands: BTreeSet::new(),
            directories: vec![DirectoryPermission::new(root, PermissionLevel::ReadWrite)],
            command_aliases: HashMap::new(),
        };
        let store = Arc::new(PolicyStore::in_memory(
            policy,
            PathEnv::new(root, None),
            Arc::new(EventLog::disabled()),
        ));
        ToolContext::new(store, SessionConfig::default(), root.to_path_buf())
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let registry = ToolRegistry::with_defaults();

        let written = registry
            .call(
                "write_file",
                json!({"path": "notes/today.md", "content": "# Today"}),
                &ctx,
            )
            .await;
        assert!(!written.is_error, "{}", written.text_content());

        let read = registry
            .call("read_file", json!({"path": "notes/today.md"}), &ctx)
            .await;
        assert_eq!(read.text_content(), "# Today");
    }

    #[tokio::test]
    async fn test_read_multiple_reports_inline_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        let ctx = context(dir.path());

        let result = ToolRegistry::with_defaults()
            .call(
                "read_multiple_files",
                json!({"paths": ["a.txt", "/definitely/outside.txt"]}),
                &ctx,
            )
            .await;
        assert!(!result.is_error);
        let text = result.text_content();
        assert!(text.contains("a.txt:\nalpha\n"));
        assert!(text.contains("/definitely/outside.txt: Error - "));
    }

    #[tokio::test]
    async fn test_list_directory_tags() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("file.txt"), "").unwrap();
        let ctx = context(dir.path());

        let result = ToolRegistry::with_defaults()
            .call("list_directory", json!({"path": "."}), &ctx)
            .await;
        assert_eq!(result.text_content(), "[FILE] file.txt\n[DIR] sub");
    }

    #[tokio::test]
    async fn test_search_without_matches() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let result = ToolRegistry::with_defaults()
            .call("search_files", json!({"path": ".", "pattern": "zzz"}), &ctx)
            .await;
        assert_eq!(result.text_content(), "No matches found");
    }

    #[tokio::test]
    async fn test_file_info_metadata() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "12345").unwrap();
        let ctx = context(dir.path());

        let result = ToolRegistry::with_defaults()
            .call("get_file_info", json!({"path": "f.txt"}), &ctx)
            .await;
        assert!(result.text_content().contains("isDirectory: false"));
        let meta = result.metadata.as_ref().unwrap();
        assert_eq!(meta["size"], 5);
        assert_eq!(meta["isFile"], true);
    }

    #[tokio::test]
    async fn test_move_requires_both_paths() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let result = ToolRegistry::with_defaults()
            .call("move_file", json!({"source": "a.txt"}), &ctx)
            .await;
        assert!(result.is_error);
        assert!(result.text_content().contains("destination is required"));
    }
}
