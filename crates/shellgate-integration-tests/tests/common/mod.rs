//! Shared test harness for integration tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Value, json};
use shellgate_policy::{PathEnv, PolicyStore};
use shellgate_telemetry::EventLog;
use shellgate_tools::{SessionConfig, ToolContext, ToolRegistry, ToolResult};
use tempfile::TempDir;

/// A policy file, an event log directory and an allowed workspace, all
/// under temp dirs that are removed when the harness is dropped.
///
/// The workspace has full access except `readonly/`, which is read-only.
/// `outside` exists on disk but is not in the policy.
#[allow(dead_code)]
pub struct GateHarness {
    /// Tool registry with every tool.
    pub registry: ToolRegistry,
    /// Shared tool state.
    pub ctx: ToolContext,
    /// Canonical workspace root.
    pub workspace: PathBuf,
    /// Canonical directory the policy does not list.
    pub outside: PathBuf,
    /// Policy file location.
    pub config_path: PathBuf,
    /// Where the event logs are written.
    pub log_dir: PathBuf,
    /// Where file fallbacks stage temporary files.
    pub temp_dir: PathBuf,
    _workspace_dir: TempDir,
    _outside_dir: TempDir,
    _state_dir: TempDir,
}

#[allow(dead_code)]
impl GateHarness {
    /// Build a harness whose policy keeps the default blocklist.
    pub fn new() -> Self {
        Self::with_blocked(&[
            "format", "mount", "umount", "mkfs", "fdisk", "dd", "sudo", "su", "passwd",
            "adduser", "useradd", "usermod", "groupadd",
        ])
    }

    /// Build a harness with an explicit blocklist.
    pub fn with_blocked(blocked: &[&str]) -> Self {
        let workspace_dir = TempDir::new().expect("failed to create workspace tempdir");
        let outside_dir = TempDir::new().expect("failed to create outside tempdir");
        let state_dir = TempDir::new().expect("failed to create state tempdir");

        let workspace = workspace_dir.path().canonicalize().unwrap();
        let outside = outside_dir.path().canonicalize().unwrap();
        std::fs::create_dir(workspace.join("readonly")).unwrap();

        let config_path = state_dir.path().join("config.json");
        let policy = json!({
            "blockedCommands": blocked,
            "directoryPermissions": [
                { "path": workspace.display().to_string(), "permission": "full_access" },
                {
                    "path": workspace.join("readonly").display().to_string(),
                    "permission": "read_only"
                },
            ],
            "commandAliases": { "greet": "echo hello from alias" },
        });
        std::fs::write(&config_path, serde_json::to_string_pretty(&policy).unwrap()).unwrap();

        let log_dir = state_dir.path().join("logs");
        let temp_dir = state_dir.path().join("staging");
        std::fs::create_dir(&temp_dir).unwrap();

        let store = Arc::new(PolicyStore::open_with_env(
            &config_path,
            PathEnv::new(&workspace, None),
            Arc::new(EventLog::in_dir(&log_dir)),
        ));
        let ctx = ToolContext::new(store, SessionConfig::default(), temp_dir.clone());

        Self {
            registry: ToolRegistry::with_defaults(),
            ctx,
            workspace,
            outside,
            config_path,
            log_dir,
            temp_dir,
            _workspace_dir: workspace_dir,
            _outside_dir: outside_dir,
            _state_dir: state_dir,
        }
    }

    /// Call a tool by name.
    pub async fn call(&self, tool: &str, args: Value) -> ToolResult {
        self.registry.call(tool, args, &self.ctx).await
    }

    /// Absolute path of `relative` inside the workspace, as a string.
    pub fn path(&self, relative: &str) -> String {
        self.workspace.join(relative).display().to_string()
    }

    /// Contents of one event log file, empty if it was never written.
    pub fn log(&self, file: &str) -> String {
        std::fs::read_to_string(self.log_dir.join(file)).unwrap_or_default()
    }

    /// Files currently in the staging directory.
    pub fn staged_files(&self) -> Vec<PathBuf> {
        list(&self.temp_dir)
    }
}

fn list(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok().map(|e| e.path())).collect())
        .unwrap_or_default()
}
