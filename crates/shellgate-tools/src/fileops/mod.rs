//! Gated file operations with ordered fallback strategies.
//!
//! Every operation is validated by the [`PathGate`] first; a denial stops it
//! before any strategy runs. The gateway then tries each [`FileStrategy`] in
//! order until one succeeds:
//!
//! 1. [`NativeFs`]: the filesystem API.
//! 2. [`ShellUtility`]: the platform's file utilities (`cat`, `mkdir`, `ls`,
//!    `mv`, `stat`, or their `PowerShell` equivalents).
//! 3. [`TempRelay`] for writes: stage the content in a temporary file and
//!    copy it into place. [`CopyRelay`] for moves: copy, then delete the
//!    source on a best-effort basis.

mod native;
mod relay;
mod shell;

pub use native::NativeFs;
pub use relay::{CopyRelay, TempRelay};
pub use shell::ShellUtility;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use shellgate_policy::{Operation, PathGate};
use shellgate_telemetry::EventLog;

use crate::error::{ToolError, ToolOutcome};

/// One file operation on already-validated paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOp {
    /// Read a file as text.
    Read {
        /// File to read.
        path: PathBuf,
    },
    /// Create or replace a file, creating missing parent directories.
    Write {
        /// File to write.
        path: PathBuf,
        /// New contents.
        content: String,
    },
    /// Create a directory and any missing parents.
    CreateDir {
        /// Directory to create.
        path: PathBuf,
    },
    /// List a directory's immediate entries.
    List {
        /// Directory to list.
        path: PathBuf,
    },
    /// Move or rename a file or directory.
    Move {
        /// Current location.
        from: PathBuf,
        /// New location.
        to: PathBuf,
    },
    /// Read metadata.
    Stat {
        /// Path to inspect.
        path: PathBuf,
    },
}

impl FileOp {
    /// Short operation name for logs and errors.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Read { .. } => "read",
            Self::Write { .. } => "write",
            Self::CreateDir { .. } => "create_directory",
            Self::List { .. } => "list_directory",
            Self::Move { .. } => "move",
            Self::Stat { .. } => "stat",
        }
    }

    fn target(&self) -> &Path {
        match self {
            Self::Read { path }
            | Self::Write { path, .. }
            | Self::CreateDir { path }
            | Self::List { path }
            | Self::Stat { path } => path,
            Self::Move { from, .. } => from,
        }
    }
}

/// A directory entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirEntry {
    /// File name.
    pub name: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

impl fmt::Display for DirEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = if self.is_dir { "[DIR]" } else { "[FILE]" };
        write!(f, "{tag} {}", self.name)
    }
}

/// File metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    /// Size in bytes.
    pub size: u64,
    /// Creation time, where the platform records it.
    pub created: Option<DateTime<Utc>>,
    /// Last modification time.
    pub modified: Option<DateTime<Utc>>,
    /// Last access time.
    pub accessed: Option<DateTime<Utc>>,
    /// Whether the path is a directory.
    pub is_directory: bool,
    /// Whether the path is a regular file.
    pub is_file: bool,
    /// Permission bits as three octal digits, e.g. `644`.
    pub permissions: String,
}

/// What a successful strategy produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutput {
    /// File contents.
    Text(String),
    /// Directory listing.
    Entries(Vec<DirEntry>),
    /// Metadata.
    Info(FileInfo),
    /// The operation has no output.
    Done,
}

/// Outcome of one strategy's attempt.
#[derive(Debug)]
pub enum Attempt {
    /// The operation succeeded.
    Done(FileOutput),
    /// The strategy failed; the next one may still succeed.
    Retryable(String),
    /// The operation cannot succeed by any route (e.g. missing source).
    Fatal(std::io::Error),
    /// The strategy does not handle this operation.
    Unsupported,
}

/// One way of carrying out file operations.
#[async_trait::async_trait]
pub trait FileStrategy: Send + Sync {
    /// Name used in logs and in the combined failure message.
    fn name(&self) -> &'static str;

    /// Try to perform `op`.
    async fn attempt(&self, op: &FileOp) -> Attempt;
}

/// Runs file operations through the path gate and the strategy chain.
pub struct FileOpGateway {
    paths: PathGate,
    strategies: Vec<Box<dyn FileStrategy>>,
    events: Arc<EventLog>,
}

impl fmt::Debug for FileOpGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileOpGateway")
            .field(
                "strategies",
                &self.strategies.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl FileOpGateway {
    /// Gateway with the standard chain, staging temporary files in
    /// `temp_dir`.
    #[must_use]
    pub fn new(paths: PathGate, temp_dir: impl Into<PathBuf>) -> Self {
        let temp_dir = temp_dir.into();
        Self::with_strategies(
            paths,
            vec![
                Box::new(NativeFs),
                Box::new(ShellUtility::new(temp_dir.clone())),
                Box::new(TempRelay::new(temp_dir)),
                Box::new(CopyRelay),
            ],
        )
    }

    /// Gateway with an explicit strategy chain, tried in order.
    #[must_use]
    pub fn with_strategies(paths: PathGate, strategies: Vec<Box<dyn FileStrategy>>) -> Self {
        let events = Arc::clone(paths.store().events());
        Self {
            paths,
            strategies,
            events,
        }
    }

    /// The gate every operation is checked against.
    #[must_use]
    pub fn paths(&self) -> &PathGate {
        &self.paths
    }

    /// Read a file as text.
    ///
    /// # Errors
    ///
    /// A policy denial, a missing file, or every strategy failing.
    pub async fn read_file(&self, path: &str) -> ToolOutcome<String> {
        let path = self.paths.validate(path, Operation::Read)?.path;
        match self.run(&FileOp::Read { path }).await? {
            FileOutput::Text(text) => Ok(text),
            other => Err(unexpected("read", &other)),
        }
    }

    /// Read several files; each one succeeds or fails on its own.
    pub async fn read_multiple(&self, paths: &[String]) -> Vec<(String, ToolOutcome<String>)> {
        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            results.push((path.clone(), self.read_file(path).await));
        }
        results
    }

    /// Create or replace a file. Returns the path written.
    ///
    /// # Errors
    ///
    /// A policy denial or every strategy failing.
    pub async fn write_file(&self, path: &str, content: &str) -> ToolOutcome<PathBuf> {
        let path = self.paths.validate(path, Operation::Write)?.path;
        self.run(&FileOp::Write {
            path: path.clone(),
            content: content.to_string(),
        })
        .await?;
        Ok(path)
    }

    /// Create a directory and any missing parents.
    ///
    /// # Errors
    ///
    /// A policy denial or every strategy failing.
    pub async fn create_directory(&self, path: &str) -> ToolOutcome<PathBuf> {
        let path = self.paths.validate(path, Operation::Write)?.path;
        self.run(&FileOp::CreateDir { path: path.clone() }).await?;
        Ok(path)
    }

    /// List a directory, sorted by name.
    ///
    /// # Errors
    ///
    /// A policy denial, a missing directory, or every strategy failing.
    pub async fn list_directory(&self, path: &str) -> ToolOutcome<Vec<DirEntry>> {
        let path = self.paths.validate(path, Operation::Read)?.path;
        self.list(path).await
    }

    async fn list(&self, path: PathBuf) -> ToolOutcome<Vec<DirEntry>> {
        match self.run(&FileOp::List { path }).await? {
            FileOutput::Entries(mut entries) => {
                entries.sort_by(|a, b| a.name.cmp(&b.name));
                Ok(entries)
            },
            other => Err(unexpected("list_directory", &other)),
        }
    }

    /// Move `source` to `destination`. Both need write permission.
    ///
    /// # Errors
    ///
    /// A policy denial on either path, a missing source, or every strategy
    /// failing.
    pub async fn move_file(&self, source: &str, destination: &str) -> ToolOutcome<(PathBuf, PathBuf)> {
        let from = self.paths.validate(source, Operation::Write)?.path;
        let to = self.paths.validate(destination, Operation::Write)?.path;
        self.run(&FileOp::Move {
            from: from.clone(),
            to: to.clone(),
        })
        .await?;
        Ok((from, to))
    }

    /// Metadata for `path`.
    ///
    /// # Errors
    ///
    /// A policy denial, a missing path, or every strategy failing.
    pub async fn file_info(&self, path: &str) -> ToolOutcome<FileInfo> {
        let path = self.paths.validate(path, Operation::Read)?.path;
        match self.run(&FileOp::Stat { path }).await? {
            FileOutput::Info(info) => Ok(info),
            other => Err(unexpected("stat", &other)),
        }
    }

    /// Every path under `root` whose file name contains `pattern`,
    /// case-insensitively.
    ///
    /// Each visited path is validated on its own; entries the policy refuses
    /// and directories that cannot be listed are skipped.
    ///
    /// # Errors
    ///
    /// Only a policy denial on `root` itself.
    pub async fn search(&self, root: &str, pattern: &str) -> ToolOutcome<Vec<PathBuf>> {
        let root = self.paths.validate(root, Operation::Read)?.path;
        let needle = pattern.to_lowercase();

        let mut results = Vec::new();
        let mut visited = HashSet::new();
        let mut pending = vec![root];

        while let Some(dir) = pending.pop() {
            let key = dir.canonicalize().unwrap_or_else(|_| dir.clone());
            if !visited.insert(key) {
                continue;
            }

            let entries = match self.list(dir.clone()).await {
                Ok(entries) => entries,
                Err(e) => {
                    debug!(dir = %dir.display(), error = %e, "skipping unreadable directory");
                    continue;
                },
            };

            for entry in entries {
                let candidate = dir.join(&entry.name);
                if self
                    .paths
                    .validate(&candidate.to_string_lossy(), Operation::Read)
                    .is_err()
                {
                    continue;
                }
                if entry.name.to_lowercase().contains(&needle) {
                    results.push(candidate.clone());
                }
                if entry.is_dir {
                    pending.push(candidate);
                }
            }
        }

        results.sort();
        Ok(results)
    }

    /// Run `op` through the strategy chain.
    ///
    /// # Errors
    ///
    /// [`ToolError::Io`] when a strategy reports a failure no other route
    /// can fix, [`ToolError::AllTiersFailed`] when every strategy fails.
    pub async fn run(&self, op: &FileOp) -> ToolOutcome<FileOutput> {
        let mut failures = Vec::new();

        for strategy in &self.strategies {
            match strategy.attempt(op).await {
                Attempt::Done(output) => {
                    if !failures.is_empty() {
                        info!(
                            operation = op.kind(),
                            strategy = strategy.name(),
                            path = %op.target().display(),
                            "file operation recovered by fallback"
                        );
                        self.events.diagnostic(&format!(
                            "{} {} succeeded via {}",
                            op.kind(),
                            op.target().display(),
                            strategy.name()
                        ));
                    }
                    return Ok(output);
                },
                Attempt::Retryable(reason) => {
                    debug!(
                        operation = op.kind(),
                        strategy = strategy.name(),
                        %reason,
                        "strategy failed, trying next"
                    );
                    failures.push(format!("{}: {reason}", strategy.name()));
                },
                Attempt::Fatal(e) => {
                    self.events.diagnostic(&format!(
                        "error in {} {}: {e}",
                        op.kind(),
                        op.target().display()
                    ));
                    return Err(ToolError::Io(e));
                },
                Attempt::Unsupported => {},
            }
        }

        warn!(
            operation = op.kind(),
            path = %op.target().display(),
            attempts = failures.len(),
            "every file strategy failed"
        );
        self.events.diagnostic(&format!(
            "error in {} {}: {}",
            op.kind(),
            op.target().display(),
            failures.join("; ")
        ));
        Err(ToolError::AllTiersFailed {
            operation: op.kind(),
            attempts: failures,
        })
    }
}

fn unexpected(operation: &'static str, output: &FileOutput) -> ToolError {
    ToolError::AllTiersFailed {
        operation,
        attempts: vec![format!("unexpected strategy output: {output:?}")],
    }
}

/// Format a permission mode as its last three octal digits.
pub(crate) fn octal_permissions(mode: u32) -> String {
    format!("{:03o}", mode & 0o777)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use shellgate_policy::{DirectoryPermission, PathEnv, PermissionLevel, Policy, PolicyStore};
    use std::collections::{BTreeSet, HashMap};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A strategy that always fails, counting its calls.
    #[derive(Default)]
    pub(crate) struct AlwaysFails(pub(crate) Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl FileStrategy for AlwaysFails {
        fn name(&self) -> &'static str {
            "always_fails"
        }

        async fn attempt(&self, _op: &FileOp) -> Attempt {
            self.0.fetch_add(1, Ordering::SeqCst);
            Attempt::Retryable("simulated failure".to_string())
        }
    }

    /// A gate over `root/allowed` (full access) and `root/readonly`.
    pub(crate) fn gate(root: &Path) -> PathGate {
        let root = root.canonicalize().unwrap();
        std::fs::create_dir_all(root.join("allowed")).unwrap();
        std::fs::create_dir_all(root.join("readonly")).unwrap();
        let policy = Policy {
            blocked_commands: BTreeSet::new(),
            directories: vec![
                DirectoryPermission::new(root.join("allowed"), PermissionLevel::FullAccess),
                DirectoryPermission::new(root.join("readonly"), PermissionLevel::ReadOnly),
            ],
            command_aliases: HashMap::new(),
        };
        let store = PolicyStore::in_memory(
            policy,
            PathEnv::new(root.join("allowed"), None),
            Arc::new(EventLog::in_memory()),
        );
        PathGate::new(Arc::new(store))
    }

    fn arg(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_dir_entry_display() {
        let dir = DirEntry {
            name: "src".into(),
            is_dir: true,
        };
        let file = DirEntry {
            name: "a.txt".into(),
            is_dir: false,
        };
        assert_eq!(dir.to_string(), "[DIR] src");
        assert_eq!(file.to_string(), "[FILE] a.txt");
    }

    #[test]
    fn test_octal_permissions() {
        assert_eq!(octal_permissions(0o100_644), "644");
        assert_eq!(octal_permissions(0o40_755), "755");
        assert_eq!(octal_permissions(0o7), "007");
    }

    #[tokio::test]
    async fn test_denial_short_circuits_every_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let gateway = FileOpGateway::with_strategies(
            gate(dir.path()),
            vec![Box::new(AlwaysFails(Arc::clone(&calls)))],
        );

        let outside = arg(&dir.path().join("elsewhere.txt"));
        let err = gateway.write_file(&outside, "x").await.unwrap_err();
        assert!(err.is_denial());

        let readonly = arg(&dir.path().join("readonly/file.txt"));
        assert!(gateway.write_file(&readonly, "x").await.unwrap_err().is_denial());

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_tiers_failed_lists_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = FileOpGateway::with_strategies(
            gate(dir.path()),
            vec![
                Box::new(AlwaysFails::default()),
                Box::new(AlwaysFails::default()),
            ],
        );

        let target = arg(&dir.path().join("allowed/a.txt"));
        match gateway.read_file(&target).await {
            Err(ToolError::AllTiersFailed {
                operation,
                attempts,
            }) => {
                assert_eq!(operation, "read");
                assert_eq!(attempts.len(), 2);
            },
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fallback_recovers_read() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = FileOpGateway::with_strategies(
            gate(dir.path()),
            vec![Box::new(AlwaysFails::default()), Box::new(NativeFs)],
        );
        let file = dir.path().join("allowed/a.txt");
        std::fs::write(&file, "contents").unwrap();

        assert_eq!(gateway.read_file(&arg(&file)).await.unwrap(), "contents");
    }

    #[tokio::test]
    async fn test_round_trip_through_default_chain() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = FileOpGateway::new(gate(dir.path()), dir.path());
        let allowed = dir.path().join("allowed");

        gateway
            .write_file(&arg(&allowed.join("nested/deeper/a.txt")), "hello")
            .await
            .unwrap();
        gateway.create_directory(&arg(&allowed.join("empty"))).await.unwrap();

        let entries = gateway.list_directory(&arg(&allowed)).await.unwrap();
        let rendered: Vec<String> = entries.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["[DIR] empty", "[DIR] nested"]);

        gateway
            .move_file(
                &arg(&allowed.join("nested/deeper/a.txt")),
                &arg(&allowed.join("moved/b.txt")),
            )
            .await
            .unwrap();
        assert_eq!(
            gateway.read_file(&arg(&allowed.join("moved/b.txt"))).await.unwrap(),
            "hello"
        );

        let info = gateway
            .file_info(&arg(&allowed.join("moved/b.txt")))
            .await
            .unwrap();
        assert_eq!(info.size, 5);
        assert!(info.is_file);
        assert!(!info.is_directory);
        assert_eq!(info.permissions.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_file_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let gateway = FileOpGateway::with_strategies(
            gate(dir.path()),
            vec![Box::new(NativeFs), Box::new(AlwaysFails(Arc::clone(&calls)))],
        );

        let missing = arg(&dir.path().join("allowed/missing.txt"));
        assert!(matches!(
            gateway.read_file(&missing).await,
            Err(ToolError::Io(_))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_read_multiple_reports_each_file() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = FileOpGateway::new(gate(dir.path()), dir.path());
        let good = dir.path().join("allowed/good.txt");
        std::fs::write(&good, "ok").unwrap();

        let results = gateway
            .read_multiple(&[arg(&good), arg(&dir.path().join("secret.txt"))])
            .await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].1.as_ref().unwrap(), "ok");
        assert!(results[1].1.is_err());
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_and_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = FileOpGateway::new(gate(dir.path()), dir.path());
        let allowed = dir.path().canonicalize().unwrap().join("allowed");
        std::fs::create_dir_all(allowed.join("a/b")).unwrap();
        std::fs::write(allowed.join("README.md"), "").unwrap();
        std::fs::write(allowed.join("a/b/readme.txt"), "").unwrap();
        std::fs::write(allowed.join("a/other.txt"), "").unwrap();

        let found = gateway.search(&arg(&allowed), "ReadMe").await.unwrap();
        assert_eq!(
            found,
            vec![allowed.join("README.md"), allowed.join("a/b/readme.txt")]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_search_skips_paths_outside_policy() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = FileOpGateway::new(gate(dir.path()), dir.path());
        let root = dir.path().canonicalize().unwrap();
        std::fs::create_dir_all(root.join("hidden")).unwrap();
        std::fs::write(root.join("hidden/match.txt"), "").unwrap();
        std::os::unix::fs::symlink(root.join("hidden"), root.join("allowed/link")).unwrap();

        let found = gateway.search(&arg(&root.join("allowed")), "match").await.unwrap();
        assert!(found.is_empty());
    }
}
