//! Path validation against the allowed directory list.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::{PolicyError, PolicyResult};
use crate::store::PolicyStore;
use crate::types::{DirectoryPermission, Operation, PermissionLevel, Policy};

/// A granted path request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathDecision {
    /// Absolute, normalized path, with symlinks resolved where the path
    /// (or its parent) exists.
    pub path: PathBuf,
    /// The operation that was granted.
    pub operation: Operation,
    /// Permission level of the directory entry that granted it.
    pub permission: PermissionLevel,
}

/// Decides whether a path may be read, written or used as a working
/// directory.
///
/// Every call is taken against the store's current snapshot and every
/// outcome is written to the access log.
#[derive(Debug, Clone)]
pub struct PathGate {
    store: Arc<PolicyStore>,
}

impl PathGate {
    /// Create a gate over `store`.
    #[must_use]
    pub fn new(store: Arc<PolicyStore>) -> Self {
        Self { store }
    }

    /// The underlying policy store.
    #[must_use]
    pub fn store(&self) -> &Arc<PolicyStore> {
        &self.store
    }

    /// Validate `requested` for `operation`.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::AccessDenied`] when the path is outside every
    /// allowed directory, resolves outside them through a symlink, or sits
    /// in a directory whose permission level does not cover `operation`.
    pub fn validate(&self, requested: &str, operation: Operation) -> PolicyResult<PathDecision> {
        let policy = self.store.snapshot();
        let nominal = self.store.env().expand(requested);
        let result = decide(&policy, nominal.clone(), operation);

        let (logged, allowed) = match &result {
            Ok(decision) => (decision.path.as_path(), true),
            Err(PolicyError::AccessDenied { path, .. }) => (path.as_path(), false),
            Err(_) => (nominal.as_path(), false),
        };
        debug!(%operation, path = %logged.display(), allowed, "path check");
        self.store.events().access(operation, logged, allowed);

        result
    }

    /// The effective directory list of the current snapshot.
    #[must_use]
    pub fn allowed_directories(&self) -> Vec<DirectoryPermission> {
        self.store.snapshot().directories.clone()
    }
}

fn decide(policy: &Policy, nominal: PathBuf, operation: Operation) -> PolicyResult<PathDecision> {
    let real = resolve_real(&nominal);

    if let Some(entry) = policy.match_directory(&nominal) {
        require(entry, &nominal, operation)?;
        // The nominal path is inside an entry; its real target must be too.
        return match real {
            Some(real) => grant(policy, real, operation),
            None => Ok(PathDecision {
                path: nominal,
                operation,
                permission: entry.permission,
            }),
        };
    }

    match real {
        Some(real) => grant(policy, real, operation),
        None => Err(outside(nominal, operation)),
    }
}

fn grant(policy: &Policy, path: PathBuf, operation: Operation) -> PolicyResult<PathDecision> {
    let Some(entry) = policy.match_directory(&path) else {
        return Err(outside(path, operation));
    };
    require(entry, &path, operation)?;
    Ok(PathDecision {
        path,
        operation,
        permission: entry.permission,
    })
}

fn require(entry: &DirectoryPermission, path: &Path, operation: Operation) -> PolicyResult<()> {
    if entry.permission.covers(operation) {
        return Ok(());
    }
    Err(PolicyError::AccessDenied {
        path: path.to_path_buf(),
        operation,
        reason: format!(
            "{} is {}, which does not allow {operation}",
            entry.path.display(),
            entry.permission
        ),
    })
}

fn outside(path: PathBuf, operation: Operation) -> PolicyError {
    PolicyError::AccessDenied {
        path,
        operation,
        reason: "path is outside the allowed directories".to_string(),
    }
}

/// Resolve symlinks in `path`, or in its nearest existing ancestor with
/// the missing components re-appended. `None` when no ancestor exists.
fn resolve_real(path: &Path) -> Option<PathBuf> {
    path.ancestors().find_map(|ancestor| {
        let real = ancestor.canonicalize().ok()?;
        let missing = path.strip_prefix(ancestor).ok()?;
        Some(if missing.as_os_str().is_empty() {
            real
        } else {
            real.join(missing)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expand::PathEnv;
    use shellgate_telemetry::{EventChannel, EventLog};
    use std::collections::{BTreeSet, HashMap};

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        events: Arc<EventLog>,
        gate: PathGate,
    }

    /// `root/full` is full_access, `root/full/ro` read_only, `root/rw`
    /// read_write and `root/outside` is not listed.
    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        for sub in ["full/ro", "rw", "outside"] {
            std::fs::create_dir_all(root.join(sub)).unwrap();
        }

        let policy = Policy {
            blocked_commands: BTreeSet::new(),
            directories: vec![
                DirectoryPermission::new(root.join("full"), PermissionLevel::FullAccess),
                DirectoryPermission::new(root.join("full/ro"), PermissionLevel::ReadOnly),
                DirectoryPermission::new(root.join("rw"), PermissionLevel::ReadWrite),
            ],
            command_aliases: HashMap::new(),
        };
        let events = Arc::new(EventLog::in_memory());
        let store = PolicyStore::in_memory(
            policy,
            PathEnv::new(root.join("full"), None),
            Arc::clone(&events),
        );

        Fixture {
            _dir: dir,
            root,
            events,
            gate: PathGate::new(Arc::new(store)),
        }
    }

    fn arg(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_write_under_full_access_returns_canonical_path() {
        let fx = fixture();
        let target = fx.root.join("full/new/../file.txt");

        let decision = fx.gate.validate(&arg(&target), Operation::Write).unwrap();
        assert_eq!(decision.path, fx.root.join("full/file.txt"));
        assert_eq!(decision.permission, PermissionLevel::FullAccess);
    }

    #[test]
    fn test_relative_path_resolves_against_cwd() {
        let fx = fixture();
        let decision = fx.gate.validate("notes.md", Operation::Read).unwrap();
        assert_eq!(decision.path, fx.root.join("full/notes.md"));
    }

    #[test]
    fn test_outside_denied_for_every_operation() {
        let fx = fixture();
        let target = fx.root.join("outside/secret");

        for op in [Operation::Read, Operation::Write, Operation::Execute] {
            let err = fx.gate.validate(&arg(&target), op).unwrap_err();
            assert!(err.is_denial(), "{op} should be denied");
        }
    }

    #[test]
    fn test_parent_traversal_cannot_escape() {
        let fx = fixture();
        let target = fx.root.join("full/../outside/secret");
        assert!(fx.gate.validate(&arg(&target), Operation::Read).is_err());
    }

    #[test]
    fn test_permission_levels_are_enforced() {
        let fx = fixture();
        let rw = arg(&fx.root.join("rw/a.txt"));
        let ro = arg(&fx.root.join("full/ro/a.txt"));

        assert!(fx.gate.validate(&rw, Operation::Write).is_ok());
        assert!(fx.gate.validate(&rw, Operation::Execute).is_err());
        assert!(fx.gate.validate(&ro, Operation::Read).is_ok());
        // The nested read_only entry is more specific than its full_access parent.
        assert!(fx.gate.validate(&ro, Operation::Write).is_err());
    }

    #[test]
    fn test_decisions_are_logged() {
        let fx = fixture();
        let _ = fx.gate.validate(&arg(&fx.root.join("full/x")), Operation::Read);
        let _ = fx.gate.validate(&arg(&fx.root.join("outside/x")), Operation::Read);

        let lines = fx.events.captured(EventChannel::Access);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("ALLOW"));
        assert!(lines[1].ends_with("DENY"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escaping_allowed_directory_is_denied() {
        let fx = fixture();
        std::fs::write(fx.root.join("outside/secret"), "x").unwrap();
        std::os::unix::fs::symlink(fx.root.join("outside"), fx.root.join("full/link")).unwrap();

        let target = arg(&fx.root.join("full/link/secret"));
        assert!(fx.gate.validate(&target, Operation::Read).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_into_allowed_directory_is_granted() {
        let fx = fixture();
        std::os::unix::fs::symlink(fx.root.join("rw"), fx.root.join("outside/into-rw")).unwrap();

        let target = arg(&fx.root.join("outside/into-rw/new.txt"));
        let decision = fx.gate.validate(&target, Operation::Write).unwrap();
        assert_eq!(decision.path, fx.root.join("rw/new.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_deep_missing_path_under_escaping_symlink_is_denied() {
        let fx = fixture();
        std::os::unix::fs::symlink(fx.root.join("outside"), fx.root.join("full/link")).unwrap();

        for depth in ["link/a", "link/x/y/z.txt", "link/a/b/c/d/e.txt"] {
            let target = arg(&fx.root.join("full").join(depth));
            for op in [Operation::Read, Operation::Write] {
                assert!(
                    fx.gate.validate(&target, op).unwrap_err().is_denial(),
                    "{depth} should be denied for {op}"
                );
            }
        }
    }

    #[test]
    fn test_resolve_real_appends_every_missing_component() {
        let fx = fixture();
        let real = resolve_real(&fx.root.join("rw/a/b/c/d.txt")).unwrap();
        assert_eq!(real, fx.root.join("rw/a/b/c/d.txt"));
    }

    #[test]
    fn test_not_yet_existing_nested_path() {
        let fx = fixture();
        let target = arg(&fx.root.join("rw/newdir/file.txt"));
        let decision = fx.gate.validate(&target, Operation::Write).unwrap();
        assert_eq!(decision.path, fx.root.join("rw/newdir/file.txt"));
    }
}
