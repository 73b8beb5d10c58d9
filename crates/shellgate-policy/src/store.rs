//! Policy loading, snapshots and persistence.

use serde_json::Value;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};

use shellgate_telemetry::EventLog;

use crate::error::{PolicyError, PolicyResult};
use crate::expand::PathEnv;
use crate::types::{Policy, PolicyFile};

/// Maximum accepted policy file size (1 MB).
const MAX_POLICY_FILE_SIZE: usize = 1_048_576;

/// Owner of the access-control policy.
///
/// Holds an immutable snapshot that gates read through [`snapshot`](Self::snapshot).
/// The snapshot is replaced wholesale by [`reload`](Self::reload) and by
/// blocklist edits, never mutated in place, so a decision that started
/// against one snapshot finishes against the same one.
#[derive(Debug)]
pub struct PolicyStore {
    path: Option<PathBuf>,
    env: PathEnv,
    current: RwLock<Arc<Policy>>,
    // Serializes read-modify-persist cycles on the blocklist.
    update_lock: Mutex<()>,
    events: Arc<EventLog>,
}

impl PolicyStore {
    /// Load the policy file at `path` against the current process environment.
    ///
    /// Never fails: a missing or unreadable file yields the built-in default.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>, events: Arc<EventLog>) -> Self {
        Self::open_with_env(path, PathEnv::current(), events)
    }

    /// Load the policy file at `path`, expanding paths against `env`.
    #[must_use]
    pub fn open_with_env(path: impl Into<PathBuf>, env: PathEnv, events: Arc<EventLog>) -> Self {
        let path = path.into();
        let policy = load_policy(&path, &env, &events);
        Self {
            path: Some(path),
            env,
            current: RwLock::new(Arc::new(policy)),
            update_lock: Mutex::new(()),
            events,
        }
    }

    /// A store with no backing file; blocklist edits stay in memory.
    #[must_use]
    pub fn in_memory(policy: Policy, env: PathEnv, events: Arc<EventLog>) -> Self {
        Self {
            path: None,
            env,
            current: RwLock::new(Arc::new(policy)),
            update_lock: Mutex::new(()),
            events,
        }
    }

    /// Path of the backing policy file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Directories used for `~` and relative path expansion.
    #[must_use]
    pub fn env(&self) -> &PathEnv {
        &self.env
    }

    /// The event log decisions are recorded to.
    #[must_use]
    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    /// Read the policy from its file without installing it.
    ///
    /// Falls back to the built-in default on any failure.
    #[must_use]
    pub fn load(&self) -> Policy {
        match &self.path {
            Some(path) => load_policy(path, &self.env, &self.events),
            None => (*self.snapshot()).clone(),
        }
    }

    /// Re-read the policy file and install it as the current snapshot.
    pub fn reload(&self) -> Arc<Policy> {
        let _guard = self.update_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let policy = Arc::new(self.load());
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&policy);
        info!(
            directories = policy.directories.len(),
            blocked = policy.blocked_commands.len(),
            "policy reloaded"
        );
        self.events.diagnostic("policy reloaded");
        policy
    }

    /// The current policy snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Policy> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// The alias for `command`, or `command` unchanged.
    ///
    /// An alias keyed by the whole (trimmed) command wins; otherwise an alias
    /// keyed by the first token replaces that token and keeps the arguments.
    #[must_use]
    pub fn resolve_alias(&self, command: &str) -> String {
        let policy = self.snapshot();
        let trimmed = command.trim();

        if let Some(alias) = policy.command_aliases.get(trimmed) {
            return alias.clone();
        }

        let (head, rest) = trimmed
            .split_once(char::is_whitespace)
            .map_or((trimmed, ""), |(h, r)| (h, r.trim_start()));
        match policy.command_aliases.get(head) {
            Some(alias) if rest.is_empty() => alias.clone(),
            Some(alias) => format!("{alias} {rest}"),
            None => command.to_string(),
        }
    }

    /// Apply `edit` to a copy of the blocklist; if it reports a change,
    /// persist the result and install it.
    ///
    /// Returns whether anything changed. On a persistence failure the
    /// in-memory snapshot is left untouched.
    pub(crate) fn update_blocked(
        &self,
        edit: impl FnOnce(&mut BTreeSet<String>) -> bool,
    ) -> PolicyResult<bool> {
        let _guard = self.update_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut next = (*self.snapshot()).clone();
        if !edit(&mut next.blocked_commands) {
            return Ok(false);
        }

        if let Some(path) = &self.path {
            persist_blocked(path, &next.blocked_commands)?;
        }

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
        Ok(true)
    }
}

fn load_policy(path: &Path, env: &PathEnv, events: &EventLog) -> Policy {
    match read_policy_file(path) {
        Ok(Some(file)) => {
            debug!(path = %path.display(), "loaded policy file");
            Policy::from_file(file, env)
        },
        Ok(None) => {
            info!(path = %path.display(), "policy file not found, using defaults");
            events.diagnostic(&format!(
                "policy file not found at {}, using default settings",
                path.display()
            ));
            Policy::default_for(env)
        },
        Err(message) => {
            warn!(path = %path.display(), error = %message, "unusable policy file, using defaults");
            events.diagnostic(&format!(
                "error loading policy from {}: {message}, using default settings",
                path.display()
            ));
            Policy::default_for(env)
        },
    }
}

/// Read and parse the policy file; `Ok(None)` when it does not exist.
fn read_policy_file(path: &Path) -> Result<Option<PolicyFile>, String> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.to_string()),
    };

    if content.len() > MAX_POLICY_FILE_SIZE {
        return Err(format!(
            "policy file is {} bytes, exceeding the {MAX_POLICY_FILE_SIZE} byte limit",
            content.len()
        ));
    }

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| e.to_string())
}

/// Rewrite `blockedCommands` in the policy file, keeping every other field.
fn persist_blocked(path: &Path, blocked: &BTreeSet<String>) -> PolicyResult<()> {
    let mut document = match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => map,
            _ => {
                warn!(path = %path.display(), "replacing unparsable policy file");
                serde_json::Map::new()
            },
        },
        Err(_) => serde_json::Map::new(),
    };

    document.insert(
        "blockedCommands".to_string(),
        Value::Array(blocked.iter().cloned().map(Value::String).collect()),
    );
    let rendered = serde_json::to_string_pretty(&Value::Object(document))?;

    let persist_err = |source: std::io::Error| PolicyError::Persist {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(persist_err)?;
    tmp.write_all(rendered.as_bytes()).map_err(persist_err)?;
    tmp.write_all(b"\n").map_err(persist_err)?;
    tmp.persist(path).map_err(|e| persist_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shellgate_telemetry::EventChannel;
    use std::collections::HashMap;

    fn env_in(dir: &Path) -> PathEnv {
        PathEnv::new(dir, Some(dir.join("home")))
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let events = Arc::new(EventLog::in_memory());
        let store = PolicyStore::open_with_env(
            dir.path().join("config.json"),
            env_in(dir.path()),
            Arc::clone(&events),
        );

        let policy = store.snapshot();
        assert!(policy.is_blocked("sudo"));
        assert_eq!(policy.directories.len(), 2);
        assert_eq!(events.captured(EventChannel::Diagnostic).len(), 1);
    }

    #[test]
    fn test_corrupt_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store =
            PolicyStore::open_with_env(&path, env_in(dir.path()), Arc::new(EventLog::disabled()));
        assert_eq!(*store.snapshot(), Policy::default_for(&env_in(dir.path())));
    }

    #[test]
    fn test_reload_picks_up_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"blockedCommands": ["curl"]}"#).unwrap();

        let store =
            PolicyStore::open_with_env(&path, env_in(dir.path()), Arc::new(EventLog::disabled()));
        assert!(store.snapshot().is_blocked("curl"));

        std::fs::write(&path, r#"{"blockedCommands": ["wget"]}"#).unwrap();
        // Nothing changes until an explicit reload.
        assert!(store.snapshot().is_blocked("curl"));

        store.reload();
        assert!(!store.snapshot().is_blocked("curl"));
        assert!(store.snapshot().is_blocked("wget"));
    }

    #[test]
    fn test_update_blocked_preserves_other_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"blockedCommands": [], "allowedDirectories": ["/srv"], "custom": 1}"#,
        )
        .unwrap();

        let store =
            PolicyStore::open_with_env(&path, env_in(dir.path()), Arc::new(EventLog::disabled()));
        let changed = store
            .update_blocked(|set| set.insert("curl".to_string()))
            .unwrap();
        assert!(changed);

        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["blockedCommands"], serde_json::json!(["curl"]));
        assert_eq!(written["allowedDirectories"], serde_json::json!(["/srv"]));
        assert_eq!(written["custom"], serde_json::json!(1));
    }

    #[test]
    fn test_update_blocked_noop_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let store =
            PolicyStore::open_with_env(&path, env_in(dir.path()), Arc::new(EventLog::disabled()));
        let changed = store.update_blocked(|_| false).unwrap();
        assert!(!changed);
        assert!(!path.exists());
    }

    #[test]
    fn test_resolve_alias() {
        let mut policy = Policy::default_for(&PathEnv::new("/w", None));
        policy.command_aliases = HashMap::from([
            ("ll".to_string(), "ls -la".to_string()),
            ("py".to_string(), "python3".to_string()),
            ("deploy now".to_string(), "make deploy".to_string()),
        ]);
        let store = PolicyStore::in_memory(
            policy,
            PathEnv::new("/w", None),
            Arc::new(EventLog::disabled()),
        );

        assert_eq!(store.resolve_alias("ll"), "ls -la");
        assert_eq!(store.resolve_alias("ll /tmp"), "ls -la /tmp");
        assert_eq!(store.resolve_alias("py script.py"), "python3 script.py");
        assert_eq!(store.resolve_alias("deploy now"), "make deploy");
        assert_eq!(store.resolve_alias("Echo Hi"), "Echo Hi");
    }
}
