//! Policy data model and its on-disk JSON form.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::expand::{PathEnv, is_within};

/// Commands blocked when no usable policy file exists.
pub const DEFAULT_BLOCKED_COMMANDS: &[&str] = &[
    "format", "mount", "umount", "mkfs", "fdisk", "dd", "sudo", "su", "passwd", "adduser",
    "useradd", "usermod", "groupadd",
];

/// An operation a caller wants to perform on a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Read contents, list, stat or search.
    Read,
    /// Create, modify, move or delete.
    Write,
    /// Run a command with the path as its working directory.
    Execute,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Execute => write!(f, "execute"),
        }
    }
}

/// Permission level granted to an allowed directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    /// Read only.
    ReadOnly,
    /// Read and write.
    ReadWrite,
    /// Read, write and execute.
    FullAccess,
}

impl PermissionLevel {
    /// Whether this level grants `operation`.
    #[must_use]
    pub fn covers(self, operation: Operation) -> bool {
        match self {
            Self::ReadOnly => operation == Operation::Read,
            Self::ReadWrite => matches!(operation, Operation::Read | Operation::Write),
            Self::FullAccess => true,
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "read_only"),
            Self::ReadWrite => write!(f, "read_write"),
            Self::FullAccess => write!(f, "full_access"),
        }
    }
}

/// An allowed directory and what may be done inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryPermission {
    /// Absolute, normalized directory path.
    pub path: PathBuf,
    /// Granted level.
    pub permission: PermissionLevel,
    /// The directory with symlinks resolved, when it exists.
    #[serde(skip)]
    pub(crate) real_path: Option<PathBuf>,
}

impl DirectoryPermission {
    /// Create an entry, resolving the directory's real path if it exists.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, permission: PermissionLevel) -> Self {
        let path = path.into();
        let real_path = path.canonicalize().ok().filter(|real| *real != path);
        Self {
            path,
            permission,
            real_path,
        }
    }

    /// Whether `candidate` is this directory or lies beneath it.
    #[must_use]
    pub fn contains(&self, candidate: &Path) -> bool {
        is_within(candidate, &self.path)
            || self
                .real_path
                .as_deref()
                .is_some_and(|real| is_within(candidate, real))
    }

    fn depth(&self) -> usize {
        self.path.components().count()
    }
}

/// The access-control policy snapshot every decision is taken against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    /// Lower-cased executable names that may not be run.
    pub blocked_commands: BTreeSet<String>,
    /// Allowed directories, in configuration order.
    pub directories: Vec<DirectoryPermission>,
    /// Command aliases, user-supplied name to replacement.
    pub command_aliases: HashMap<String, String>,
}

impl Policy {
    /// The conservative built-in policy: destructive commands blocked, the
    /// working directory and the home directory fully accessible.
    #[must_use]
    pub fn default_for(env: &PathEnv) -> Self {
        let mut directories = vec![DirectoryPermission::new(
            env.cwd.clone(),
            PermissionLevel::FullAccess,
        )];
        if let Some(home) = &env.home
            && *home != env.cwd
        {
            directories.push(DirectoryPermission::new(
                home.clone(),
                PermissionLevel::FullAccess,
            ));
        }

        Self {
            blocked_commands: DEFAULT_BLOCKED_COMMANDS
                .iter()
                .map(|c| (*c).to_string())
                .collect(),
            directories,
            command_aliases: HashMap::new(),
        }
    }

    /// Resolve the on-disk form into a policy.
    ///
    /// `directoryPermissions` wins over `allowedDirectories` when both are
    /// present. Legacy `allowedDirectories` entries are granted full access.
    #[must_use]
    pub fn from_file(file: PolicyFile, env: &PathEnv) -> Self {
        let blocked_commands = file
            .blocked_commands
            .unwrap_or_default()
            .iter()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect();

        let directories = if let Some(entries) = file.directory_permissions {
            entries
                .into_iter()
                .map(|e| DirectoryPermission::new(env.expand(&e.path), e.permission))
                .collect()
        } else {
            let raw = match file.allowed_directories {
                Some(AllowedDirectories::List(dirs)) => Some(dirs),
                Some(AllowedDirectories::PerPlatform(map)) => platform_keys()
                    .iter()
                    .find_map(|key| map.get(*key).cloned()),
                None => None,
            };
            match raw {
                Some(dirs) => dirs
                    .iter()
                    .map(|d| DirectoryPermission::new(env.expand(d), PermissionLevel::FullAccess))
                    .collect(),
                None => Self::default_for(env).directories,
            }
        };

        Self {
            blocked_commands,
            directories,
            command_aliases: file.command_aliases,
        }
    }

    /// The most specific directory entry containing `path`.
    ///
    /// Ties are won by the entry listed first.
    #[must_use]
    pub fn match_directory(&self, path: &Path) -> Option<&DirectoryPermission> {
        self.directories
            .iter()
            .filter(|entry| entry.contains(path))
            .fold(None, |best: Option<&DirectoryPermission>, entry| match best {
                Some(b) if b.depth() >= entry.depth() => Some(b),
                _ => Some(entry),
            })
    }

    /// Whether the executable token `name` is blocked.
    #[must_use]
    pub fn is_blocked(&self, name: &str) -> bool {
        self.blocked_commands.contains(name)
    }
}

/// Platform keys looked up in a per-platform `allowedDirectories` map.
///
/// Includes the names historical policy files use (`darwin`, `win32`).
fn platform_keys() -> &'static [&'static str] {
    if cfg!(target_os = "macos") {
        &["darwin", "macos"]
    } else if cfg!(windows) {
        &["win32", "windows"]
    } else {
        &[std::env::consts::OS]
    }
}

/// `allowedDirectories` as written in the policy file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AllowedDirectories {
    /// Flat list applying to every platform.
    List(Vec<String>),
    /// Lists keyed by platform name.
    PerPlatform(HashMap<String, Vec<String>>),
}

/// One `directoryPermissions` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryPermissionEntry {
    /// Directory, possibly using `~`, `.` or `%VAR%`.
    pub path: String,
    /// Granted level.
    pub permission: PermissionLevel,
}

/// The policy file as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyFile {
    /// Blocked executable names.
    #[serde(default)]
    pub blocked_commands: Option<Vec<String>>,
    /// Legacy allowed directories.
    #[serde(default)]
    pub allowed_directories: Option<AllowedDirectories>,
    /// Directories with explicit permission levels.
    #[serde(default)]
    pub directory_permissions: Option<Vec<DirectoryPermissionEntry>>,
    /// Command aliases.
    #[serde(default)]
    pub command_aliases: HashMap<String, String>,
}
