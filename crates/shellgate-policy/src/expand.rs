//! Path expansion and normalization shared by the store and the gates.

use regex::{Captures, Regex};
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

/// Filesystems on these targets compare names case-insensitively.
const CASE_INSENSITIVE_FS: bool = cfg!(any(windows, target_os = "macos"));

static ENV_VAR_REF: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"%([^%]+)%").ok());

/// Directories that relative paths and `~` expand against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEnv {
    /// Working directory relative paths are resolved against.
    pub cwd: PathBuf,
    /// User home directory, if one could be determined.
    pub home: Option<PathBuf>,
}

impl PathEnv {
    /// Create an environment with explicit directories.
    #[must_use]
    pub fn new(cwd: impl Into<PathBuf>, home: Option<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            home,
        }
    }

    /// The process working directory and the current user's home.
    #[must_use]
    pub fn current() -> Self {
        let home = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf());
        let cwd = std::env::current_dir()
            .ok()
            .or_else(|| home.clone())
            .unwrap_or_else(|| PathBuf::from("/"));
        Self { cwd, home }
    }

    /// Expand `~`, `%VAR%` (Windows only), make absolute, and normalize.
    ///
    /// The path does not need to exist.
    #[must_use]
    pub fn expand(&self, raw: &str) -> PathBuf {
        let expanded = if cfg!(windows) && raw.contains('%') {
            expand_env_vars(raw, |name| std::env::var(name).ok())
        } else {
            raw.to_string()
        };

        let with_home = match (self.home.as_deref(), strip_home_marker(&expanded)) {
            (Some(home), Some(rest)) if rest.is_empty() => home.to_path_buf(),
            (Some(home), Some(rest)) => home.join(rest),
            _ => PathBuf::from(expanded),
        };

        let absolute = if with_home.is_absolute() {
            with_home
        } else {
            self.cwd.join(with_home)
        };

        normalize_lexically(&absolute)
    }
}

/// The remainder after a leading `~` or `~/`, or `None` if there is none.
fn strip_home_marker(raw: &str) -> Option<&str> {
    if raw == "~" {
        return Some("");
    }
    raw.strip_prefix("~/")
        .or_else(|| cfg!(windows).then(|| raw.strip_prefix("~\\")).flatten())
}

/// Replace `%NAME%` references using `lookup`; unknown names become empty.
#[must_use]
pub fn expand_env_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    match ENV_VAR_REF.as_ref() {
        Some(re) => re
            .replace_all(input, |caps: &Captures<'_>| {
                lookup(&caps[1]).unwrap_or_default()
            })
            .into_owned(),
        None => input.to_string(),
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
///
/// `..` at the root stays at the root.
#[must_use]
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => {
                let ends_in_name = matches!(out.components().next_back(), Some(Component::Normal(_)));
                if ends_in_name {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Whether `candidate` equals `dir` or lies beneath it.
///
/// Matching is by whole components, so `/home/al` does not contain
/// `/home/alice`.
pub(crate) fn is_within(candidate: &Path, dir: &Path) -> bool {
    if CASE_INSENSITIVE_FS {
        let lower = |p: &Path| PathBuf::from(p.to_string_lossy().to_lowercase());
        lower(candidate).starts_with(lower(dir))
    } else {
        candidate.starts_with(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> PathEnv {
        PathEnv::new("/work/project", Some(PathBuf::from("/home/alice")))
    }

    #[test]
    fn test_expand_home() {
        let env = env();
        assert_eq!(env.expand("~"), PathBuf::from("/home/alice"));
        assert_eq!(env.expand("~/notes/a.txt"), PathBuf::from("/home/alice/notes/a.txt"));
        // Only a leading marker counts.
        assert_eq!(env.expand("/tmp/~/x"), PathBuf::from("/tmp/~/x"));
    }

    #[test]
    fn test_expand_relative_and_dots() {
        let env = env();
        assert_eq!(env.expand("."), PathBuf::from("/work/project"));
        assert_eq!(env.expand("./src/../Cargo.toml"), PathBuf::from("/work/project/Cargo.toml"));
        assert_eq!(env.expand("../other"), PathBuf::from("/work/other"));
    }

    #[test]
    fn test_normalize_cannot_escape_root() {
        assert_eq!(normalize_lexically(Path::new("/../../etc")), PathBuf::from("/etc"));
        assert_eq!(normalize_lexically(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
    }

    #[test]
    fn test_expand_env_vars() {
        let lookup = |name: &str| match name {
            "USERPROFILE" => Some("C:\\Users\\alice".to_string()),
            _ => None,
        };
        assert_eq!(
            expand_env_vars("%USERPROFILE%\\Documents", lookup),
            "C:\\Users\\alice\\Documents"
        );
        assert_eq!(expand_env_vars("%MISSING%\\x", lookup), "\\x");
        assert_eq!(expand_env_vars("no vars", lookup), "no vars");
    }

    #[test]
    fn test_is_within_uses_whole_components() {
        assert!(is_within(Path::new("/home/alice"), Path::new("/home/alice")));
        assert!(is_within(Path::new("/home/alice/x"), Path::new("/home/alice")));
        assert!(!is_within(Path::new("/home/alicex"), Path::new("/home/alice")));
        assert!(!is_within(Path::new("/home"), Path::new("/home/alice")));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_is_within_case_sensitive_on_linux() {
        assert!(!is_within(Path::new("/Home/Alice/x"), Path::new("/home/alice")));
    }
}
