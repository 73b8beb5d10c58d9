//! Tier three: relay strategies for writes and moves.

use std::path::{Path, PathBuf};
use tracing::warn;

use super::shell::{Invocation, discard, run_utility, stage};
use super::{Attempt, FileOp, FileOutput, FileStrategy};

/// Writes by staging the content in a temporary file with the filesystem
/// API and copying it into place with the platform copy command.
///
/// The temporary file is removed whether or not the copy succeeds.
#[derive(Debug, Clone)]
pub struct TempRelay {
    temp_dir: PathBuf,
}

impl TempRelay {
    /// Relay strategy staging content in `temp_dir`.
    #[must_use]
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
        }
    }
}

#[async_trait::async_trait]
impl FileStrategy for TempRelay {
    fn name(&self) -> &'static str {
        "temp_relay"
    }

    async fn attempt(&self, op: &FileOp) -> Attempt {
        let FileOp::Write { path, content } = op else {
            return Attempt::Unsupported;
        };

        let staged = match stage(&self.temp_dir, content) {
            Ok(file) => file,
            Err(e) => return Attempt::Retryable(format!("cannot stage content: {e}")),
        };
        let result = run_utility(&copy(staged.path(), path)).await;
        discard(staged);

        match result {
            Ok(_) => Attempt::Done(FileOutput::Done),
            Err(reason) => Attempt::Retryable(reason),
        }
    }
}

#[cfg(not(windows))]
fn copy(from: &Path, to: &Path) -> Invocation {
    Invocation::direct(
        "cp",
        vec!["--".into(), from.as_os_str().to_os_string(), to.as_os_str().to_os_string()],
    )
}

#[cfg(windows)]
fn copy(from: &Path, to: &Path) -> Invocation {
    let args: Vec<std::ffi::OsString> = vec![
        "/C".into(),
        "copy".into(),
        "/Y".into(),
        from.as_os_str().to_os_string(),
        to.as_os_str().to_os_string(),
    ];
    Invocation::direct("cmd", args)
}

/// Moves by copying the source to the destination, then deleting the
/// source.
///
/// A source that cannot be deleted after a successful copy is logged and
/// the move still counts as done.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyRelay;

#[async_trait::async_trait]
impl FileStrategy for CopyRelay {
    fn name(&self) -> &'static str {
        "copy_relay"
    }

    async fn attempt(&self, op: &FileOp) -> Attempt {
        let FileOp::Move { from, to } = op else {
            return Attempt::Unsupported;
        };

        let bytes = match tokio::fs::read(from).await {
            Ok(bytes) => bytes,
            Err(e) => return Attempt::Retryable(format!("cannot read source: {e}")),
        };
        if let Some(parent) = to.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Attempt::Retryable(format!("cannot create destination directory: {e}"));
        }
        if let Err(e) = tokio::fs::write(to, &bytes).await {
            return Attempt::Retryable(format!("cannot write destination: {e}"));
        }

        if let Err(e) = tokio::fs::remove_file(from).await {
            warn!(
                source = %from.display(),
                error = %e,
                "copied but could not remove source"
            );
        }
        Attempt::Done(FileOutput::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leftovers(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("shellgate-"))
            .collect()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_temp_relay_cleans_up_on_success() {
        let staging = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let dest = out.path().join("dest.txt");

        let attempt = TempRelay::new(staging.path())
            .attempt(&FileOp::Write {
                path: dest.clone(),
                content: "relayed".into(),
            })
            .await;
        assert!(matches!(attempt, Attempt::Done(_)));
        assert_eq!(std::fs::read_to_string(dest).unwrap(), "relayed");
        assert!(leftovers(staging.path()).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_temp_relay_cleans_up_on_failure() {
        let staging = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        // The copy fails: the destination's directory does not exist.
        let dest = out.path().join("missing/dest.txt");

        let attempt = TempRelay::new(staging.path())
            .attempt(&FileOp::Write {
                path: dest.clone(),
                content: "relayed".into(),
            })
            .await;
        assert!(matches!(attempt, Attempt::Retryable(_)));
        assert!(!dest.exists());
        assert!(leftovers(staging.path()).is_empty());
    }

    #[tokio::test]
    async fn test_temp_relay_ignores_other_operations() {
        let staging = tempfile::tempdir().unwrap();
        let attempt = TempRelay::new(staging.path())
            .attempt(&FileOp::Read {
                path: staging.path().join("x"),
            })
            .await;
        assert!(matches!(attempt, Attempt::Unsupported));
    }

    #[tokio::test]
    async fn test_copy_relay_moves_file() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.txt");
        let to = dir.path().join("sub/b.txt");
        std::fs::write(&from, "payload").unwrap();

        let attempt = CopyRelay
            .attempt(&FileOp::Move {
                from: from.clone(),
                to: to.clone(),
            })
            .await;
        assert!(matches!(attempt, Attempt::Done(_)));
        assert!(!from.exists());
        assert_eq!(std::fs::read_to_string(to).unwrap(), "payload");
    }
}
