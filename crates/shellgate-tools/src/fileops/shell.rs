//! Tier two: the platform's file utilities.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::warn;

use super::{Attempt, FileOp, FileOutput, FileStrategy};
#[cfg(not(windows))]
use super::{DirEntry, FileInfo};

/// Upper bound on one utility invocation.
const UTILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Performs operations by invoking `sh` utilities (`PowerShell` on Windows).
///
/// Paths are passed as positional arguments, never spliced into the script,
/// except on Windows where they are single-quote escaped.
#[derive(Debug, Clone)]
pub struct ShellUtility {
    temp_dir: PathBuf,
}

impl ShellUtility {
    /// Utility strategy staging write content in `temp_dir`.
    #[must_use]
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
        }
    }
}

#[async_trait::async_trait]
impl FileStrategy for ShellUtility {
    fn name(&self) -> &'static str {
        "shell"
    }

    async fn attempt(&self, op: &FileOp) -> Attempt {
        match op {
            FileOp::Write { path, content } => self.write(path, content).await,
            other => match script(other) {
                Some(invocation) => match run_utility(&invocation).await {
                    Ok(stdout) => parse(other, &stdout),
                    Err(reason) => Attempt::Retryable(reason),
                },
                None => Attempt::Unsupported,
            },
        }
    }
}

impl ShellUtility {
    /// Stage `content` in a temporary file and concatenate it into `dest`.
    async fn write(&self, dest: &Path, content: &str) -> Attempt {
        let staged = match stage(&self.temp_dir, content) {
            Ok(file) => file,
            Err(e) => return Attempt::Retryable(format!("cannot stage content: {e}")),
        };

        let result = run_utility(&concatenate(staged.path(), dest)).await;
        discard(staged);

        match result {
            Ok(_) => Attempt::Done(FileOutput::Done),
            Err(reason) => Attempt::Retryable(reason),
        }
    }
}

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Invocation {
    program: &'static str,
    args: Vec<OsString>,
}

impl Invocation {
    /// `sh -c <script> sh <args...>`; the script sees the arguments as `$1`, `$2`...
    #[cfg(not(windows))]
    fn sh(script: &str, args: &[&Path]) -> Self {
        let mut all: Vec<OsString> = vec!["-c".into(), script.into(), "sh".into()];
        all.extend(args.iter().map(|p| p.as_os_str().to_os_string()));
        Self {
            program: "sh",
            args: all,
        }
    }

    #[cfg(windows)]
    fn powershell(script: String) -> Self {
        Self {
            program: "powershell",
            args: vec![
                "-NoProfile".into(),
                "-NonInteractive".into(),
                "-Command".into(),
                script.into(),
            ],
        }
    }

    /// A program run directly with the given arguments.
    pub(super) fn direct(program: &'static str, args: Vec<OsString>) -> Self {
        Self { program, args }
    }
}

/// Write `content` to a fresh temporary file in `dir`.
pub(super) fn stage(dir: &Path, content: &str) -> std::io::Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("shellgate-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    file.write_all(content.as_bytes())?;
    file.flush()?;
    Ok(file)
}

/// Delete a staged temporary file, logging rather than failing.
pub(super) fn discard(staged: tempfile::NamedTempFile) {
    let path = staged.path().to_path_buf();
    if let Err(e) = staged.close() {
        warn!(path = %path.display(), error = %e, "failed to clean up temporary file");
    }
}

/// Run a utility to completion; stdout on success, a reason on failure.
pub(super) async fn run_utility(invocation: &Invocation) -> Result<Vec<u8>, String> {
    let mut cmd = Command::new(invocation.program);
    cmd.args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(UTILITY_TIMEOUT, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(format!("cannot run {}: {e}", invocation.program)),
        Err(_) => {
            return Err(format!(
                "{} timed out after {}s",
                invocation.program,
                UTILITY_TIMEOUT.as_secs()
            ));
        },
    };

    if output.status.success() {
        Ok(output.stdout)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(format!(
            "{} exited with {}: {}",
            invocation.program,
            output.status,
            stderr.trim()
        ))
    }
}

#[cfg(not(windows))]
fn concatenate(staged: &Path, dest: &Path) -> Invocation {
    Invocation::sh(
        r#"mkdir -p -- "$(dirname -- "$2")" && cat -- "$1" > "$2""#,
        &[staged, dest],
    )
}

#[cfg(windows)]
fn concatenate(staged: &Path, dest: &Path) -> Invocation {
    Invocation::powershell(format!(
        "Set-Content -LiteralPath {} -Value (Get-Content -LiteralPath {} -Raw) -NoNewline -Force",
        quote(dest),
        quote(staged)
    ))
}

#[cfg(not(windows))]
fn script(op: &FileOp) -> Option<Invocation> {
    let invocation = match op {
        FileOp::Read { path } => Invocation::sh(r#"cat -- "$1""#, &[path.as_path()]),
        FileOp::CreateDir { path } => Invocation::sh(r#"mkdir -p -- "$1""#, &[path.as_path()]),
        FileOp::List { path } => Invocation::sh(r#"ls -1Ap -- "$1""#, &[path.as_path()]),
        FileOp::Move { from, to } => Invocation::sh(
            r#"mkdir -p -- "$(dirname -- "$2")" && mv -- "$1" "$2""#,
            &[from.as_path(), to.as_path()],
        ),
        FileOp::Stat { path } => Invocation::sh(STAT_SCRIPT?, &[path.as_path()]),
        FileOp::Write { .. } => return None,
    };
    Some(invocation)
}

/// `size|created|modified|accessed|type|mode`, epoch seconds.
#[cfg(target_os = "linux")]
const STAT_SCRIPT: Option<&str> = Some(r#"stat -L -c '%s|%W|%Y|%X|%F|%a' -- "$1""#);
#[cfg(target_os = "macos")]
const STAT_SCRIPT: Option<&str> = Some(r#"stat -L -f '%z|%B|%m|%a|%HT|%Lp' -- "$1""#);
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
const STAT_SCRIPT: Option<&str> = None;

#[cfg(windows)]
fn script(op: &FileOp) -> Option<Invocation> {
    let script = match op {
        FileOp::Read { path } => format!("Get-Content -LiteralPath {} -Raw -ErrorAction Stop", quote(path)),
        FileOp::CreateDir { path } => format!(
            "New-Item -Path {} -ItemType Directory -Force -ErrorAction Stop | Out-Null",
            quote(path)
        ),
        FileOp::List { path } => format!(
            "Get-ChildItem -LiteralPath {} -Force -ErrorAction Stop | ForEach-Object {{ if ($_.PSIsContainer) {{ '[DIR] ' + $_.Name }} else {{ '[FILE] ' + $_.Name }} }}",
            quote(path)
        ),
        FileOp::Move { from, to } => format!(
            "Move-Item -LiteralPath {} -Destination {} -Force -ErrorAction Stop",
            quote(from),
            quote(to)
        ),
        FileOp::Stat { .. } | FileOp::Write { .. } => return None,
    };
    Some(Invocation::powershell(script))
}

/// Single-quote a path for `PowerShell`.
#[cfg(windows)]
fn quote(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', "''"))
}

fn parse(op: &FileOp, stdout: &[u8]) -> Attempt {
    let text = String::from_utf8_lossy(stdout);
    match op {
        FileOp::Read { .. } => Attempt::Done(FileOutput::Text(text.into_owned())),
        FileOp::List { .. } => Attempt::Done(FileOutput::Entries(parse_listing(&text))),
        #[cfg(not(windows))]
        FileOp::Stat { .. } => match parse_stat(&text) {
            Some(info) => Attempt::Done(FileOutput::Info(info)),
            None => Attempt::Retryable(format!("unrecognised stat output: {}", text.trim())),
        },
        _ => Attempt::Done(FileOutput::Done),
    }
}

/// Parse `ls -1Ap` output, where directories carry a trailing `/`.
#[cfg(not(windows))]
fn parse_listing(text: &str) -> Vec<DirEntry> {
    text.lines()
        .filter(|line| !line.is_empty())
        .map(|line| match line.strip_suffix('/') {
            Some(name) => DirEntry {
                name: name.to_string(),
                is_dir: true,
            },
            None => DirEntry {
                name: line.to_string(),
                is_dir: false,
            },
        })
        .collect()
}

/// Parse `[DIR] name` / `[FILE] name` lines.
#[cfg(windows)]
fn parse_listing(text: &str) -> Vec<super::DirEntry> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim_end_matches('\r');
            if let Some(name) = line.strip_prefix("[DIR] ") {
                Some(super::DirEntry {
                    name: name.to_string(),
                    is_dir: true,
                })
            } else {
                line.strip_prefix("[FILE] ").map(|name| super::DirEntry {
                    name: name.to_string(),
                    is_dir: false,
                })
            }
        })
        .collect()
}

#[cfg(not(windows))]
fn parse_stat(text: &str) -> Option<FileInfo> {
    let mut fields = text.trim().split('|');
    let size = fields.next()?.parse().ok()?;
    let created = epoch(fields.next()?);
    let modified = epoch(fields.next()?);
    let accessed = epoch(fields.next()?);
    let kind = fields.next()?.to_lowercase();
    let mode = u32::from_str_radix(fields.next()?, 8).ok()?;

    Some(FileInfo {
        size,
        created,
        modified,
        accessed,
        is_directory: kind.contains("directory"),
        is_file: kind.contains("regular"),
        permissions: super::octal_permissions(mode),
    })
}

/// Epoch seconds; `0` and `-` mean the field is not recorded.
#[cfg(not(windows))]
fn epoch(field: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    match field.parse::<i64>() {
        Ok(secs) if secs > 0 => chrono::DateTime::from_timestamp(secs, 0),
        _ => None,
    }
}
