//! Tier one: the filesystem API.

use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::Path;

use super::{Attempt, DirEntry, FileInfo, FileOp, FileOutput, FileStrategy};

/// Performs operations with `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeFs;

#[async_trait::async_trait]
impl FileStrategy for NativeFs {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn attempt(&self, op: &FileOp) -> Attempt {
        let result = match op {
            FileOp::Read { path } => tokio::fs::read_to_string(path).await.map(FileOutput::Text),
            FileOp::Write { path, content } => write(path, content).await,
            FileOp::CreateDir { path } => tokio::fs::create_dir_all(path)
                .await
                .map(|()| FileOutput::Done),
            FileOp::List { path } => list(path).await,
            FileOp::Move { from, to } => rename(from, to).await,
            FileOp::Stat { path } => stat(path).await,
        };

        match result {
            Ok(output) => Attempt::Done(output),
            Err(e) if e.kind() == ErrorKind::NotFound => Attempt::Fatal(e),
            Err(e) => Attempt::Retryable(e.to_string()),
        }
    }
}

async fn write(path: &Path, content: &str) -> std::io::Result<FileOutput> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await?;
    Ok(FileOutput::Done)
}

async fn list(path: &Path) -> std::io::Result<FileOutput> {
    let mut reader = tokio::fs::read_dir(path).await?;
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
        entries.push(DirEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir,
        });
    }
    Ok(FileOutput::Entries(entries))
}

async fn rename(from: &Path, to: &Path) -> std::io::Result<FileOutput> {
    // Check the source first so a missing one is not mistaken for a
    // missing destination directory.
    tokio::fs::symlink_metadata(from).await?;
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::rename(from, to).await?;
    Ok(FileOutput::Done)
}

async fn stat(path: &Path) -> std::io::Result<FileOutput> {
    let meta = tokio::fs::metadata(path).await?;
    Ok(FileOutput::Info(FileInfo {
        size: meta.len(),
        created: meta.created().ok().map(DateTime::<Utc>::from),
        modified: meta.modified().ok().map(DateTime::<Utc>::from),
        accessed: meta.accessed().ok().map(DateTime::<Utc>::from),
        is_directory: meta.is_dir(),
        is_file: meta.is_file(),
        permissions: permissions(&meta),
    }))
}

#[cfg(unix)]
fn permissions(meta: &std::fs::Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;
    super::octal_permissions(meta.permissions().mode())
}

#[cfg(not(unix))]
fn permissions(meta: &std::fs::Metadata) -> String {
    let mode = if meta.permissions().readonly() { 0o444 } else { 0o666 };
    super::octal_permissions(mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/c.txt");
        let op = FileOp::Write {
            path: path.clone(),
            content: "x".into(),
        };
        assert!(matches!(NativeFs.attempt(&op).await, Attempt::Done(FileOutput::Done)));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "x");
    }

    #[tokio::test]
    async fn test_missing_source_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let op = FileOp::Move {
            from: dir.path().join("nope"),
            to: dir.path().join("dest/nope"),
        };
        assert!(matches!(NativeFs.attempt(&op).await, Attempt::Fatal(_)));
        assert!(!dir.path().join("dest").exists());
    }

    #[tokio::test]
    async fn test_list_tags_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("file"), "").unwrap();

        let Attempt::Done(FileOutput::Entries(mut entries)) = NativeFs
            .attempt(&FileOp::List {
                path: dir.path().to_path_buf(),
            })
            .await
        else {
            panic!("listing failed");
        };
        entries.sort();
        assert_eq!(
            entries,
            vec![
                DirEntry {
                    name: "file".into(),
                    is_dir: false
                },
                DirEntry {
                    name: "sub".into(),
                    is_dir: true
                },
            ]
        );
    }
}
