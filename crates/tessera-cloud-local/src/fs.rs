//! Filesystem operations behind the local provider
//!
//! Every path is resolved against the base directory before use.

use crate::error::{LocalError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Observed state of a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub content: String,
    pub size: u64,
    /// Permission bits, when the platform has them
    pub mode: Option<u32>,
}

/// Filesystem rooted at a base directory
#[derive(Debug, Clone)]
pub struct LocalFs {
    base: PathBuf,
}

impl LocalFs {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Absolute paths are kept, relative ones join the base
    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base.join(path)
        }
    }

    pub async fn create_dir(&self, path: &str) -> Result<()> {
        let full = self.resolve(path);
        tracing::debug!("Creating directory: {}", full.display());
        fs::create_dir_all(&full)
            .await
            .map_err(|e| LocalError::io(&full, e))
    }

    pub async fn dir_exists(&self, path: &str) -> Result<()> {
        let full = self.resolve(path);
        let meta = fs::metadata(&full)
            .await
            .map_err(|e| LocalError::io(&full, e))?;
        if !meta.is_dir() {
            return Err(LocalError::WrongKind {
                path: full,
                expected: "directory",
            });
        }
        Ok(())
    }

    pub async fn remove_dir(&self, path: &str) -> Result<()> {
        let full = self.resolve(path);
        tracing::debug!("Removing directory: {}", full.display());
        fs::remove_dir_all(&full)
            .await
            .map_err(|e| LocalError::io(&full, e))
    }

    /// Write a file, creating missing parent directories
    pub async fn write_file(&self, path: &str, content: &str, mode: Option<u32>) -> Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| LocalError::io(parent, e))?;
        }
        tracing::debug!("Writing file: {}", full.display());
        fs::write(&full, content)
            .await
            .map_err(|e| LocalError::io(&full, e))?;
        if let Some(mode) = mode {
            set_mode(&full, mode).await?;
        }
        Ok(())
    }

    pub async fn read_file(&self, path: &str) -> Result<FileInfo> {
        let full = self.resolve(path);
        let meta = fs::metadata(&full)
            .await
            .map_err(|e| LocalError::io(&full, e))?;
        if !meta.is_file() {
            return Err(LocalError::WrongKind {
                path: full,
                expected: "file",
            });
        }
        let bytes = fs::read(&full)
            .await
            .map_err(|e| LocalError::io(&full, e))?;
        Ok(FileInfo {
            content: String::from_utf8_lossy(&bytes).into_owned(),
            size: meta.len(),
            mode: mode_of(&meta),
        })
    }

    pub async fn remove_file(&self, path: &str) -> Result<()> {
        let full = self.resolve(path);
        tracing::debug!("Removing file: {}", full.display());
        fs::remove_file(&full)
            .await
            .map_err(|e| LocalError::io(&full, e))
    }
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|e| LocalError::io(path, e))
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn mode_of(meta: &std::fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(meta.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn mode_of(_meta: &std::fs::Metadata) -> Option<u32> {
    None
}

/// Parse a four-digit octal mode such as `"0644"`
pub fn parse_mode(value: &str) -> Option<u32> {
    let digits = value.strip_prefix('0')?;
    if digits.len() != 3 || !digits.chars().all(|c| ('0'..='7').contains(&c)) {
        return None;
    }
    u32::from_str_radix(digits, 8).ok()
}

pub fn format_mode(mode: u32) -> String {
    format!("{:04o}", mode & 0o777)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("0644"), Some(0o644));
        assert_eq!(parse_mode("0755"), Some(0o755));
        assert_eq!(parse_mode("644"), None);
        assert_eq!(parse_mode("0648"), None);
        assert_eq!(parse_mode("00644"), None);
        assert_eq!(format_mode(0o100644), "0644");
    }

    #[test]
    fn test_resolve() {
        let fs = LocalFs::new("/srv/project");
        assert_eq!(fs.resolve("out/a.txt"), PathBuf::from("/srv/project/out/a.txt"));
        assert_eq!(fs.resolve("/tmp/a.txt"), PathBuf::from("/tmp/a.txt"));
    }

    #[tokio::test]
    async fn test_write_creates_parents() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFs::new(temp.path());

        fs.write_file("a/b/c.txt", "hello", None).await.unwrap();
        let info = fs.read_file("a/b/c.txt").await.unwrap();
        assert_eq!(info.content, "hello");
        assert_eq!(info.size, 5);
    }

    #[tokio::test]
    async fn test_missing_path_is_not_found() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFs::new(temp.path());

        assert!(matches!(
            fs.read_file("missing.txt").await,
            Err(LocalError::NotFound(_))
        ));
        assert!(matches!(
            fs.dir_exists("missing").await,
            Err(LocalError::NotFound(_))
        ));
        assert!(matches!(
            fs.remove_file("missing.txt").await,
            Err(LocalError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_kind() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFs::new(temp.path());
        fs.create_dir("dir").await.unwrap();

        assert!(matches!(
            fs.read_file("dir").await,
            Err(LocalError::WrongKind { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_mode_is_applied() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFs::new(temp.path());

        fs.write_file("x.sh", "#!/bin/sh", Some(0o755)).await.unwrap();
        assert_eq!(fs.read_file("x.sh").await.unwrap().mode, Some(0o755));
    }
}
