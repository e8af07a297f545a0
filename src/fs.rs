//! Temporary file creation, abstracted for testability.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use tempfile::NamedTempFile;

/// Prefix of every persisted download's file name.
const TEMP_PREFIX: &str = "dl-";

/// Abstraction over where persisted downloads are created.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Creates a new, empty temporary file whose name ends with `suffix`.
    async fn create_temp_file(&self, suffix: &str) -> io::Result<NamedTempFile>;
}

/// Default implementation creating files in a directory on disk.
#[derive(Debug, Clone, Default)]
pub struct TempDirFileSystem {
    dir: Option<PathBuf>,
}

impl TempDirFileSystem {
    /// Creates files in the system temporary directory.
    #[must_use]
    pub const fn new() -> Self {
        Self { dir: None }
    }

    /// Creates files in `dir`, or the system temporary directory when `None`.
    #[must_use]
    pub const fn in_dir(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl FileSystem for TempDirFileSystem {
    async fn create_temp_file(&self, suffix: &str) -> io::Result<NamedTempFile> {
        let dir = self.dir.clone().unwrap_or_else(std::env::temp_dir);
        let suffix = suffix.to_string();
        tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(TEMP_PREFIX)
                .suffix(&suffix)
                .tempfile_in(dir)
        })
        .await
        .map_err(io::Error::other)?
    }
}

/// File name suffix preserving the extension of the URL's last path segment.
///
/// Query and fragment are ignored. Returns an empty string when the segment has
/// no extension.
#[must_use]
pub fn extension_suffix(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let path = path.split_once("://").map_or(path, |(_, rest)| {
        rest.split_once('/').map_or("", |(_, path)| path)
    });
    let segment = path.rsplit('/').next().unwrap_or_default();
    match segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => format!(".{ext}"),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn creates_file_with_suffix_in_dir() {
        let dir = TempDir::new().unwrap();
        let fs = TempDirFileSystem::in_dir(Some(dir.path().to_path_buf()));

        let file = fs.create_temp_file(".tgz").await.unwrap();
        let name = file.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("dl-"), "{name}");
        assert!(name.ends_with(".tgz"), "{name}");
        assert_eq!(file.path().parent().unwrap(), dir.path());
    }

    #[tokio::test]
    async fn name_without_suffix_has_no_dot() {
        let dir = TempDir::new().unwrap();
        let fs = TempDirFileSystem::in_dir(Some(dir.path().to_path_buf()));

        let file = fs.create_temp_file("").await.unwrap();
        let name = file.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(!name.contains('.'), "{name}");
    }

    #[tokio::test]
    async fn missing_dir_is_an_error() {
        let dir = TempDir::new().unwrap();
        let fs = TempDirFileSystem::in_dir(Some(dir.path().join("missing")));
        assert!(fs.create_temp_file("").await.is_err());
    }

    #[test]
    fn extension_is_taken_from_last_segment() {
        assert_eq!(extension_suffix("http://h/android-studio-fake.tgz"), ".tgz");
        assert_eq!(extension_suffix("https://h/a/maven-3.2.3-bin.tar.gz"), ".gz");
        assert_eq!(extension_suffix("http://h/file.zip?token=a.b"), ".zip");
    }

    #[test]
    fn no_extension_gives_empty_suffix() {
        assert_eq!(extension_suffix("http://h/simplefile"), "");
        assert_eq!(extension_suffix("http://example.com"), "");
        assert_eq!(extension_suffix("http://h/dir.d/"), "");
        assert_eq!(extension_suffix("http://h/.hidden"), "");
    }
}
