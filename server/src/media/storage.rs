//! Local Storage
//!
//! Filesystem access below one uploads root. Paths handed to [`LocalStorage`]
//! are relative to that root.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncReadExt;

/// Filesystem errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Relative path tries to leave the root.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Underlying I/O failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// A directory tree of uploaded files.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of `relative`, refusing anything that escapes the root.
    pub fn resolve(&self, relative: &str) -> StorageResult<PathBuf> {
        let rel = Path::new(relative.trim_start_matches('/'));
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(StorageError::InvalidPath(relative.to_string()));
        }
        Ok(self.root.join(rel))
    }

    /// Whether `relative` is an existing regular file.
    pub async fn exists(&self, relative: &str) -> StorageResult<bool> {
        let path = self.resolve(relative)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io(&path, e)),
        }
    }

    /// Whether the root directory exists.
    pub async fn root_exists(&self) -> bool {
        fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the root and any missing parents.
    pub async fn create_root(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::io(&self.root, e))
    }

    pub async fn read(&self, relative: &str) -> StorageResult<Vec<u8>> {
        let path = self.resolve(relative)?;
        fs::read(&path).await.map_err(|e| StorageError::io(&path, e))
    }

    pub async fn write(&self, relative: &str, contents: &[u8]) -> StorageResult<()> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;
        }
        fs::write(&path, contents)
            .await
            .map_err(|e| StorageError::io(&path, e))
    }

    /// Size of `relative` in bytes.
    pub async fn size(&self, relative: &str) -> StorageResult<u64> {
        let path = self.resolve(relative)?;
        let meta = fs::metadata(&path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;
        Ok(meta.len())
    }

    /// Last modification time of `relative`.
    pub async fn mtime(&self, relative: &str) -> StorageResult<DateTime<Utc>> {
        let path = self.resolve(relative)?;
        let modified = fs::metadata(&path)
            .await
            .and_then(|m| m.modified())
            .map_err(|e| StorageError::io(&path, e))?;
        Ok(DateTime::<Utc>::from(modified))
    }

    /// Up to `limit` leading bytes of `relative`, for content sniffing.
    pub async fn read_head(&self, relative: &str, limit: u64) -> StorageResult<Vec<u8>> {
        let path = self.resolve(relative)?;
        let file = fs::File::open(&path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;
        let mut head = Vec::new();
        file.take(limit)
            .read_to_end(&mut head)
            .await
            .map_err(|e| StorageError::io(&path, e))?;
        Ok(head)
    }

    /// Delete `relative`. Returns `false` if there was nothing to delete.
    pub async fn remove(&self, relative: &str) -> StorageResult<bool> {
        let path = self.resolve(relative)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io(&path, e)),
        }
    }

    /// Move `relative` from this tree to the same place in `dest`.
    ///
    /// Missing destination directories are created. A missing source is not an
    /// error: the call returns `false` and leaves both trees untouched.
    /// An existing destination file is overwritten.
    pub async fn move_to(&self, relative: &str, dest: &Self) -> StorageResult<bool> {
        if !self.exists(relative).await? {
            return Ok(false);
        }

        let from = self.resolve(relative)?;
        let to = dest.resolve(relative)?;
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;
        }

        if fs::rename(&from, &to).await.is_err() {
            // Roots on different devices: copy, then drop the source.
            fs::copy(&from, &to)
                .await
                .map_err(|e| StorageError::io(&to, e))?;
            fs::remove_file(&from)
                .await
                .map_err(|e| StorageError::io(&from, e))?;
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_rejects_traversal() {
        let storage = LocalStorage::new("/srv/uploads");
        assert!(storage.resolve("../etc/passwd").is_err());
        assert!(storage.resolve("2024/../../x").is_err());
        assert_eq!(
            storage.resolve("/2024/05/a.jpg").unwrap(),
            PathBuf::from("/srv/uploads/2024/05/a.jpg")
        );
    }

    #[tokio::test]
    async fn test_move_creates_directories() {
        let public = tempfile::tempdir().unwrap();
        let private = tempfile::tempdir().unwrap();
        let public = LocalStorage::new(public.path());
        let private = LocalStorage::new(private.path());

        public.write("2024/05/a.jpg", b"jpeg").await.unwrap();

        assert!(public.move_to("2024/05/a.jpg", &private).await.unwrap());
        assert!(!public.exists("2024/05/a.jpg").await.unwrap());
        assert_eq!(private.read("2024/05/a.jpg").await.unwrap(), b"jpeg");
    }

    #[tokio::test]
    async fn test_move_missing_source_is_noop() {
        let public = tempfile::tempdir().unwrap();
        let private = tempfile::tempdir().unwrap();
        let public = LocalStorage::new(public.path());
        let private = LocalStorage::new(private.path());

        assert!(!public.move_to("2024/05/missing.jpg", &private).await.unwrap());
        assert!(!private.exists("2024/05/missing.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn test_size_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());
        storage.write("f.txt", b"hello").await.unwrap();

        assert_eq!(storage.size("f.txt").await.unwrap(), 5);
        assert!(storage.remove("f.txt").await.unwrap());
        assert!(!storage.remove("f.txt").await.unwrap());
    }
}
