//! Directory-backed file store
//!
//! Holds files uploaded through the chat (`FILE|name|size`). Names are
//! reduced to their final path component so uploads can never escape the
//! store directory.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::error::StoreError;

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// The directory is created lazily on the first [`store`](Self::store).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sorted names of the regular files in the store
    pub async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Write `bytes` under `name`, replacing any existing file
    ///
    /// Returns the sanitized name the file was stored as.
    pub async fn store(&self, name: &str, bytes: &[u8]) -> Result<String, StoreError> {
        let safe_name = sanitize(name)?;
        fs::create_dir_all(&self.root).await?;
        fs::write(self.root.join(&safe_name), bytes).await?;
        debug!(
            "Stored {} ({} bytes) in {}",
            safe_name,
            bytes.len(),
            self.root.display()
        );
        Ok(safe_name)
    }

    pub async fn retrieve(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let safe_name = sanitize(name)?;
        match fs::read(self.root.join(&safe_name)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound(safe_name)),
            Err(e) => Err(e.into()),
        }
    }
}

/// Keep only the last path component of `name`
fn sanitize(name: &str) -> Result<String, StoreError> {
    let base = name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() || base == "." || base == ".." {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_store() -> FileStore {
        FileStore::new(std::env::temp_dir().join(format!("chat-store-{}", Uuid::new_v4())))
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("notes.txt").unwrap(), "notes.txt");
        assert_eq!(sanitize("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize("C:\\tmp\\a.bin").unwrap(), "a.bin");
        assert!(sanitize("dir/").is_err());
        assert!(sanitize("..").is_err());
        assert!(sanitize("").is_err());
    }

    #[tokio::test]
    async fn test_store_list_retrieve() {
        let store = temp_store();
        assert!(store.list().await.unwrap().is_empty());

        store.store("b.txt", b"bee").await.unwrap();
        store.store("nested/a.txt", b"ay").await.unwrap();

        assert_eq!(store.list().await.unwrap(), vec!["a.txt", "b.txt"]);
        assert_eq!(store.retrieve("a.txt").await.unwrap(), b"ay");

        fs::remove_dir_all(store.root()).await.unwrap();
    }

    #[tokio::test]
    async fn test_retrieve_missing() {
        let store = temp_store();
        assert!(matches!(
            store.retrieve("ghost.txt").await,
            Err(StoreError::NotFound(ref n)) if n == "ghost.txt"
        ));
    }
}
