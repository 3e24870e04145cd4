// Content Store - page bodies persisted as flat files keyed by (locale, permalink)
//
// Address: {root}/{locale}/{basename}.{ext}, basename = permalink with '/' -> '_'.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use crate::error::{AppError, AppResult};

/// Flat file basename for a permalink.
pub fn content_basename(permalink: &str) -> String {
    permalink.replace('/', "_")
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Deterministic location of the blob for `(locale, permalink)`.
    fn address(&self, locale: &str, permalink: &str) -> PathBuf;

    /// Write `body`, creating directories as needed and overwriting any
    /// existing blob.
    async fn write(&self, locale: &str, permalink: &str, body: &str) -> AppResult<()>;

    /// The stored body, or `None` when nothing has been authored yet.
    async fn read(&self, locale: &str, permalink: &str) -> AppResult<Option<String>>;

    /// Remove the blob. Absent blobs are not an error.
    async fn delete(&self, locale: &str, permalink: &str) -> AppResult<()>;

    /// Relocate content to a new permalink. The new blob is written before
    /// the old one is removed, so a crash in between leaves two copies
    /// rather than none.
    async fn rename(
        &self,
        locale: &str,
        old_permalink: &str,
        new_permalink: &str,
        body: &str,
    ) -> AppResult<()> {
        self.write(locale, new_permalink, body).await?;
        if self.address(locale, old_permalink) != self.address(locale, new_permalink) {
            self.delete(locale, old_permalink).await?;
        }
        Ok(())
    }
}

/// [`ContentStore`] on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
    extension: String,
}

impl FsContentStore {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    fn address(&self, locale: &str, permalink: &str) -> PathBuf {
        self.root
            .join(locale)
            .join(format!("{}.{}", content_basename(permalink), self.extension))
    }

    #[instrument(skip(self, body))]
    async fn write(&self, locale: &str, permalink: &str, body: &str) -> AppResult<()> {
        let path = self.address(locale, permalink);
        if let Some(directory) = path.parent() {
            tokio::fs::create_dir_all(directory).await.map_err(|e| {
                AppError::StorageError(format!(
                    "Failed to create content directory {}: {}",
                    directory.display(),
                    e
                ))
            })?;
        }

        tokio::fs::write(&path, body).await.map_err(|e| {
            AppError::StorageError(format!("Failed to write content {}: {}", path.display(), e))
        })?;
        debug!("Wrote {} bytes to {}", body.len(), path.display());
        Ok(())
    }

    async fn read(&self, locale: &str, permalink: &str) -> AppResult<Option<String>> {
        let path = self.address(locale, permalink);
        match tokio::fs::read_to_string(&path).await {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::StorageError(format!(
                "Failed to read content {}: {}",
                path.display(),
                e
            ))),
        }
    }

    #[instrument(skip(self))]
    async fn delete(&self, locale: &str, permalink: &str) -> AppResult<()> {
        let path = self.address(locale, permalink);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed content {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::StorageError(format!(
                "Failed to delete content {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_address_flattens_permalink() {
        let store = FsContentStore::new("/srv/pages", "html");
        assert_eq!(
            store.address("en", "services/web-design"),
            PathBuf::from("/srv/pages/en/services_web-design.html")
        );
    }

    #[tokio::test]
    async fn test_write_read_overwrite() {
        let dir = tempdir().unwrap();
        let store = FsContentStore::new(dir.path(), "html");

        assert_eq!(store.read("en", "about").await.unwrap(), None);

        store.write("en", "about", "<p>first</p>").await.unwrap();
        store.write("en", "about", "<p>second</p>").await.unwrap();

        assert_eq!(
            store.read("en", "about").await.unwrap().as_deref(),
            Some("<p>second</p>")
        );
        assert!(dir.path().join("en").join("about.html").exists());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = FsContentStore::new(dir.path(), "html");

        store.delete("en", "missing").await.unwrap();
        store.write("en", "about", "body").await.unwrap();
        store.delete("en", "about").await.unwrap();
        store.delete("en", "about").await.unwrap();

        assert_eq!(store.read("en", "about").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rename_moves_content() {
        let dir = tempdir().unwrap();
        let store = FsContentStore::new(dir.path(), "html");
        store.write("en", "about", "old body").await.unwrap();

        store.rename("en", "about", "about-us", "new body").await.unwrap();

        assert_eq!(store.read("en", "about").await.unwrap(), None);
        assert_eq!(
            store.read("en", "about-us").await.unwrap().as_deref(),
            Some("new body")
        );

        // Renaming onto the same address must not delete the only copy.
        store.rename("en", "about-us", "about-us", "same").await.unwrap();
        assert_eq!(store.read("en", "about-us").await.unwrap().as_deref(), Some("same"));
    }
}
