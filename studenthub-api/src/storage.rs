use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage path {0:?} is not a plain relative path")]
    InvalidPath(String),
    #[error("Could not access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Uploaded files under the media root, addressed by their relative url.
#[derive(Clone, Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub async fn new(root: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&root)
            .await
            .map_err(|source| StorageError::Io {
                path: root.clone(),
                source,
            })?;

        info!(root = %root.display(), "File store initialized");
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Joins `relative` onto the root, rejecting anything but normal components.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, StorageError> {
        let path = Path::new(relative);
        let plain = !relative.is_empty()
            && path
                .components()
                .all(|component| matches!(component, Component::Normal(_)));

        if plain {
            Ok(self.root.join(path))
        } else {
            Err(StorageError::InvalidPath(relative.to_owned()))
        }
    }

    pub async fn save_file(&self, bytes: &[u8], relative: &str) -> Result<(), StorageError> {
        let path = self.resolve(relative)?;
        let io_error = |source| StorageError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        fs::write(&path, bytes).await.map_err(io_error)?;

        debug!(url = relative, size = bytes.len(), "Saved file");
        Ok(())
    }

    /// Removes a stored file. A file that is already gone is not an error.
    pub async fn delete_file(&self, relative: &str) -> Result<(), StorageError> {
        let path = self.resolve(relative)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(url = relative, "Deleted file");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    /// Removes files whose rows are already gone. Failures are only logged.
    pub async fn delete_files<I>(&self, urls: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        for url in urls {
            let url = url.as_ref();
            if let Err(err) = self.delete_file(url).await {
                warn!(url, error = %err, "Could not delete stored file");
            }
        }
    }
}
