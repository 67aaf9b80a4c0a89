//! Filesystem blob store.
//!
//! Paths handed to the store are relative to its base directory. Any path
//! that would escape the base directory is rejected.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::traits::BlobStore;

/// A fresh random file name for a blob.
pub fn blob_name() -> String {
    Uuid::new_v4().to_string()
}

/// Resolve `relative` under `base`, refusing parent-directory components.
fn ensure_within(base: &Path, relative: &str) -> Result<PathBuf> {
    let mut resolved = base.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(c) => resolved.push(c),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(StoreError::InvalidData(format!(
                    "path escapes blob root: {}",
                    relative
                )));
            }
        }
    }

    if resolved == base {
        return Err(StoreError::InvalidData(format!("empty blob path: {:?}", relative)));
    }
    Ok(resolved)
}

/// Blob store rooted at a directory on disk.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    base_path: PathBuf,
}

impl FsBlobStore {
    /// Open a blob store, creating the base directory if needed.
    pub async fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await?;
        info!(path = %base_path.display(), "blob store initialized");
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = ensure_within(&self.base_path, path)?;
        match fs::read(&full).await {
            Ok(data) => {
                debug!(path, size = data.len(), "read blob");
                Ok(data)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(format!("blob {}", path)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full = ensure_within(&self.base_path, path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&full, bytes).await?;
        debug!(path, size = bytes.len(), "wrote blob");
        Ok(())
    }

    async fn make_dir(&self, path: &str) -> Result<()> {
        let full = ensure_within(&self.base_path, path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        match fs::create_dir(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StoreError::AlreadyExists(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let full = ensure_within(&self.base_path, path)?;
        match fs::remove_file(&full).await {
            Ok(()) => {
                debug!(path, "removed blob");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(format!("blob {}", path)))
            }
            Err(e) => Err(e.into()),
        }
    }
}
