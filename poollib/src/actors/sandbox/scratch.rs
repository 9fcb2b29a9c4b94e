use crate::types::ExecutionId;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

/// A per-execution working directory, removed when dropped.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    removed: bool,
}

impl ScratchDir {
    /// Create `<root>/<execution_id>`. Fails rather than reuse an existing directory.
    pub async fn create(root: &Path, execution_id: ExecutionId) -> io::Result<Self> {
        fs::create_dir_all(root).await?;
        let path = root.join(execution_id.to_string());
        fs::create_dir(&path).await?;
        Ok(Self {
            path,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory without blocking the runtime.
    pub async fn remove(mut self) -> io::Result<()> {
        self.removed = true;
        fs::remove_dir_all(&self.path).await
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(err) = std::fs::remove_dir_all(&self.path) {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = ?self.path, error = %err, "failed to remove scratch directory");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::create(root.path(), Uuid::new_v4()).await.unwrap();
        let path = scratch.path().to_path_buf();
        std::fs::write(path.join("artifact.txt"), b"data").unwrap();
        assert!(path.is_dir());
        drop(scratch);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn removed_explicitly() {
        let root = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::create(root.path(), Uuid::new_v4()).await.unwrap();
        let path = scratch.path().to_path_buf();
        scratch.remove().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn never_reuses_an_existing_directory() {
        let root = tempfile::tempdir().unwrap();
        let execution_id = Uuid::new_v4();
        std::fs::create_dir(root.path().join(execution_id.to_string())).unwrap();
        let err = ScratchDir::create(root.path(), execution_id).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }
}
