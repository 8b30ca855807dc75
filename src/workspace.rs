//! Per-request scratch directories
//!
//! Every conversion runs inside a [`Workspace`]: a temporary directory with a
//! fixed layout that is removed when the workspace is closed or dropped,
//! whichever comes first.
//!
//! ```text
//! vellum-<uuid>/
//! ├── input/      uploaded file
//! ├── assets/     flattened EPUB assets and the combined HTML document
//! ├── output/     produced PDF
//! └── profile-*/  office converter profiles (one per invocation)
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use thiserror::Error;
use uuid::Uuid;

/// Pause before the second removal attempt in [`Workspace::close`]
const REMOVE_RETRY_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Failed to create workspace: {0}")]
    Create(#[source] std::io::Error),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove workspace {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Ephemeral directory owned by a single conversion request
#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    dir: TempDir,
}

impl Workspace {
    /// Create a workspace under `parent`, or the system temp dir when `None`
    pub fn create(parent: Option<&Path>) -> Result<Self, WorkspaceError> {
        let id = Uuid::new_v4();
        let prefix = format!("vellum-{}-", id.simple());

        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent).map_err(WorkspaceError::Create)?;
                builder.tempdir_in(parent)
            }
            None => builder.tempdir(),
        }
        .map_err(WorkspaceError::Create)?;

        for sub in ["input", "assets", "output"] {
            std::fs::create_dir(dir.path().join(sub)).map_err(WorkspaceError::Create)?;
        }

        tracing::debug!(workspace = %id, path = %dir.path().display(), "Workspace created");

        Ok(Self { id, dir })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn input_dir(&self) -> PathBuf {
        self.root().join("input")
    }

    /// Flat directory the EPUB renderer extracts assets into
    pub fn assets_dir(&self) -> PathBuf {
        self.root().join("assets")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root().join("output")
    }

    /// Allocate a fresh, empty profile directory for one converter invocation
    pub fn profile_dir(&self) -> Result<PathBuf, WorkspaceError> {
        let path = self
            .root()
            .join(format!("profile-{}", Uuid::new_v4().simple()));
        std::fs::create_dir(&path).map_err(WorkspaceError::Create)?;
        Ok(path)
    }

    /// Store the uploaded bytes under `input/<file_name>`
    pub async fn write_input(
        &self,
        file_name: &str,
        data: &[u8],
    ) -> Result<PathBuf, WorkspaceError> {
        let path = self.input_dir().join(file_name);
        tokio::fs::write(&path, data)
            .await
            .map_err(|source| WorkspaceError::Write {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(
            workspace = %self.id,
            path = %path.display(),
            size = data.len(),
            "Upload stored"
        );

        Ok(path)
    }

    /// Remove the directory tree now, reporting failures.
    ///
    /// A writer still running inside the tree can make the first pass fail,
    /// so removal is attempted twice. Dropping a workspace also removes it,
    /// silently.
    pub async fn close(self) -> Result<(), WorkspaceError> {
        let id = self.id;
        let path = self.dir.path().to_path_buf();

        let mut result = remove_tree(&path).await;
        if let Err(e) = &result {
            tracing::debug!(workspace = %id, "Workspace removal failed, retrying: {}", e);
            tokio::time::sleep(REMOVE_RETRY_DELAY).await;
            result = remove_tree(&path).await;
        }
        drop(self.dir);

        result.map_err(|source| WorkspaceError::Remove { path, source })?;
        tracing::debug!(workspace = %id, "Workspace removed");
        Ok(())
    }
}

async fn remove_tree(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_is_created() {
        let parent = tempfile::tempdir().unwrap();
        let ws = Workspace::create(Some(parent.path())).unwrap();

        assert!(ws.root().starts_with(parent.path()));
        assert!(ws.input_dir().is_dir());
        assert!(ws.assets_dir().is_dir());
        assert!(ws.output_dir().is_dir());
    }

    #[test]
    fn test_profile_dirs_are_unique() {
        let ws = Workspace::create(None).unwrap();
        let a = ws.profile_dir().unwrap();
        let b = ws.profile_dir().unwrap();

        assert_ne!(a, b);
        assert!(a.is_dir());
        assert!(b.is_dir());
    }

    #[tokio::test]
    async fn test_close_removes_everything() {
        let parent = tempfile::tempdir().unwrap();
        let ws = Workspace::create(Some(parent.path())).unwrap();
        let input = ws.write_input("deck.pptx", b"data").await.unwrap();
        let root = ws.root().to_path_buf();
        assert!(input.exists());

        ws.close().await.unwrap();

        assert!(!root.exists());
        assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_close_while_writer_is_still_running() {
        let parent = tempfile::tempdir().unwrap();
        let ws = Workspace::create(Some(parent.path())).unwrap();
        let root = ws.root().to_path_buf();
        let output = ws.output_dir();

        // Keeps adding files until its directory disappears or time runs out
        let writer = std::thread::spawn(move || {
            let deadline = std::time::Instant::now() + Duration::from_millis(100);
            let mut written = 0usize;
            while std::time::Instant::now() < deadline {
                let page = output.join(format!("page-{}.tmp", written));
                if std::fs::write(page, b"partial").is_err() {
                    break;
                }
                written += 1;
            }
        });
        std::thread::sleep(Duration::from_millis(10));

        ws.close().await.unwrap();
        writer.join().unwrap();

        assert!(!root.exists());
        assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_close_after_external_removal() {
        let ws = Workspace::create(None).unwrap();
        std::fs::remove_dir_all(ws.root()).unwrap();

        ws.close().await.unwrap();
    }

    #[test]
    fn test_drop_removes_directory() {
        let root = {
            let ws = Workspace::create(None).unwrap();
            ws.root().to_path_buf()
        };
        assert!(!root.exists());
    }
}
