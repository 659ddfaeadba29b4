/*!
Where snapshot bundles come from.

This module defines:
- `SnapshotSource`: an async trait returning a new bundle only when the collector
  published one since the last successful fetch.
- `FileSnapshotSource`: a bundle file on disk, changes detected by modification time.

The collector writes bundles atomically (write-then-rename), so a file source never
observes a partial bundle.
*/

use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

use async_trait::async_trait;

use crate::parsers::bundle::{SnapshotBundle, SnapshotError};

#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// `Ok(None)` when nothing changed since the last bundle returned.
    async fn fetch_if_changed(&mut self) -> Result<Option<SnapshotBundle>, SnapshotError>;

    /// Human-readable origin for logs.
    fn describe(&self) -> String;
}

pub struct FileSnapshotSource {
    path: PathBuf,
    last_modified: Option<SystemTime>,
}

impl FileSnapshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_modified: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> SnapshotError {
        SnapshotError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl SnapshotSource for FileSnapshotSource {
    async fn fetch_if_changed(&mut self) -> Result<Option<SnapshotBundle>, SnapshotError> {
        let metadata = tokio::fs::metadata(&self.path).await.map_err(|e| self.io_error(e))?;
        let modified = metadata.modified().map_err(|e| self.io_error(e))?;
        if self.last_modified == Some(modified) {
            return Ok(None);
        }
        let bundle = SnapshotBundle::load(&self.path).await?;
        // Only remember the timestamp once the bundle parsed, so a bad write is retried.
        self.last_modified = Some(modified);
        Ok(Some(bundle))
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}
