//! Fixed "latest" file per media kind under the storage root.
//!
//! Collaborators write into a staging file next to the final one; a
//! successful capture is committed with a rename so readers never see a
//! half-written file and a failed capture leaves the previous one in place.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use kestrel_common::protocol::MediaKind;

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, kind: MediaKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    /// e.g. `<root>/photo/latest.jpg`
    pub fn latest_path(&self, kind: MediaKind) -> PathBuf {
        self.dir(kind).join(format!("latest.{}", kind.extension()))
    }

    /// Keeps the real extension so tools that infer format from it still work.
    pub fn staging_path(&self, kind: MediaKind) -> PathBuf {
        self.dir(kind).join(format!(".latest.part.{}", kind.extension()))
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for kind in MediaKind::ALL {
            let dir = self.dir(kind);
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Cannot create {}", dir.display()))?;
        }
        Ok(())
    }

    /// Move the staging file over the latest file and return its contents.
    pub async fn commit(&self, kind: MediaKind) -> Result<Vec<u8>> {
        let staging = self.staging_path(kind);
        let latest = self.latest_path(kind);
        tokio::fs::rename(&staging, &latest)
            .await
            .with_context(|| format!("Capture produced no file at {}", staging.display()))?;
        tokio::fs::read(&latest)
            .await
            .with_context(|| format!("Cannot read {}", latest.display()))
    }

    /// Remove a leftover staging file after a failed capture.
    pub async fn discard(&self, kind: MediaKind) {
        tokio::fs::remove_file(self.staging_path(kind)).await.ok();
    }
}
