//! Latest-kernel marker files, one per domain family.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::domain::DomainFamily;
use crate::error::{HarnessError, Result};

/// Writes `<marker_dir>/<family without underscores>` containing the NVR.
///
/// Files are opened, truncated, written and closed on every call; no handle
/// outlives a write.
#[derive(Debug, Clone)]
pub struct MarkerWriter {
    dir: PathBuf,
}

impl MarkerWriter {
    /// Bind to an existing marker directory.
    ///
    /// A missing directory is a deployment error and is reported as
    /// [`HarnessError::MarkerDirMissing`].
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(HarnessError::MarkerDirMissing(dir));
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, family: &DomainFamily) -> PathBuf {
        self.dir.join(family.marker_file_name())
    }

    /// Overwrite the family's marker with `nvr`, byte for byte.
    pub async fn write(&self, family: &DomainFamily, nvr: &str) -> Result<PathBuf> {
        let path = self.path_for(family);
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .await
            .map_err(|e| HarnessError::filesystem(&path, e))?;
        file.write_all(nvr.as_bytes())
            .await
            .map_err(|e| HarnessError::filesystem(&path, e))?;
        file.flush()
            .await
            .map_err(|e| HarnessError::filesystem(&path, e))?;

        debug!(path = %path.display(), nvr = %nvr, "marker written");
        Ok(path)
    }
}
