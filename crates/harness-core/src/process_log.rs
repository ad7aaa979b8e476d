//! Append-only process log and the informational PID file.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::error::{HarnessError, Result};

/// Plain-text log of accepted events, appended to once per event.
#[derive(Debug, Clone)]
pub struct ProcessLog {
    path: PathBuf,
}

impl ProcessLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append the rendered event line and a `Testing <nvr>` line.
    pub async fn record_accepted(&self, rendered_text: &str, nvr: &str) -> Result<()> {
        let entry = format!("{rendered_text}\nTesting {nvr}\n");
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .await
            .map_err(|e| HarnessError::filesystem(&self.path, e))?;
        file.write_all(entry.as_bytes())
            .await
            .map_err(|e| HarnessError::filesystem(&self.path, e))?;
        file.flush()
            .await
            .map_err(|e| HarnessError::filesystem(&self.path, e))
    }
}

/// Write the current process id to `path`. Informational only; no locking.
pub fn write_pid_file(path: &Path) -> Result<u32> {
    let pid = std::process::id();
    std::fs::write(path, pid.to_string()).map_err(|e| HarnessError::filesystem(path, e))?;
    Ok(pid)
}
