//! Error taxonomy for the harness.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while turning bus events into domain launches.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Rendered text did not have the expected token/segment shape.
    #[error("malformed event ({reason}): {raw}")]
    MalformedEvent { raw: String, reason: String },

    /// The hypervisor has no domain with this name.
    #[error("domain not found: {0}")]
    DomainNotFound(String),

    /// Connection or call failure against the hypervisor.
    #[error("hypervisor unavailable: {0}")]
    HypervisorUnavailable(String),

    /// Marker, process log or PID file could not be written.
    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The marker directory is missing; deployment precondition violated.
    #[error("marker directory does not exist: {}", .0.display())]
    MarkerDirMissing(PathBuf),

    /// Bounded shutoff wait ran out of attempts.
    #[error("domain {domain} did not reach shut off after {attempts} polls")]
    ShutoffWaitExhausted { domain: String, attempts: u32 },

    /// A launch task panicked or was cancelled before finishing.
    #[error("launch of {domain} aborted: {reason}")]
    LaunchAborted { domain: String, reason: String },

    /// Invalid or unreadable configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Event bus transport failure.
    #[error("bus error: {0}")]
    Bus(String),
}

impl HarnessError {
    /// Build a `MalformedEvent` carrying the raw text for diagnosis.
    pub fn malformed(raw: &str, reason: impl Into<String>) -> Self {
        HarnessError::MalformedEvent {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }

    /// Wrap an I/O error with the path it happened on.
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HarnessError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

impl From<toml::de::Error> for HarnessError {
    fn from(err: toml::de::Error) -> Self {
        HarnessError::Config(err.to_string())
    }
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;
