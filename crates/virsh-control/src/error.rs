//! Error types for virsh-control

use harness_core::HarnessError;
use thiserror::Error;

/// Errors that can occur while driving libvirt through `virsh`
#[derive(Error, Debug)]
pub enum VirshError {
    /// The virsh binary could not be started
    #[error("failed to run {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// A virsh call outlived the configured timeout
    #[error("virsh {command} timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    /// libvirt has no domain by this name
    #[error("domain not found: {0}")]
    DomainNotFound(String),

    /// virsh exited non-zero
    #[error("virsh {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
}

impl From<VirshError> for HarnessError {
    fn from(err: VirshError) -> Self {
        match err {
            VirshError::DomainNotFound(name) => HarnessError::DomainNotFound(name),
            other => HarnessError::HypervisorUnavailable(other.to_string()),
        }
    }
}
