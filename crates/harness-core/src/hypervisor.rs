//! Hypervisor control seam.
//!
//! These traits describe the narrow slice of a virtualization control plane
//! the harness needs: open a connection, look a domain up by name, read its
//! power state, and reboot or power it on.
//!
//! Implementations must tolerate concurrent state queries and concurrent
//! mutating calls against *distinct* domains from independent tasks. The
//! controller opens one connection per launch, so a client that cannot share
//! a connection between tasks only needs `connect()` to hand out a fresh one.
//!
//! In-memory fakes live in [`crate::fakes`].

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::DomainName;
use crate::error::Result;

/// Power state of a domain as far as the lifecycle policy cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainState {
    ShutOff,
    Running,
    /// Anything the hypervisor could not report cleanly.
    Unknown,
}

impl fmt::Display for DomainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainState::ShutOff => write!(f, "shut off"),
            DomainState::Running => write!(f, "running"),
            DomainState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Entry point to a virtualization control plane.
#[async_trait]
pub trait Hypervisor: Send + Sync + 'static {
    type Connection: HypervisorConnection;

    /// Open a connection. Fails with `HypervisorUnavailable`.
    async fn connect(&self) -> Result<Self::Connection>;
}

/// An open connection.
#[async_trait]
pub trait HypervisorConnection: Send + Sync {
    type Domain: DomainHandle;

    /// Fails with `DomainNotFound` when no domain has this name.
    async fn lookup_domain(&self, name: &DomainName) -> Result<Self::Domain>;
}

/// Live handle on one domain, valid for the connection it came from.
#[async_trait]
pub trait DomainHandle: Send + Sync {
    fn name(&self) -> &str;

    async fn query_state(&self) -> Result<DomainState>;

    /// Reboot the guest. Safe to issue whatever the current state.
    async fn reboot(&self) -> Result<()>;

    /// Power on a shut-off domain.
    async fn create(&self) -> Result<()>;
}
