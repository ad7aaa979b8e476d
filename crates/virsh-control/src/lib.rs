//! Virsh-Control: libvirt domain control for the kernel test harness
//!
//! Implements the `harness_core` hypervisor traits by running the `virsh`
//! CLI, one process per call:
//!
//! - `connect` → `virsh uri`
//! - `lookup_domain` → `virsh domuuid <name>`
//! - `query_state` → `virsh domstate <name>`
//! - `reboot` → `virsh reboot <name>`
//! - `create` → `virsh start <name>`

mod client;
mod error;

pub use client::{parse_domstate, VirshConfig, VirshConnection, VirshDomain, VirshHypervisor};
pub use error::VirshError;

/// Result type for virsh-control operations
pub type Result<T> = std::result::Result<T, VirshError>;
