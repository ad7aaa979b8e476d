//! Harness configuration.
//!
//! Loaded from an optional TOML file; every field defaults to the deployed
//! value, so an empty file (or none at all) yields a working configuration.
//!
//! ```toml
//! rawhide_tag = "fc41"
//! poll_interval_secs = 30
//! marker_dir = "/data/latest"
//!
//! [bus]
//! endpoint = "127.0.0.1:9940"
//!
//! [hypervisor]
//! uri = "qemu:///system"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::controller::WaitPolicy;
use crate::error::{HarnessError, Result};
use crate::filter::DEFAULT_PACKAGE_PREFIX;
use crate::release::fedora_release_number;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// The `fcNN` tag treated as the rolling release.
    pub rawhide_tag: String,
    /// Seconds between shutoff polls.
    pub poll_interval_secs: u64,
    /// Give up on a domain after this many polls; unset waits forever.
    pub max_poll_attempts: Option<u32>,
    /// Package prefix the filter looks for in rendered text.
    pub package_prefix: String,
    pub marker_dir: PathBuf,
    pub log_path: PathBuf,
    pub pid_path: PathBuf,
    pub bus: BusConfig,
    pub hypervisor: HypervisorConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            rawhide_tag: "fc41".to_string(),
            poll_interval_secs: 30,
            max_poll_attempts: None,
            package_prefix: DEFAULT_PACKAGE_PREFIX.to_string(),
            marker_dir: PathBuf::from("/data/latest"),
            log_path: PathBuf::from("/var/log/harness.log"),
            pid_path: PathBuf::from("/var/run/harness.pid"),
            bus: BusConfig::default(),
            hypervisor: HypervisorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// `host:port` of the bus relay; stdin when unset.
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HypervisorConfig {
    /// Path or name of the `virsh` binary.
    pub virsh_binary: PathBuf,
    /// libvirt connection URI; libvirt's default when unset.
    pub uri: Option<String>,
    /// Kill a `virsh` call that runs longer than this.
    pub command_timeout_secs: u64,
}

impl Default for HypervisorConfig {
    fn default() -> Self {
        Self {
            virsh_binary: PathBuf::from("virsh"),
            uri: None,
            command_timeout_secs: 60,
        }
    }
}

impl HarnessConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read `path`, or fall back to defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    HarnessError::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                Self::from_toml_str(&raw)
            }
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if fedora_release_number(&self.rawhide_tag).is_none() {
            return Err(HarnessError::Config(format!(
                "rawhide_tag must look like fc<number>, got {:?}",
                self.rawhide_tag
            )));
        }
        if self.poll_interval_secs == 0 {
            return Err(HarnessError::Config(
                "poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.max_poll_attempts == Some(0) {
            return Err(HarnessError::Config(
                "max_poll_attempts must be greater than zero when set".to_string(),
            ));
        }
        if self.hypervisor.command_timeout_secs == 0 {
            return Err(HarnessError::Config(
                "hypervisor.command_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.package_prefix.is_empty() {
            return Err(HarnessError::Config(
                "package_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            interval: Duration::from_secs(self.poll_interval_secs),
            max_attempts: self.max_poll_attempts,
        }
    }
}
