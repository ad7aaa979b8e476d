//! `virsh`-backed implementation of the harness hypervisor traits.
//!
//! Every operation is a separate `virsh` process, so connections and domain
//! handles are plain values and safe to use from any number of tasks.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use harness_core::{
    DomainHandle, DomainName, DomainState, Hypervisor, HypervisorConfig, HypervisorConnection,
};
use tokio::process::Command;
use tracing::debug;

use crate::error::VirshError;
use crate::Result;

/// How to reach libvirt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirshConfig {
    /// Path or name of the `virsh` binary.
    pub binary: PathBuf,
    /// Connection URI passed as `-c`; libvirt's default when `None`.
    pub uri: Option<String>,
    /// Per-call timeout.
    pub timeout: Duration,
}

impl Default for VirshConfig {
    fn default() -> Self {
        Self::from(&HypervisorConfig::default())
    }
}

impl From<&HypervisorConfig> for VirshConfig {
    fn from(config: &HypervisorConfig) -> Self {
        Self {
            binary: config.virsh_binary.clone(),
            uri: config.uri.clone(),
            timeout: Duration::from_secs(config.command_timeout_secs),
        }
    }
}

impl VirshConfig {
    /// Full argument list for `virsh <command> <args>`.
    fn args(&self, command: &str, args: &[&str]) -> Vec<String> {
        let mut full = Vec::with_capacity(args.len() + 3);
        if let Some(uri) = &self.uri {
            full.push("-c".to_string());
            full.push(uri.clone());
        }
        full.push(command.to_string());
        full.extend(args.iter().map(|a| a.to_string()));
        full
    }

    /// Run one virsh command and return its trimmed stdout.
    async fn run(&self, command: &str, args: &[&str]) -> Result<String> {
        let argv = self.args(command, args);
        debug!(binary = %self.binary.display(), args = ?argv, "running virsh");

        let child = Command::new(&self.binary)
            .args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| VirshError::Spawn {
                binary: self.binary.display().to_string(),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| VirshError::Timeout {
                command: command.to_string(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|source| VirshError::Spawn {
                binary: self.binary.display().to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(classify_failure(command, args.first().copied(), stderr))
    }
}

/// Map a failed virsh call to an error, spotting unknown domains.
fn classify_failure(command: &str, domain: Option<&str>, stderr: String) -> VirshError {
    let lowered = stderr.to_ascii_lowercase();
    if lowered.contains("failed to get domain") || lowered.contains("domain not found") {
        if let Some(domain) = domain {
            return VirshError::DomainNotFound(domain.to_string());
        }
    }
    VirshError::CommandFailed {
        command: command.to_string(),
        stderr,
    }
}

/// Parse `virsh domstate` output.
pub fn parse_domstate(output: &str) -> DomainState {
    match output.trim().to_ascii_lowercase().as_str() {
        "shut off" => DomainState::ShutOff,
        "running" => DomainState::Running,
        _ => DomainState::Unknown,
    }
}

/// libvirt through the `virsh` CLI.
#[derive(Debug, Clone, Default)]
pub struct VirshHypervisor {
    config: VirshConfig,
}

impl VirshHypervisor {
    pub fn new(config: VirshConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VirshConfig {
        &self.config
    }
}

#[async_trait]
impl Hypervisor for VirshHypervisor {
    type Connection = VirshConnection;

    /// Checks libvirt answers by asking it for its canonical URI.
    async fn connect(&self) -> harness_core::Result<VirshConnection> {
        let uri = self.config.run("uri", &[]).await?;
        debug!(uri = %uri, "libvirt connection ok");
        Ok(VirshConnection {
            config: self.config.clone(),
            uri,
        })
    }
}

#[derive(Debug, Clone)]
pub struct VirshConnection {
    config: VirshConfig,
    uri: String,
}

impl VirshConnection {
    /// Canonical URI libvirt reported on connect.
    pub fn uri(&self) -> &str {
        &self.uri
    }
}

#[async_trait]
impl HypervisorConnection for VirshConnection {
    type Domain = VirshDomain;

    async fn lookup_domain(&self, name: &DomainName) -> harness_core::Result<VirshDomain> {
        let uuid = self.config.run("domuuid", &[name.as_str()]).await?;
        Ok(VirshDomain {
            config: self.config.clone(),
            name: name.to_string(),
            uuid,
        })
    }
}

#[derive(Debug, Clone)]
pub struct VirshDomain {
    config: VirshConfig,
    name: String,
    uuid: String,
}

impl VirshDomain {
    pub fn uuid(&self) -> &str {
        &self.uuid
    }
}

#[async_trait]
impl DomainHandle for VirshDomain {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query_state(&self) -> harness_core::Result<DomainState> {
        let out = self.config.run("domstate", &[self.name.as_str()]).await?;
        Ok(parse_domstate(&out))
    }

    async fn reboot(&self) -> harness_core::Result<()> {
        self.config.run("reboot", &[self.name.as_str()]).await?;
        Ok(())
    }

    /// `virsh start`, libvirt's name for creating a defined domain.
    async fn create(&self) -> harness_core::Result<()> {
        self.config.run("start", &[self.name.as_str()]).await?;
        Ok(())
    }
}
