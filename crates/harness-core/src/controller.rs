//! Power-state lifecycle of a single test domain.
//!
//! Rawhide domains are rebooted straight away. Every other family is polled
//! until it reports shut off and then powered on once. The policy is chosen
//! by family alone; rawhide never looks at the current state.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use crate::domain::DomainName;
use crate::error::{HarnessError, Result};
use crate::hypervisor::{DomainHandle, DomainState, Hypervisor, HypervisorConnection};

/// Default cadence between state queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a domain to shut off.
///
/// `max_attempts = None` waits forever, which is the deployed behaviour: a
/// domain that never shuts off keeps its launch task alive until the process
/// exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    pub max_attempts: Option<u32>,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::unbounded(DEFAULT_POLL_INTERVAL)
    }
}

impl WaitPolicy {
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
        }
    }

    pub fn bounded(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: Some(max_attempts),
        }
    }
}

/// The mutating call a launch ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchAction {
    Rebooted,
    /// Powered on after `polls` state queries.
    Created { polls: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOutcome {
    pub domain: DomainName,
    pub action: LaunchAction,
}

/// Drives one domain per [`run`](Self::run) call.
pub struct DomainController<H: Hypervisor> {
    hypervisor: Arc<H>,
    wait: WaitPolicy,
}

impl<H: Hypervisor> DomainController<H> {
    pub fn new(hypervisor: Arc<H>, wait: WaitPolicy) -> Self {
        Self { hypervisor, wait }
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        self.wait
    }

    /// Open a connection, look the domain up and issue exactly one mutating
    /// call: `reboot` for rawhide, `create` once shut off for the rest.
    #[instrument(skip(self, name), fields(domain = %name))]
    pub async fn run(&self, name: &DomainName) -> Result<LaunchOutcome> {
        let conn = self.hypervisor.connect().await?;
        let domain = conn.lookup_domain(name).await?;

        let action = if name.family().is_rawhide() {
            domain.reboot().await?;
            LaunchAction::Rebooted
        } else {
            let polls = self.wait_for_shutoff(&domain).await?;
            domain.create().await?;
            LaunchAction::Created { polls }
        };

        info!(?action, "domain {} started", name);
        Ok(LaunchOutcome {
            domain: name.clone(),
            action,
        })
    }

    /// Poll until shut off; returns the number of queries made.
    async fn wait_for_shutoff<D: DomainHandle>(&self, domain: &D) -> Result<u32> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let state = match domain.query_state().await {
                Ok(state) => state,
                Err(e) => {
                    warn!(error = %e, attempt = attempts, "state query failed, treating as unknown");
                    DomainState::Unknown
                }
            };

            if state == DomainState::ShutOff {
                return Ok(attempts);
            }
            debug!(%state, attempt = attempts, "waiting for shut off");

            if let Some(max) = self.wait.max_attempts {
                if attempts >= max {
                    error!(
                        attempts,
                        last_state = %state,
                        "domain never reached shut off, giving up"
                    );
                    return Err(HarnessError::ShutoffWaitExhausted {
                        domain: domain.name().to_string(),
                        attempts,
                    });
                }
            }

            tokio::time::sleep(self.wait.interval).await;
        }
    }
}
