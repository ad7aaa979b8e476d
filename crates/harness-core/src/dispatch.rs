//! Fan-out of one accepted event into two independent launch tasks.
//!
//! Every dispatch spawns exactly two tokio tasks, one per architecture, and
//! returns without waiting. The tasks share nothing but the hypervisor
//! client; a failure in one never reaches the other or the caller.
//!
//! Two events for the same family in quick succession target the same
//! domains and their tasks race unguarded.

use std::sync::Arc;

use futures::future::join;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::controller::{DomainController, LaunchAction, LaunchOutcome};
use crate::domain::{DomainFamily, DomainName};
use crate::error::{HarnessError, Result};
use crate::hypervisor::Hypervisor;
use crate::metrics::METRICS;
use crate::obs::{emit_launch_failed, emit_launch_finished, emit_launch_started, launch_span};

/// A spawned launch task and the domain it targets.
#[derive(Debug)]
pub struct Launch {
    pub domain: DomainName,
    pub handle: JoinHandle<Result<LaunchOutcome>>,
}

impl Launch {
    /// Await the task; a panic or cancellation becomes `LaunchAborted`.
    pub async fn wait(self) -> Result<LaunchOutcome> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(HarnessError::LaunchAborted {
                domain: self.domain.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Handles for the two launches of one event.
///
/// Dropping this detaches both tasks; they keep running.
#[derive(Debug)]
pub struct DispatchHandles {
    pub arm64: Launch,
    pub x86_64: Launch,
}

impl DispatchHandles {
    /// Wait for both launches, arm64 result first.
    pub async fn join(self) -> (Result<LaunchOutcome>, Result<LaunchOutcome>) {
        join(self.arm64.wait(), self.x86_64.wait()).await
    }
}

/// Starts domain launches on the tokio runtime.
pub struct Dispatcher<H: Hypervisor> {
    controller: Arc<DomainController<H>>,
}

impl<H: Hypervisor> Clone for Dispatcher<H> {
    fn clone(&self) -> Self {
        Self {
            controller: Arc::clone(&self.controller),
        }
    }
}

impl<H: Hypervisor> Dispatcher<H> {
    pub fn new(controller: DomainController<H>) -> Self {
        Self {
            controller: Arc::new(controller),
        }
    }

    /// Spawn launches for `family + "arm64"` and `family + "64"`.
    pub fn dispatch(&self, family: &DomainFamily) -> DispatchHandles {
        let [arm64, x86_64] = family.domain_pair();
        DispatchHandles {
            arm64: self.launch(arm64),
            x86_64: self.launch(x86_64),
        }
    }

    fn launch(&self, domain: DomainName) -> Launch {
        emit_launch_started(domain.as_str());
        METRICS.inc_launches_started();

        let controller = Arc::clone(&self.controller);
        let name = domain.clone();
        let span = launch_span(name.as_str());
        let handle = tokio::spawn(
            async move {
                let result = controller.run(&name).await;
                match &result {
                    Ok(outcome) => {
                        let action = match outcome.action {
                            LaunchAction::Rebooted => "reboot",
                            LaunchAction::Created { .. } => "create",
                        };
                        emit_launch_finished(name.as_str(), action);
                    }
                    Err(e) => {
                        METRICS.inc_launches_failed();
                        emit_launch_failed(name.as_str(), e);
                    }
                }
                result
            }
            .instrument(span),
        );

        Launch { domain, handle }
    }
}
