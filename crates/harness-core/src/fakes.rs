//! In-memory fakes for the hypervisor and bus seams (testing only)
//!
//! `FakeHypervisor` scripts per-domain power states and records every call
//! made against each domain. `VecSource` replays a fixed list of bus
//! messages and then reports end of stream.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::bus::EventSource;
use crate::domain::DomainName;
use crate::error::{HarnessError, Result};
use crate::event::BusMessage;
use crate::hypervisor::{DomainHandle, DomainState, Hypervisor, HypervisorConnection};

// ---------------------------------------------------------------------------
// FakeHypervisor
// ---------------------------------------------------------------------------

/// A call recorded against a fake domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    QueryState,
    Reboot,
    Create,
}

#[derive(Debug, Default)]
struct FakeDomain {
    /// States returned by successive queries; the last one repeats.
    script: VecDeque<DomainState>,
    failing_queries: u32,
    fail_mutations: bool,
    calls: Vec<Call>,
}

#[derive(Debug, Default)]
struct FakeInner {
    domains: Mutex<HashMap<String, FakeDomain>>,
    connections: AtomicUsize,
    unavailable: AtomicBool,
}

/// Scripted hypervisor shared by every connection it hands out.
#[derive(Debug, Clone, Default)]
pub struct FakeHypervisor {
    inner: Arc<FakeInner>,
}

impl FakeHypervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a domain whose queries return `states` in order.
    pub fn add_domain(&self, name: &str, states: Vec<DomainState>) {
        let mut domains = self.inner.domains.lock().unwrap();
        domains.insert(
            name.to_string(),
            FakeDomain {
                script: states.into(),
                ..FakeDomain::default()
            },
        );
    }

    /// Make the next `count` state queries on `name` fail.
    pub fn fail_next_queries(&self, name: &str, count: u32) {
        let mut domains = self.inner.domains.lock().unwrap();
        if let Some(domain) = domains.get_mut(name) {
            domain.failing_queries = count;
        }
    }

    /// Make `connect()` fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make `reboot()` and `create()` on `name` fail.
    pub fn set_fail_mutations(&self, name: &str, fail: bool) {
        let mut domains = self.inner.domains.lock().unwrap();
        if let Some(domain) = domains.get_mut(name) {
            domain.fail_mutations = fail;
        }
    }

    /// Calls recorded against `name`, in order.
    pub fn calls(&self, name: &str) -> Vec<Call> {
        let domains = self.inner.domains.lock().unwrap();
        domains
            .get(name)
            .map(|d| d.calls.clone())
            .unwrap_or_default()
    }

    /// Number of successful `connect()` calls.
    pub fn connections(&self) -> usize {
        self.inner.connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Hypervisor for FakeHypervisor {
    type Connection = FakeConnection;

    async fn connect(&self) -> Result<FakeConnection> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(HarnessError::HypervisorUnavailable(
                "fake hypervisor is down".to_string(),
            ));
        }
        self.inner.connections.fetch_add(1, Ordering::SeqCst);
        Ok(FakeConnection {
            inner: Arc::clone(&self.inner),
        })
    }
}

pub struct FakeConnection {
    inner: Arc<FakeInner>,
}

#[async_trait]
impl HypervisorConnection for FakeConnection {
    type Domain = FakeDomainHandle;

    async fn lookup_domain(&self, name: &DomainName) -> Result<FakeDomainHandle> {
        let domains = self.inner.domains.lock().unwrap();
        if !domains.contains_key(name.as_str()) {
            return Err(HarnessError::DomainNotFound(name.to_string()));
        }
        Ok(FakeDomainHandle {
            name: name.to_string(),
            inner: Arc::clone(&self.inner),
        })
    }
}

pub struct FakeDomainHandle {
    name: String,
    inner: Arc<FakeInner>,
}

impl FakeDomainHandle {
    fn mutate(&self, call: Call) -> Result<()> {
        let mut domains = self.inner.domains.lock().unwrap();
        let domain = domains
            .get_mut(&self.name)
            .ok_or_else(|| HarnessError::DomainNotFound(self.name.clone()))?;
        domain.calls.push(call);
        if domain.fail_mutations {
            return Err(HarnessError::HypervisorUnavailable(format!(
                "{call:?} rejected for {}",
                self.name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DomainHandle for FakeDomainHandle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query_state(&self) -> Result<DomainState> {
        let mut domains = self.inner.domains.lock().unwrap();
        let domain = domains
            .get_mut(&self.name)
            .ok_or_else(|| HarnessError::DomainNotFound(self.name.clone()))?;
        domain.calls.push(Call::QueryState);

        if domain.failing_queries > 0 {
            domain.failing_queries -= 1;
            return Err(HarnessError::HypervisorUnavailable(
                "fake query failure".to_string(),
            ));
        }

        let state = if domain.script.len() > 1 {
            domain.script.pop_front()
        } else {
            domain.script.front().copied()
        };
        Ok(state.unwrap_or(DomainState::Unknown))
    }

    async fn reboot(&self) -> Result<()> {
        self.mutate(Call::Reboot)
    }

    async fn create(&self) -> Result<()> {
        self.mutate(Call::Create)
    }
}

// ---------------------------------------------------------------------------
// VecSource
// ---------------------------------------------------------------------------

/// Bus source that yields a fixed list of messages, then end of stream.
#[derive(Debug, Default)]
pub struct VecSource {
    messages: VecDeque<BusMessage>,
}

impl VecSource {
    pub fn new(messages: Vec<BusMessage>) -> Self {
        Self {
            messages: messages.into(),
        }
    }
}

#[async_trait]
impl EventSource for VecSource {
    async fn recv(&mut self) -> Result<Option<BusMessage>> {
        Ok(self.messages.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Arch, DomainFamily};

    #[tokio::test]
    async fn script_repeats_last_state() {
        let hv = FakeHypervisor::new();
        hv.add_domain("Fedora38_64", vec![DomainState::Running, DomainState::ShutOff]);

        let conn = hv.connect().await.unwrap();
        let name = DomainName::new(DomainFamily::Fedora("38".into()), Arch::X86_64);
        let dom = conn.lookup_domain(&name).await.unwrap();

        assert_eq!(dom.query_state().await.unwrap(), DomainState::Running);
        assert_eq!(dom.query_state().await.unwrap(), DomainState::ShutOff);
        assert_eq!(dom.query_state().await.unwrap(), DomainState::ShutOff);
        assert_eq!(hv.calls("Fedora38_64").len(), 3);
    }

    #[tokio::test]
    async fn failed_mutation_is_still_recorded() {
        let hv = FakeHypervisor::new();
        hv.add_domain("Rawhide64", vec![]);
        hv.set_fail_mutations("Rawhide64", true);

        let conn = hv.connect().await.unwrap();
        let name = DomainName::new(DomainFamily::Rawhide, Arch::X86_64);
        let dom = conn.lookup_domain(&name).await.unwrap();

        assert!(dom.reboot().await.is_err());
        assert_eq!(hv.calls("Rawhide64"), vec![Call::Reboot]);
    }

    #[tokio::test]
    async fn vec_source_drains_then_ends() {
        let mut source = VecSource::new(vec![BusMessage::new("t", serde_json::json!({}))]);
        assert!(source.recv().await.unwrap().is_some());
        assert!(source.recv().await.unwrap().is_none());
    }
}
