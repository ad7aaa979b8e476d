//! Kernel Test Harness Core
//!
//! Turns "kernel build completed" bus events into test VM provisioning:
//!
//! - [`EventFilter`] keeps primary-instance kernel build completions
//! - [`ReleaseMapper`] derives the package and domain family from event text
//! - [`MarkerWriter`] records the latest kernel per family
//! - [`Dispatcher`] spawns one [`DomainController`] run per architecture
//! - [`Harness`] is the consumption loop tying them together
//!
//! The hypervisor and bus are reached through the [`Hypervisor`] and
//! [`EventSource`] traits; in-memory fakes live in [`fakes`].

pub mod bus;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod domain;
mod error;
pub mod event;
pub mod fakes;
pub mod filter;
pub mod harness;
pub mod hypervisor;
pub mod marker;
pub mod metrics;
pub mod obs;
pub mod process_log;
pub mod release;
pub mod telemetry;

pub use bus::{EventSource, JsonLinesSource};
pub use config::{BusConfig, HarnessConfig, HypervisorConfig};
pub use controller::{DomainController, LaunchAction, LaunchOutcome, WaitPolicy};
pub use dispatch::{DispatchHandles, Dispatcher, Launch};
pub use domain::{Arch, DomainFamily, DomainName};
pub use error::{HarnessError, Result};
pub use event::{BuildCompletionEvent, BuildsysRenderer, BusMessage, MessageRenderer};
pub use filter::EventFilter;
pub use harness::{EventOutcome, Harness};
pub use hypervisor::{DomainHandle, DomainState, Hypervisor, HypervisorConnection};
pub use marker::MarkerWriter;
pub use metrics::METRICS;
pub use process_log::{write_pid_file, ProcessLog};
pub use release::{PackageIdentity, QualifiedBuild, ReleaseMapper};
pub use telemetry::init_tracing;

/// Harness version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
