//! Structured lifecycle events for accepted builds and domain launches.
//!
//! Every function emits one `tracing` event with an `event = "..."` field so
//! log pipelines can key on it.

use tracing::{info, warn, Span};

/// Span wrapping one launch task, tagged with the domain name.
pub fn launch_span(domain: &str) -> Span {
    tracing::info_span!("harness.launch", domain = %domain)
}

/// Emit event: a build passed the filter and mapped to a family.
pub fn emit_event_accepted(nvr: &str, family: &str) {
    info!(event = "event.accepted", nvr = %nvr, family = %family);
}

/// Emit event: a filtered-in build could not be parsed.
pub fn emit_event_malformed(raw: &str, error: &dyn std::fmt::Display) {
    warn!(event = "event.malformed", raw = %raw, error = %error);
}

/// Emit event: a launch task was spawned.
pub fn emit_launch_started(domain: &str) {
    info!(event = "launch.started", domain = %domain, "starting domain {}", domain);
}

/// Emit event: a launch task issued its mutating call.
pub fn emit_launch_finished(domain: &str, action: &str) {
    info!(event = "launch.finished", domain = %domain, action = %action);
}

/// Emit event: a launch task ended in error (warning level).
pub fn emit_launch_failed(domain: &str, error: &dyn std::fmt::Display) {
    warn!(event = "launch.failed", domain = %domain, error = %error);
}
