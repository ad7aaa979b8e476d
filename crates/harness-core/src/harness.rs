//! The consumption loop.
//!
//! Messages are handled strictly one at a time: filter, map, log, write the
//! marker, dispatch. Dispatch returns immediately, so a message counts as
//! processed as soon as its launches are spawned. The marker for event N is
//! always written before event N+1 is looked at; nothing orders N's launches
//! against N+1's marker.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::bus::EventSource;
use crate::config::HarnessConfig;
use crate::controller::DomainController;
use crate::dispatch::{DispatchHandles, Dispatcher};
use crate::error::Result;
use crate::event::{BuildCompletionEvent, BuildsysRenderer, BusMessage, MessageRenderer};
use crate::filter::EventFilter;
use crate::hypervisor::Hypervisor;
use crate::marker::MarkerWriter;
use crate::metrics::METRICS;
use crate::obs::{emit_event_accepted, emit_event_malformed};
use crate::process_log::ProcessLog;
use crate::release::{QualifiedBuild, ReleaseMapper};

/// What happened to one bus message.
#[derive(Debug)]
pub enum EventOutcome {
    /// Filtered out or not renderable.
    Rejected,
    /// Passed the filter but did not parse.
    Malformed,
    /// Parsed, but the marker could not be written; nothing dispatched.
    MarkerFailed(QualifiedBuild),
    /// Marker written and both launches spawned.
    Dispatched {
        build: QualifiedBuild,
        handles: DispatchHandles,
    },
}

impl EventOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, EventOutcome::Dispatched { .. })
    }
}

pub struct Harness<H: Hypervisor> {
    filter: EventFilter,
    mapper: ReleaseMapper,
    renderer: Box<dyn MessageRenderer>,
    marker: MarkerWriter,
    log: ProcessLog,
    dispatcher: Dispatcher<H>,
}

impl<H: Hypervisor> Harness<H> {
    /// Wire the pipeline from configuration.
    ///
    /// Fails with `MarkerDirMissing` when the marker directory is absent.
    pub fn new(config: &HarnessConfig, hypervisor: Arc<H>) -> Result<Self> {
        let marker = MarkerWriter::open(&config.marker_dir)?;
        let controller = DomainController::new(hypervisor, config.wait_policy());
        Ok(Self {
            filter: EventFilter::new(config.package_prefix.clone()),
            mapper: ReleaseMapper::new(config.rawhide_tag.clone()),
            renderer: Box::new(BuildsysRenderer),
            marker,
            log: ProcessLog::new(&config.log_path),
            dispatcher: Dispatcher::new(controller),
        })
    }

    pub fn with_renderer(mut self, renderer: impl MessageRenderer + 'static) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    pub fn with_filter(mut self, filter: EventFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Handle one message. Never fails: every error is logged and folded
    /// into the outcome so the loop keeps consuming.
    pub async fn handle_message(&self, message: &BusMessage) -> EventOutcome {
        let Some(event) = BuildCompletionEvent::from_message(message, self.renderer.as_ref())
        else {
            return EventOutcome::Rejected;
        };
        if !self.filter.accepts(&event) {
            return EventOutcome::Rejected;
        }

        let parsed = match message.structured_package() {
            Some(package) => package,
            None => self.mapper.parse(&event.rendered_text),
        };
        let qualified =
            parsed.and_then(|package| self.mapper.qualify(package, &event.rendered_text));
        let build = match qualified {
            Ok(build) => build,
            Err(e) => {
                METRICS.inc_events_malformed();
                emit_event_malformed(&event.rendered_text, &e);
                return EventOutcome::Malformed;
            }
        };

        METRICS.inc_events_accepted();
        emit_event_accepted(&build.package.nvr, &build.family.to_string());
        info!("{}", event.rendered_text);

        if let Err(e) = self
            .log
            .record_accepted(&event.rendered_text, &build.package.nvr)
            .await
        {
            warn!(error = %e, "process log write failed, continuing");
        }

        if let Err(e) = self.marker.write(&build.family, &build.package.nvr).await {
            error!(error = %e, family = %build.family, "marker write failed, skipping dispatch");
            return EventOutcome::MarkerFailed(build);
        }

        let handles = self.dispatcher.dispatch(&build.family);
        EventOutcome::Dispatched { build, handles }
    }

    /// Consume `source` until it ends. Launch tasks are detached.
    pub async fn run<S: EventSource>(&self, source: &mut S) -> Result<()> {
        info!(marker_dir = %self.marker.dir().display(), "listening for build events");
        let result = loop {
            match source.recv().await {
                Ok(Some(message)) => {
                    METRICS.inc_messages_received();
                    // Dropping the outcome detaches any spawned launches.
                    let _ = self.handle_message(&message).await;
                }
                Ok(None) => {
                    info!("bus stream ended");
                    break Ok(());
                }
                Err(e) => {
                    error!(error = %e, "bus receive failed");
                    break Err(e);
                }
            }
        };
        METRICS.flush();
        result
    }
}
