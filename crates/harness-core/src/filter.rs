//! Accept/reject decision for incoming build events.

use crate::event::BuildCompletionEvent;

/// Topic fragment of Koji build state changes.
pub const BUILD_STATE_CHANGE_TOPIC: &str = "buildsys.build.state.change";
/// Koji instance whose builds are tested.
pub const PRIMARY_INSTANCE: &str = "primary";
/// Rendered-text marker of a finished build.
pub const COMPLETED_MARKER: &str = "completed";
/// Default package prefix of kernel builds under test.
pub const DEFAULT_PACKAGE_PREFIX: &str = "kernel-6";

/// Silent filter over bus events. Rejection is a plain `false`.
#[derive(Debug, Clone)]
pub struct EventFilter {
    topic_marker: String,
    instance: String,
    completed_marker: String,
    package_prefix: String,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::new(DEFAULT_PACKAGE_PREFIX)
    }
}

impl EventFilter {
    pub fn new(package_prefix: impl Into<String>) -> Self {
        Self {
            topic_marker: BUILD_STATE_CHANGE_TOPIC.to_string(),
            instance: PRIMARY_INSTANCE.to_string(),
            completed_marker: COMPLETED_MARKER.to_string(),
            package_prefix: package_prefix.into(),
        }
    }

    /// Override the topic fragment.
    pub fn with_topic_marker(mut self, marker: impl Into<String>) -> Self {
        self.topic_marker = marker.into();
        self
    }

    /// Override the accepted instance tag.
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = instance.into();
        self
    }

    pub fn accept(&self, topic: &str, instance: &str, rendered_text: &str) -> bool {
        topic.contains(&self.topic_marker)
            && instance == self.instance
            && rendered_text.contains(&self.completed_marker)
            && rendered_text.contains(&self.package_prefix)
    }

    pub fn accepts(&self, event: &BuildCompletionEvent) -> bool {
        self.accept(&event.topic, &event.instance, &event.rendered_text)
    }
}
