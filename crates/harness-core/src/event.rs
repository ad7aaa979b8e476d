//! Bus message envelope and rendering to human text.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::release::PackageIdentity;

/// One message as delivered by the bus relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    pub topic: String,
    #[serde(default)]
    pub msg: Value,
    /// Human text pre-rendered by the relay, when it has a renderer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered: Option<String>,
}

impl BusMessage {
    pub fn new(topic: impl Into<String>, msg: Value) -> Self {
        Self {
            topic: topic.into(),
            msg,
            rendered: None,
        }
    }

    pub fn with_rendered(mut self, rendered: impl Into<String>) -> Self {
        self.rendered = Some(rendered.into());
        self
    }

    /// The `msg.instance` tag, empty when absent.
    pub fn instance(&self) -> &str {
        self.field("instance").unwrap_or_default()
    }

    fn field(&self, key: &str) -> Option<&str> {
        self.msg.get(key).and_then(Value::as_str)
    }

    /// Package identity straight from the payload, when every field is there.
    ///
    /// Returns `None` when the payload lacks any of `name`, `version` or
    /// `release`; callers then fall back to parsing rendered text. `arch` is
    /// optional since Koji build notifications do not carry one.
    pub fn structured_package(&self) -> Option<Result<PackageIdentity>> {
        let name = self.field("name")?;
        let version = self.field("version")?;
        let release = self.field("release")?;
        let arch = self.field("arch");
        Some(PackageIdentity::from_fields(name, version, release, arch))
    }
}

/// A bus message reduced to what the filter and mapper look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCompletionEvent {
    pub topic: String,
    pub instance: String,
    pub rendered_text: String,
}

/// Turns a structured bus message into free text.
pub trait MessageRenderer: Send + Sync {
    fn render(&self, message: &BusMessage) -> Option<String>;
}

/// Renderer for Koji `buildsys.build.state.change` payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildsysRenderer;

impl BuildsysRenderer {
    fn state_name(state: i64) -> Option<&'static str> {
        match state {
            0 => Some("building"),
            1 => Some("completed"),
            2 => Some("deleted"),
            3 => Some("failed"),
            4 => Some("canceled"),
            _ => None,
        }
    }
}

impl MessageRenderer for BuildsysRenderer {
    fn render(&self, message: &BusMessage) -> Option<String> {
        if let Some(text) = &message.rendered {
            return Some(text.clone());
        }

        let msg = &message.msg;
        let owner = msg.get("owner").and_then(Value::as_str)?;
        let name = msg.get("name").and_then(Value::as_str)?;
        let version = msg.get("version").and_then(Value::as_str)?;
        let release = msg.get("release").and_then(Value::as_str)?;
        let state = msg
            .get("new")
            .and_then(Value::as_i64)
            .and_then(Self::state_name)?;

        let mut nvr = format!("{name}-{version}-{release}");
        if let Some(arch) = msg.get("arch").and_then(Value::as_str) {
            nvr.push('.');
            nvr.push_str(arch);
        }
        Some(format!("{owner}'s {nvr} {state}"))
    }
}

impl BuildCompletionEvent {
    /// Reduce a bus message; `None` when the renderer has nothing to say.
    pub fn from_message(message: &BusMessage, renderer: &dyn MessageRenderer) -> Option<Self> {
        let rendered_text = renderer.render(message)?;
        Some(Self {
            topic: message.topic.clone(),
            instance: message.instance().to_string(),
            rendered_text,
        })
    }
}
