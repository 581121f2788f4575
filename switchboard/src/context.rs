//! Per-event invocation state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::command::CapabilitySet;
use crate::response::{ResponseChannel, SuggestionSink};

/// The identity that triggered an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoker {
    pub id: String,
    /// Capability snapshot taken when the event was received
    #[serde(default)]
    pub capabilities: CapabilitySet,
    /// Group (role) memberships, checked against the restricted allow-list
    #[serde(default)]
    pub groups: Vec<String>,
}

impl Invoker {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_capabilities<I, S>(mut self, caps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = caps.into_iter().collect();
        self
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOption {
    pub name: String,
    #[serde(default)]
    pub value: serde_json::Value,
    /// Set on the option currently being typed (suggestion requests only)
    #[serde(default)]
    pub focused: bool,
}

/// Created per primary invocation, dropped once the handler returns.
#[derive(Clone)]
pub struct InvocationContext {
    pub command_name: String,
    pub invoker: Invoker,
    /// Target scope the event originated from (e.g. a guild id)
    pub scope: Option<String>,
    pub options: Vec<CommandOption>,
    /// Capabilities of the acting agent in this scope. `None` when not yet
    /// resolved; the executor check is skipped in that case.
    pub executor_capabilities: Option<CapabilitySet>,
    pub channel: Arc<dyn ResponseChannel>,
}

impl InvocationContext {
    pub fn new(
        command_name: impl Into<String>,
        invoker: Invoker,
        channel: Arc<dyn ResponseChannel>,
    ) -> Self {
        Self {
            command_name: command_name.into(),
            invoker,
            scope: None,
            options: Vec::new(),
            executor_capabilities: None,
            channel,
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_options(mut self, options: Vec<CommandOption>) -> Self {
        self.options = options;
        self
    }

    pub fn with_executor_capabilities(mut self, caps: CapabilitySet) -> Self {
        self.executor_capabilities = Some(caps);
        self
    }

    pub fn option(&self, name: &str) -> Option<&serde_json::Value> {
        self.options.iter().find(|o| o.name == name).map(|o| &o.value)
    }
}

/// Created per suggestion request.
#[derive(Clone)]
pub struct SuggestionContext {
    pub command_name: String,
    pub invoker: Invoker,
    pub scope: Option<String>,
    pub options: Vec<CommandOption>,
    pub sink: Arc<dyn SuggestionSink>,
}

impl SuggestionContext {
    pub fn new(
        command_name: impl Into<String>,
        invoker: Invoker,
        sink: Arc<dyn SuggestionSink>,
    ) -> Self {
        Self {
            command_name: command_name.into(),
            invoker,
            scope: None,
            options: Vec::new(),
            sink,
        }
    }

    pub fn with_options(mut self, options: Vec<CommandOption>) -> Self {
        self.options = options;
        self
    }

    /// The option the invoker is currently typing.
    pub fn focused(&self) -> Option<&CommandOption> {
        self.options.iter().find(|o| o.focused)
    }

    /// Text typed so far in the focused option, or empty.
    pub fn partial_input(&self) -> &str {
        self.focused()
            .and_then(|o| o.value.as_str())
            .unwrap_or_default()
    }
}
