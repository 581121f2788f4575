//! Command definitions and the name-keyed registry.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::context::{InvocationContext, SuggestionContext};
use crate::response::SuggestionChoice;

pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;
pub type SuggestionFuture = BoxFuture<'static, anyhow::Result<Vec<SuggestionChoice>>>;

/// Primary invocation callback.
pub type CommandHandler = Arc<dyn Fn(InvocationContext) -> HandlerFuture + Send + Sync>;

/// Incremental-input callback. Returns the choices to offer the invoker.
pub type SuggestionHandler = Arc<dyn Fn(SuggestionContext) -> SuggestionFuture + Send + Sync>;

pub fn command_handler<F, Fut>(f: F) -> CommandHandler
where
    F: Fn(InvocationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

pub fn suggestion_handler<F, Fut>(f: F) -> SuggestionHandler
where
    F: Fn(SuggestionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Vec<SuggestionChoice>>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// Opaque permission tokens held by an invoker or by the agent itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<String>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, capability: &str) -> bool {
        self.0.contains(capability)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    /// Tokens of `required` that this set does not hold, in sorted order.
    pub fn missing(&self, required: &CapabilitySet) -> Vec<String> {
        required.0.difference(&self.0).cloned().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopePolicy {
    #[default]
    Global,
    /// Operator-only: registered on every restricted target and gated by the
    /// developer allow-list.
    RestrictedScope,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandPolicy {
    pub scope_policy: ScopePolicy,
    pub required_invoker_capabilities: CapabilitySet,
    pub required_executor_capabilities: CapabilitySet,
    /// Excluded from catalog synchronization.
    pub retired: bool,
}

impl CommandPolicy {
    pub fn restricted() -> Self {
        Self {
            scope_policy: ScopePolicy::RestrictedScope,
            ..Default::default()
        }
    }

    pub fn with_invoker_capabilities<I, S>(mut self, caps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_invoker_capabilities = caps.into_iter().collect();
        self
    }

    pub fn with_executor_capabilities<I, S>(mut self, caps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_executor_capabilities = caps.into_iter().collect();
        self
    }

    pub fn retired(mut self) -> Self {
        self.retired = true;
        self
    }
}

/// The unit of registration. Immutable once loaded.
#[derive(Clone)]
pub struct CommandDefinition {
    pub name: String,
    /// Schema handed unmodified to the remote catalog
    pub descriptor: serde_json::Value,
    pub handler: CommandHandler,
    pub suggestion_handler: Option<SuggestionHandler>,
    pub policy: CommandPolicy,
    /// Where the definition came from, for diagnostics
    pub origin: String,
}

impl CommandDefinition {
    pub fn is_restricted(&self) -> bool {
        self.policy.scope_policy == ScopePolicy::RestrictedScope
    }
}

impl std::fmt::Debug for CommandDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDefinition")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("has_suggestions", &self.suggestion_handler.is_some())
            .field("origin", &self.origin)
            .finish()
    }
}

/// Name-keyed command registry. Last write wins on collision.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    commands: HashMap<String, Arc<CommandDefinition>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a definition, returning the one it replaced.
    pub fn insert(&mut self, definition: CommandDefinition) -> Option<Arc<CommandDefinition>> {
        self.commands
            .insert(definition.name.clone(), Arc::new(definition))
    }

    pub fn get(&self, name: &str) -> Option<Arc<CommandDefinition>> {
        self.commands.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// All definitions, sorted by name.
    pub fn definitions(&self) -> Vec<Arc<CommandDefinition>> {
        let mut defs: Vec<_> = self.commands.values().cloned().collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn names(&self) -> Vec<String> {
        self.definitions().iter().map(|d| d.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_capabilities_are_sorted_difference() {
        let held: CapabilitySet = ["ban_members", "send_messages"].into_iter().collect();
        let required: CapabilitySet = ["manage_guild", "ban_members", "administrator"]
            .into_iter()
            .collect();
        assert_eq!(
            held.missing(&required),
            vec!["administrator".to_string(), "manage_guild".to_string()]
        );
        assert!(held.missing(&CapabilitySet::new()).is_empty());
    }

    #[test]
    fn policy_deserializes_with_defaults() {
        let policy: CommandPolicy = serde_json::from_value(serde_json::json!({
            "scope_policy": "restricted_scope",
            "required_invoker_capabilities": ["kick_members"]
        }))
        .unwrap();
        assert_eq!(policy.scope_policy, ScopePolicy::RestrictedScope);
        assert!(policy.required_invoker_capabilities.contains("kick_members"));
        assert!(policy.required_executor_capabilities.is_empty());
        assert!(!policy.retired);
    }
}
