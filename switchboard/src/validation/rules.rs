// Built-in validation rules

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::ValidationRule;
use crate::command::CommandDefinition;
use crate::context::InvocationContext;

/// Rejects blocked identities and members of blocked groups.
pub struct BlocklistRule {
    identities: HashSet<String>,
    groups: HashSet<String>,
}

impl BlocklistRule {
    pub fn new<I, G>(identities: I, groups: G) -> Self
    where
        I: IntoIterator<Item = String>,
        G: IntoIterator<Item = String>,
    {
        Self {
            identities: identities.into_iter().collect(),
            groups: groups.into_iter().collect(),
        }
    }

    fn is_blocked(&self, ctx: &InvocationContext) -> bool {
        self.identities.contains(&ctx.invoker.id)
            || ctx.invoker.groups.iter().any(|g| self.groups.contains(g))
    }
}

#[async_trait]
impl ValidationRule for BlocklistRule {
    fn name(&self) -> &str {
        "blocklist"
    }

    async fn check(
        &self,
        ctx: &InvocationContext,
        _command: &CommandDefinition,
    ) -> anyhow::Result<Option<String>> {
        if self.is_blocked(ctx) {
            return Ok(Some("You are not allowed to use commands.".to_string()));
        }
        Ok(None)
    }
}

// Stale timestamps are swept once the map holds more entries than this
const PRUNE_AFTER: usize = 1024;

/// Per-invoker, per-command cooldown.
///
/// An accepted invocation records its timestamp; a second invocation inside
/// the window is rejected with the remaining wait. Recording only on accept
/// keeps repeated checks of a rejected attempt from extending the window.
/// The read and the write happen under one shard lock, so concurrent
/// invocations by the same invoker cannot both pass.
pub struct CooldownRule {
    window: Duration,
    /// Limit the rule to these command names; all commands when `None`
    commands: Option<HashSet<String>>,
    last_used: DashMap<(String, String), DateTime<Utc>>,
}

impl CooldownRule {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            commands: None,
            last_used: DashMap::new(),
        }
    }

    pub fn for_commands<I: IntoIterator<Item = String>>(mut self, commands: I) -> Self {
        self.commands = Some(commands.into_iter().collect());
        self
    }

    fn applies_to(&self, command: &str) -> bool {
        self.commands
            .as_ref()
            .map_or(true, |names| names.contains(command))
    }

    /// Never adds the window to a timestamp, so any window size is safe.
    fn cooling_down(&self, last: &DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(*last) < self.window
    }

    fn prune(&self, now: DateTime<Utc>) {
        if self.last_used.len() > PRUNE_AFTER {
            self.last_used.retain(|_, last| self.cooling_down(last, now));
        }
    }
}

#[async_trait]
impl ValidationRule for CooldownRule {
    fn name(&self) -> &str {
        "cooldown"
    }

    async fn check(
        &self,
        ctx: &InvocationContext,
        command: &CommandDefinition,
    ) -> anyhow::Result<Option<String>> {
        if !self.applies_to(&command.name) || self.window <= Duration::zero() {
            return Ok(None);
        }

        let now = Utc::now();
        // Must run before `entry` takes a shard lock
        self.prune(now);

        let key = (ctx.invoker.id.clone(), command.name.clone());
        match self.last_used.entry(key) {
            Entry::Occupied(mut used) => {
                if self.cooling_down(used.get(), now) {
                    let elapsed = now.signed_duration_since(*used.get()).max(Duration::zero());
                    let remaining = (self.window - elapsed).num_seconds().max(1);
                    return Ok(Some(format!(
                        "Please wait {} more second(s) before using /{} again.",
                        remaining, command.name
                    )));
                }
                used.insert(now);
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
            }
        }
        Ok(None)
    }
}
