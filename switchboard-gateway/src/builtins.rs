//! Commands shipped with the gateway binary.

use std::sync::{Arc, OnceLock};

use serde_json::json;
use switchboard::{
    command_handler, suggestion_handler, CommandHandler, CommandModule, CommandPolicy, HandlerTable,
    InvocationContext, Manifest, Registry, ResponsePayload, SuggestionChoice, SuggestionContext, SuggestionHandler,
};

// Upper bound on suggestion choices per answer
const MAX_CHOICES: usize = 25;

/// Late-bound view of the loaded registry. The `commands` command is itself
/// part of the registry, so the registry is attached after loading.
#[derive(Clone, Default)]
pub struct Directory {
    registry: Arc<OnceLock<Arc<Registry>>>,
}

impl Directory {
    pub fn attach(&self, registry: Arc<Registry>) {
        let _ = self.registry.set(registry);
    }

    fn names(&self) -> Vec<String> {
        self.registry.get().map(|r| r.names()).unwrap_or_default()
    }

    /// Names any invoker may see: suggestions run without permission checks.
    fn public_names(&self) -> Vec<String> {
        self.registry
            .get()
            .map(|r| {
                r.definitions()
                    .into_iter()
                    .filter(|d| !d.is_restricted() && !d.policy.retired)
                    .map(|d| d.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn ping() -> CommandHandler {
    command_handler(|ctx: InvocationContext| async move {
        ctx.channel.reply(ResponsePayload::text("Pong!")).await
    })
}

fn list_commands(directory: &Directory) -> CommandHandler {
    let directory = directory.clone();
    command_handler(move |ctx: InvocationContext| {
        let names = directory.names();
        async move {
            let prefix = ctx.option("name").and_then(|v| v.as_str()).unwrap_or_default();
            let shown: Vec<_> = names
                .iter()
                .filter(|n| n.starts_with(prefix))
                .map(|n| format!("/{}", n))
                .collect();
            let content = if shown.is_empty() {
                "No matching commands.".to_string()
            } else {
                format!("Loaded commands: {}", shown.join(", "))
            };
            ctx.channel.reply(ResponsePayload::ephemeral(content)).await
        }
    })
}

fn complete_command_names(directory: &Directory) -> SuggestionHandler {
    let directory = directory.clone();
    suggestion_handler(move |ctx: SuggestionContext| {
        let names = directory.public_names();
        async move {
            let typed = ctx.partial_input().to_lowercase();
            Ok(names
                .into_iter()
                .filter(|n| n.starts_with(&typed))
                .take(MAX_CHOICES)
                .map(|n| SuggestionChoice::new(n.clone(), n))
                .collect())
        }
    })
}

/// Handlers addressable from a descriptor directory.
pub fn handler_table(directory: &Directory) -> HandlerTable {
    HandlerTable::new()
        .command("ping", ping())
        .command("commands", list_commands(directory))
        .suggestion("commands", complete_command_names(directory))
}

pub fn manifest(directory: &Directory) -> Manifest<CommandModule> {
    Manifest::new()
        .register(
            CommandModule::new("ping")
                .descriptor(json!({
                    "name": "ping",
                    "description": "Check that the bot is responding",
                    "options": []
                }))
                .handler(ping()),
        )
        .register(
            CommandModule::new("commands")
                .descriptor(json!({
                    "name": "commands",
                    "description": "List loaded commands",
                    "options": [{
                        "name": "name",
                        "description": "Filter by prefix",
                        "type": 3,
                        "required": false,
                        "autocomplete": true
                    }]
                }))
                .policy(CommandPolicy::restricted())
                .handler(list_commands(directory))
                .suggestions(complete_command_names(directory)),
        )
}
