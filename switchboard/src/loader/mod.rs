//! Command loading
//!
//! Commands are registered through an explicit [`Manifest`]: a tree of
//! groups and modules assembled in code (or produced by
//! [`descriptor_tree::scan`]). The loader walks the tree depth-first in
//! registration order, accepts every module that exports both a descriptor
//! and a handler, and skips the rest with a warning. A malformed module never
//! aborts loading.

pub mod descriptor_tree;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::command::{CommandDefinition, CommandHandler, CommandPolicy, Registry, SuggestionHandler};

pub use descriptor_tree::HandlerTable;

/// A node of a source tree: either a leaf module or a named group of nodes.
#[derive(Clone)]
pub enum SourceTree<T> {
    Entry(T),
    Group { name: String, children: Vec<SourceTree<T>> },
}

/// Ordered, explicitly assembled source tree.
#[derive(Clone)]
pub struct Manifest<T> {
    entries: Vec<SourceTree<T>>,
}

impl<T> Manifest<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn register(mut self, item: T) -> Self {
        self.entries.push(SourceTree::Entry(item));
        self
    }

    pub fn group(mut self, name: impl Into<String>, build: impl FnOnce(Manifest<T>) -> Manifest<T>) -> Self {
        self.push_group(name, build(Manifest::new()));
        self
    }

    pub fn push(&mut self, item: T) {
        self.entries.push(SourceTree::Entry(item));
    }

    pub fn push_group(&mut self, name: impl Into<String>, group: Manifest<T>) {
        self.entries.push(SourceTree::Group {
            name: name.into(),
            children: group.entries,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flatten depth-first, pairing each leaf with its group path
    /// (`"moderation/admin"`, or `""` at the root).
    pub fn into_entries(self) -> Vec<(String, T)> {
        fn walk<T>(prefix: &str, nodes: Vec<SourceTree<T>>, out: &mut Vec<(String, T)>) {
            for node in nodes {
                match node {
                    SourceTree::Entry(item) => out.push((prefix.to_string(), item)),
                    SourceTree::Group { name, children } => {
                        let path = if prefix.is_empty() {
                            name
                        } else {
                            format!("{}/{}", prefix, name)
                        };
                        walk(&path, children, out);
                    }
                }
            }
        }

        let mut out = Vec::new();
        walk("", self.entries, &mut out);
        out
    }
}

impl<T> Default for Manifest<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// What a command module exports. Any export may be missing; the loader
/// decides whether the module is usable.
#[derive(Clone, Default)]
pub struct CommandModule {
    pub origin: String,
    pub descriptor: Option<serde_json::Value>,
    pub handler: Option<CommandHandler>,
    pub suggestion_handler: Option<SuggestionHandler>,
    pub policy: Option<CommandPolicy>,
}

impl CommandModule {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Default::default()
        }
    }

    pub fn descriptor(mut self, descriptor: serde_json::Value) -> Self {
        self.descriptor = Some(descriptor);
        self
    }

    pub fn handler(mut self, handler: CommandHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn suggestions(mut self, handler: SuggestionHandler) -> Self {
        self.suggestion_handler = Some(handler);
        self
    }

    pub fn policy(mut self, policy: CommandPolicy) -> Self {
        self.policy = Some(policy);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedModule {
    pub origin: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Names in load order, including ones later overwritten
    pub loaded: Vec<String>,
    pub skipped: Vec<SkippedModule>,
    /// Names registered more than once (last definition kept)
    pub overwritten: Vec<String>,
}

pub(crate) fn module_origin(path: &str, origin: &str) -> String {
    match (path.is_empty(), origin.is_empty()) {
        (true, _) => origin.to_string(),
        (false, true) => path.to_string(),
        (false, false) => format!("{}/{}", path, origin),
    }
}

/// Build a registry from `manifest`. Never fails: unusable modules are
/// reported in [`LoadReport::skipped`].
pub fn load_commands(manifest: Manifest<CommandModule>) -> (Registry, LoadReport) {
    let mut registry = Registry::new();
    let mut report = LoadReport::default();

    for (path, module) in manifest.into_entries() {
        let origin = module_origin(&path, &module.origin);

        let (descriptor, handler) = match (module.descriptor, module.handler) {
            (Some(d), Some(h)) => (d, h),
            (d, _) => {
                let reason = if d.is_none() {
                    "module does not export a descriptor"
                } else {
                    "module does not export a handler"
                };
                warn!("[Loader] Skipping {}: {}", origin, reason);
                report.skipped.push(SkippedModule {
                    origin,
                    reason: reason.to_string(),
                });
                continue;
            }
        };

        let name = match descriptor.get("name").and_then(|n| n.as_str()) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                let reason = "descriptor has no name";
                warn!("[Loader] Skipping {}: {}", origin, reason);
                report.skipped.push(SkippedModule {
                    origin,
                    reason: reason.to_string(),
                });
                continue;
            }
        };

        let definition = CommandDefinition {
            name: name.clone(),
            descriptor,
            handler,
            suggestion_handler: module.suggestion_handler,
            policy: module.policy.unwrap_or_default(),
            origin: origin.clone(),
        };

        if let Some(previous) = registry.insert(definition) {
            warn!(
                "[Loader] Command name collision: '{}' from {} replaces the definition from {}",
                name, origin, previous.origin
            );
            report.overwritten.push(name.clone());
        }
        debug!("[Loader] Registered '{}' from {}", name, origin);
        report.loaded.push(name);
    }

    info!(
        "[Loader] Loaded {} command(s), skipped {} module(s)",
        registry.len(),
        report.skipped.len()
    );
    (registry, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::command_handler;
    use serde_json::json;

    fn noop_module(origin: &str, name: &str) -> CommandModule {
        CommandModule::new(origin)
            .descriptor(json!({ "name": name, "description": "test" }))
            .handler(command_handler(|_ctx| async { Ok(()) }))
    }

    #[test]
    fn manifest_flattens_groups_depth_first() {
        let manifest = Manifest::new()
            .register("a")
            .group("moderation", |g| g.register("b").group("admin", |g| g.register("c")))
            .register("d");

        let entries = manifest.into_entries();
        assert_eq!(
            entries,
            vec![
                ("".to_string(), "a"),
                ("moderation".to_string(), "b"),
                ("moderation/admin".to_string(), "c"),
                ("".to_string(), "d"),
            ]
        );
    }

    #[test]
    fn modules_without_exports_are_skipped() {
        let manifest = Manifest::new()
            .register(noop_module("ping", "ping"))
            .register(CommandModule::new("broken").descriptor(json!({ "name": "broken" })))
            .register(CommandModule::new("nameless").handler(command_handler(|_ctx| async { Ok(()) })))
            .register(
                CommandModule::new("anonymous")
                    .descriptor(json!({ "description": "no name" }))
                    .handler(command_handler(|_ctx| async { Ok(()) })),
            );

        let (registry, report) = load_commands(manifest);
        assert_eq!(registry.names(), vec!["ping".to_string()]);
        let skipped: Vec<_> = report.skipped.iter().map(|s| s.origin.as_str()).collect();
        assert_eq!(skipped, vec!["broken", "nameless", "anonymous"]);
    }

    #[test]
    fn origin_includes_group_path() {
        let manifest = Manifest::new().group("moderation", |g| g.register(noop_module("ban", "ban")));
        let (registry, _) = load_commands(manifest);
        assert_eq!(registry.get("ban").unwrap().origin, "moderation/ban");
    }
}
