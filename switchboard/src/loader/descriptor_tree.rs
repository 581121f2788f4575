//! Filesystem descriptor source.
//!
//! Walks a directory tree of `*.json` descriptor files and turns each into a
//! [`CommandModule`]. Handlers cannot live in a data file, so each file names
//! its handler by key and the key is resolved through a [`HandlerTable`]
//! populated in code. File layout:
//!
//! ```json
//! {
//!   "descriptor": { "name": "ban", "description": "Ban a member", "options": [] },
//!   "handler": "moderation.ban",
//!   "suggestion_handler": "moderation.ban",
//!   "policy": { "required_invoker_capabilities": ["ban_members"] }
//! }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use super::{CommandModule, Manifest};
use crate::command::{CommandHandler, CommandPolicy, SuggestionHandler};
use crate::error::EngineResult;

/// Handlers addressable from descriptor files.
#[derive(Clone, Default)]
pub struct HandlerTable {
    commands: HashMap<String, CommandHandler>,
    suggestions: HashMap<String, SuggestionHandler>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn command(mut self, key: impl Into<String>, handler: CommandHandler) -> Self {
        self.commands.insert(key.into(), handler);
        self
    }

    pub fn suggestion(mut self, key: impl Into<String>, handler: SuggestionHandler) -> Self {
        self.suggestions.insert(key.into(), handler);
        self
    }
}

#[derive(Debug, Deserialize)]
struct DescriptorFile {
    descriptor: Option<serde_json::Value>,
    handler: Option<String>,
    suggestion_handler: Option<String>,
    policy: Option<CommandPolicy>,
}

/// Scan `root` recursively. Directories become manifest groups; entries are
/// visited in file-name order so load order is stable across platforms.
pub fn scan(root: &Path, handlers: &HandlerTable) -> EngineResult<Manifest<CommandModule>> {
    let mut manifest = Manifest::new();
    scan_dir(root, handlers, &mut manifest)?;
    Ok(manifest)
}

fn scan_dir(dir: &Path, handlers: &HandlerTable, manifest: &mut Manifest<CommandModule>) -> EngineResult<()> {
    let mut entries = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect::<Vec<_>>();
    entries.sort();

    for path in entries {
        let label = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        if path.is_dir() {
            let mut group = Manifest::new();
            scan_dir(&path, handlers, &mut group)?;
            manifest.push_group(label, group);
            continue;
        }

        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            debug!("[Loader] Ignoring non-descriptor file {:?}", path);
            continue;
        }

        let parsed = fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|content| {
                serde_json::from_str::<DescriptorFile>(&content).map_err(|e| e.to_string())
            });
        let file = match parsed {
            Ok(file) => file,
            Err(e) => {
                warn!("[Loader] Skipping unreadable descriptor {:?}: {}", path, e);
                continue;
            }
        };

        manifest.push(into_module(label, file, handlers));
    }
    Ok(())
}

fn into_module(origin: String, file: DescriptorFile, handlers: &HandlerTable) -> CommandModule {
    let handler = file.handler.as_deref().and_then(|key| {
        let found = handlers.commands.get(key).cloned();
        if found.is_none() {
            warn!("[Loader] {}: no handler registered under '{}'", origin, key);
        }
        found
    });
    let suggestion_handler = file.suggestion_handler.as_deref().and_then(|key| {
        let found = handlers.suggestions.get(key).cloned();
        if found.is_none() {
            warn!("[Loader] {}: no suggestion handler registered under '{}'", origin, key);
        }
        found
    });

    CommandModule {
        origin,
        descriptor: file.descriptor,
        handler,
        suggestion_handler,
        policy: file.policy,
    }
}
