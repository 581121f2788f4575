//! Startup wiring
//!
//! [`Engine::load_all`] builds the registry and the validation pipeline from
//! their manifests, then binds them to a dispatcher and a synchronizer. The
//! registry is immutable once loaded and shared by every concurrent event.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::catalog::RemoteCatalog;
use crate::command::Registry;
use crate::config::SwitchboardConfig;
use crate::dispatch::{DispatchOutcome, Dispatcher, InboundEvent};
use crate::error::EngineResult;
use crate::loader::{load_commands, CommandModule, LoadReport, Manifest};
use crate::permissions::PermissionGate;
use crate::sync::{CatalogSynchronizer, SyncMode, SyncReport};
use crate::validation::{load_rules, RuleModule};

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub developer_ids: Vec<String>,
    pub developer_groups: Vec<String>,
    pub restricted_targets: Vec<String>,
    pub dispatch_retired: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            developer_ids: Vec::new(),
            developer_groups: Vec::new(),
            restricted_targets: Vec::new(),
            dispatch_retired: true,
        }
    }
}

impl From<&SwitchboardConfig> for EngineOptions {
    fn from(config: &SwitchboardConfig) -> Self {
        Self {
            developer_ids: config.access.developer_ids.clone(),
            developer_groups: config.access.developer_groups.clone(),
            restricted_targets: config.catalog.restricted_targets.clone(),
            dispatch_retired: config.dispatch.dispatch_retired,
        }
    }
}

pub struct Engine {
    dispatcher: Dispatcher,
    synchronizer: CatalogSynchronizer,
    // Synchronization runs are not re-entrant
    sync_guard: Mutex<()>,
}

impl Engine {
    /// Load commands and rules, then wire them to `catalog`. Rule modules
    /// that fail to load are appended to the report's skipped list.
    pub fn load_all(
        options: EngineOptions,
        commands: Manifest<CommandModule>,
        rules: Manifest<RuleModule>,
        catalog: Arc<dyn RemoteCatalog>,
    ) -> (Self, LoadReport) {
        let (registry, mut report) = load_commands(commands);
        let (pipeline, skipped_rules) = load_rules(rules);
        report.skipped.extend(skipped_rules);

        let gate = PermissionGate::new(options.developer_ids, options.developer_groups);
        let dispatcher = Dispatcher::new(Arc::new(registry), pipeline, gate)
            .with_dispatch_retired(options.dispatch_retired);
        let synchronizer = CatalogSynchronizer::new(catalog, options.restricted_targets);

        info!(
            "[Engine] Ready with {} command(s)",
            dispatcher.registry().len()
        );
        (
            Self {
                dispatcher,
                synchronizer,
                sync_guard: Mutex::new(()),
            },
            report,
        )
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.dispatcher.registry()
    }

    pub async fn handle_event(&self, event: InboundEvent) -> DispatchOutcome {
        self.dispatcher.handle_event(event).await
    }

    pub async fn synchronize(&self, mode: SyncMode) -> EngineResult<SyncReport> {
        let _guard = self.sync_guard.lock().await;
        self.synchronizer.synchronize(self.registry(), mode).await
    }

    pub async fn clear_all(&self) -> EngineResult<SyncReport> {
        let _guard = self.sync_guard.lock().await;
        self.synchronizer.clear_all().await
    }
}
