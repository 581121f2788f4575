//! Catalog synchronization
//!
//! Reconciles the local registry with the remote catalog. The global scope
//! receives every non-retired global definition; each restricted target
//! receives every non-retired restricted-scope definition.
//!
//! Incremental mode creates and updates but never deletes: a remote record
//! with no local counterpart is left alone, so a temporarily missing
//! definition does not vanish from the catalog. Removal is explicit through
//! [`CatalogSynchronizer::clear_all`].
//!
//! Scopes are processed one after another. A run is not re-entrant; callers
//! serialize runs.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::{CatalogScope, RemoteCatalog, RemoteCommandRecord};
use crate::command::{CommandDefinition, Registry, ScopePolicy};
use crate::error::{CatalogError, EngineResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Replace each scope wholesale
    Bulk,
    /// Diff per command: create missing, update drifted, skip the rest
    #[default]
    Incremental,
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bulk" => Ok(SyncMode::Bulk),
            "incremental" => Ok(SyncMode::Incremental),
            other => Err(format!("unknown sync mode '{}' (expected bulk or incremental)", other)),
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Bulk => write!(f, "bulk"),
            SyncMode::Incremental => write!(f, "incremental"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeReport {
    pub scope: CatalogScope,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub skipped: Vec<String>,
    /// Descriptor count sent in a bulk replace
    pub replaced: Option<usize>,
    pub cleared: bool,
    /// Restricted target unknown to the catalog; nothing was applied
    pub unreachable: bool,
}

impl ScopeReport {
    fn new(scope: CatalogScope) -> Self {
        Self {
            scope,
            created: Vec::new(),
            updated: Vec::new(),
            skipped: Vec::new(),
            replaced: None,
            cleared: false,
            unreachable: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub scopes: Vec<ScopeReport>,
}

impl SyncReport {
    pub fn scope(&self, scope: &CatalogScope) -> Option<&ScopeReport> {
        self.scopes.iter().find(|s| &s.scope == scope)
    }

    pub fn created(&self) -> usize {
        self.scopes.iter().map(|s| s.created.len()).sum()
    }

    pub fn updated(&self) -> usize {
        self.scopes.iter().map(|s| s.updated.len()).sum()
    }
}

/// Cheap drift signal between a local descriptor and a remote snapshot:
/// the description text or the number of options differs.
pub fn descriptor_drifted(local: &serde_json::Value, remote: &serde_json::Value) -> bool {
    fn description(v: &serde_json::Value) -> &str {
        v.get("description").and_then(|d| d.as_str()).unwrap_or_default()
    }
    fn option_count(v: &serde_json::Value) -> usize {
        v.get("options")
            .and_then(|o| o.as_array())
            .map_or(0, |o| o.len())
    }

    description(local) != description(remote) || option_count(local) != option_count(remote)
}

pub struct CatalogSynchronizer {
    catalog: Arc<dyn RemoteCatalog>,
    restricted_targets: Vec<String>,
}

impl CatalogSynchronizer {
    pub fn new(catalog: Arc<dyn RemoteCatalog>, restricted_targets: Vec<String>) -> Self {
        Self {
            catalog,
            restricted_targets,
        }
    }

    /// Scopes paired with the definitions each one should carry.
    fn plan(&self, registry: &Registry) -> Vec<(CatalogScope, Vec<Arc<CommandDefinition>>)> {
        let select = |policy: ScopePolicy| -> Vec<Arc<CommandDefinition>> {
            registry
                .definitions()
                .into_iter()
                .filter(|d| !d.policy.retired && d.policy.scope_policy == policy)
                .collect()
        };

        let mut plan = vec![(CatalogScope::Global, select(ScopePolicy::Global))];
        let restricted = select(ScopePolicy::RestrictedScope);
        for target in &self.restricted_targets {
            plan.push((CatalogScope::Restricted(target.clone()), restricted.clone()));
        }
        plan
    }

    pub async fn synchronize(&self, registry: &Registry, mode: SyncMode) -> EngineResult<SyncReport> {
        info!("[Sync] Starting {} synchronization", mode);
        let mut report = SyncReport::default();

        for (scope, definitions) in self.plan(registry) {
            let result = match mode {
                SyncMode::Bulk => self.replace_scope(&scope, &definitions).await,
                SyncMode::Incremental => self.diff_scope(&scope, &definitions).await,
            };
            report.scopes.push(skip_unreachable(scope, result)?);
        }

        info!(
            "[Sync] Finished: {} created, {} updated",
            report.created(),
            report.updated()
        );
        Ok(report)
    }

    /// Remove every remote record from every scope.
    pub async fn clear_all(&self) -> EngineResult<SyncReport> {
        let mut report = SyncReport::default();
        let mut scopes = vec![CatalogScope::Global];
        scopes.extend(
            self.restricted_targets
                .iter()
                .map(|t| CatalogScope::Restricted(t.clone())),
        );

        for scope in scopes {
            let result = self.catalog.clear_entries(&scope).await.map(|_| {
                info!("[Sync] Cleared {}", scope);
                let mut scope_report = ScopeReport::new(scope.clone());
                scope_report.cleared = true;
                scope_report
            });
            report.scopes.push(skip_unreachable(scope, result)?);
        }
        Ok(report)
    }

    async fn replace_scope(
        &self,
        scope: &CatalogScope,
        definitions: &[Arc<CommandDefinition>],
    ) -> Result<ScopeReport, CatalogError> {
        let descriptors: Vec<_> = definitions.iter().map(|d| d.descriptor.clone()).collect();
        self.catalog.bulk_replace(scope, &descriptors).await?;
        info!("[Sync] Replaced {} with {} command(s)", scope, descriptors.len());

        let mut scope_report = ScopeReport::new(scope.clone());
        scope_report.replaced = Some(descriptors.len());
        Ok(scope_report)
    }

    async fn diff_scope(
        &self,
        scope: &CatalogScope,
        definitions: &[Arc<CommandDefinition>],
    ) -> Result<ScopeReport, CatalogError> {
        let remote: HashMap<String, RemoteCommandRecord> = self
            .catalog
            .list_entries(scope)
            .await?
            .into_iter()
            .map(|r| (r.name.clone(), r))
            .collect();

        let mut scope_report = ScopeReport::new(scope.clone());
        for definition in definitions {
            match remote.get(&definition.name) {
                None => {
                    self.catalog.create_entry(scope, &definition.descriptor).await?;
                    info!("[Sync] Created /{} in {}", definition.name, scope);
                    scope_report.created.push(definition.name.clone());
                }
                Some(record) if descriptor_drifted(&definition.descriptor, &record.descriptor) => {
                    self.catalog
                        .update_entry(scope, &record.id, &definition.descriptor)
                        .await?;
                    info!("[Sync] Updated /{} in {}", definition.name, scope);
                    scope_report.updated.push(definition.name.clone());
                }
                Some(_) => {
                    debug!("[Sync] /{} unchanged in {}", definition.name, scope);
                    scope_report.skipped.push(definition.name.clone());
                }
            }
        }
        Ok(scope_report)
    }
}

/// An unknown restricted target is skipped with a warning; every other
/// failure propagates to the caller.
fn skip_unreachable(scope: CatalogScope, result: Result<ScopeReport, CatalogError>) -> EngineResult<ScopeReport> {
    match result {
        Ok(report) => Ok(report),
        Err(CatalogError::ScopeNotFound(_)) if matches!(scope, CatalogScope::Restricted(_)) => {
            warn!("[Sync] Skipping {}: target not found in catalog", scope);
            let mut report = ScopeReport::new(scope);
            report.unreachable = true;
            Ok(report)
        }
        Err(e) => Err(e.into()),
    }
}
