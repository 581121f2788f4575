// In-memory catalog that records every call made against it

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;

use super::{CatalogScope, RemoteCatalog, RemoteCommandRecord};
use crate::error::CatalogError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CatalogCall {
    List(CatalogScope),
    Create { scope: CatalogScope, name: String },
    Update { scope: CatalogScope, id: String, name: String },
    BulkReplace { scope: CatalogScope, count: usize },
    Clear(CatalogScope),
}

impl CatalogCall {
    /// True for calls that change remote state.
    pub fn is_write(&self) -> bool {
        !matches!(self, CatalogCall::List(_))
    }
}

/// Catalog held in process memory.
///
/// The global scope always exists; restricted targets exist only once added
/// with [`with_target`](InMemoryCatalog::with_target), mirroring a remote
/// service that does not know every deployment.
pub struct InMemoryCatalog {
    scopes: Mutex<HashMap<CatalogScope, Vec<RemoteCommandRecord>>>,
    calls: Mutex<Vec<CatalogCall>>,
    next_id: AtomicU64,
    unavailable: bool,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        let mut scopes = HashMap::new();
        scopes.insert(CatalogScope::Global, Vec::new());
        Self {
            scopes: Mutex::new(scopes),
            calls: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            unavailable: false,
        }
    }

    /// Every call fails with a transport error.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::new()
        }
    }

    pub fn with_target(self, target: impl Into<String>) -> Self {
        if let Ok(mut scopes) = self.scopes.lock() {
            scopes.insert(CatalogScope::Restricted(target.into()), Vec::new());
        }
        self
    }

    /// Seed a scope directly, bypassing the call log.
    pub fn seed(&self, scope: CatalogScope, descriptors: Vec<serde_json::Value>) {
        let records = descriptors
            .into_iter()
            .map(|d| self.make_record(d))
            .collect();
        if let Ok(mut scopes) = self.scopes.lock() {
            scopes.insert(scope, records);
        }
    }

    pub fn calls(&self) -> Vec<CatalogCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn write_calls(&self) -> Vec<CatalogCall> {
        self.calls().into_iter().filter(CatalogCall::is_write).collect()
    }

    pub fn clear_calls(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    /// Current records of `scope`, if the scope exists.
    pub fn records(&self, scope: &CatalogScope) -> Option<Vec<RemoteCommandRecord>> {
        self.scopes.lock().ok()?.get(scope).cloned()
    }

    fn make_record(&self, descriptor: serde_json::Value) -> RemoteCommandRecord {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        RemoteCommandRecord {
            id,
            name: descriptor_name(&descriptor),
            descriptor,
        }
    }

    fn record_call(&self, call: CatalogCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn with_scope<R>(
        &self,
        scope: &CatalogScope,
        f: impl FnOnce(&mut Vec<RemoteCommandRecord>) -> Result<R, CatalogError>,
    ) -> Result<R, CatalogError> {
        if self.unavailable {
            return Err(CatalogError::Transport("catalog unavailable".to_string()));
        }
        let mut scopes = self
            .scopes
            .lock()
            .map_err(|_| CatalogError::Transport("Failed to lock catalog".to_string()))?;
        let records = scopes
            .get_mut(scope)
            .ok_or_else(|| CatalogError::ScopeNotFound(scope.to_string()))?;
        f(records)
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn descriptor_name(descriptor: &serde_json::Value) -> String {
    descriptor
        .get("name")
        .and_then(|n| n.as_str())
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl RemoteCatalog for InMemoryCatalog {
    async fn list_entries(&self, scope: &CatalogScope) -> Result<Vec<RemoteCommandRecord>, CatalogError> {
        self.record_call(CatalogCall::List(scope.clone()));
        self.with_scope(scope, |records| Ok(records.clone()))
    }

    async fn create_entry(
        &self,
        scope: &CatalogScope,
        descriptor: &serde_json::Value,
    ) -> Result<RemoteCommandRecord, CatalogError> {
        let record = self.make_record(descriptor.clone());
        self.record_call(CatalogCall::Create {
            scope: scope.clone(),
            name: record.name.clone(),
        });
        self.with_scope(scope, |records| {
            // Names are unique per scope; creating an existing name overwrites it.
            records.retain(|r| r.name != record.name);
            records.push(record.clone());
            Ok(record)
        })
    }

    async fn update_entry(
        &self,
        scope: &CatalogScope,
        id: &str,
        descriptor: &serde_json::Value,
    ) -> Result<RemoteCommandRecord, CatalogError> {
        self.record_call(CatalogCall::Update {
            scope: scope.clone(),
            id: id.to_string(),
            name: descriptor_name(descriptor),
        });
        self.with_scope(scope, |records| {
            let record = records
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| CatalogError::Status {
                    status: 404,
                    body: format!("unknown command id {}", id),
                })?;
            record.name = descriptor_name(descriptor);
            record.descriptor = descriptor.clone();
            Ok(record.clone())
        })
    }

    async fn bulk_replace(
        &self,
        scope: &CatalogScope,
        descriptors: &[serde_json::Value],
    ) -> Result<Vec<RemoteCommandRecord>, CatalogError> {
        self.record_call(CatalogCall::BulkReplace {
            scope: scope.clone(),
            count: descriptors.len(),
        });
        let replacement: Vec<_> = descriptors
            .iter()
            .map(|d| self.make_record(d.clone()))
            .collect();
        self.with_scope(scope, |records| {
            *records = replacement.clone();
            Ok(replacement)
        })
    }

    async fn clear_entries(&self, scope: &CatalogScope) -> Result<(), CatalogError> {
        self.record_call(CatalogCall::Clear(scope.clone()));
        self.with_scope(scope, |records| {
            records.clear();
            Ok(())
        })
    }
}
