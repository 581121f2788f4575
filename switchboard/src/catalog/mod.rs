//! Remote command catalog
//!
//! The catalog is the authoritative list of command descriptors an external
//! surface shows to users. It is partitioned into scopes: one global scope
//! and any number of restricted targets.

pub mod http;
pub mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

pub use http::HttpCatalog;
pub use memory::{CatalogCall, InMemoryCatalog};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogScope {
    Global,
    Restricted(String),
}

impl fmt::Display for CatalogScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogScope::Global => write!(f, "global"),
            CatalogScope::Restricted(target) => write!(f, "restricted:{}", target),
        }
    }
}

/// The catalog's view of one registered command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCommandRecord {
    pub id: String,
    pub name: String,
    pub descriptor: serde_json::Value,
}

#[async_trait]
pub trait RemoteCatalog: Send + Sync {
    async fn list_entries(&self, scope: &CatalogScope) -> Result<Vec<RemoteCommandRecord>, CatalogError>;

    async fn create_entry(
        &self,
        scope: &CatalogScope,
        descriptor: &serde_json::Value,
    ) -> Result<RemoteCommandRecord, CatalogError>;

    async fn update_entry(
        &self,
        scope: &CatalogScope,
        id: &str,
        descriptor: &serde_json::Value,
    ) -> Result<RemoteCommandRecord, CatalogError>;

    /// Atomically replace the whole scope with `descriptors`.
    async fn bulk_replace(
        &self,
        scope: &CatalogScope,
        descriptors: &[serde_json::Value],
    ) -> Result<Vec<RemoteCommandRecord>, CatalogError>;

    async fn clear_entries(&self, scope: &CatalogScope) -> Result<(), CatalogError>;
}
