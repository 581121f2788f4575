// HTTP catalog client
// Speaks the application-commands REST surface:
//   {base}/applications/{app}/commands                  (global scope)
//   {base}/applications/{app}/guilds/{target}/commands  (restricted targets)

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{CatalogScope, RemoteCatalog, RemoteCommandRecord};
use crate::error::CatalogError;

pub struct HttpCatalog {
    client: Client,
    base_url: Url,
    application_id: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireRecord {
    id: String,
    name: String,
}

impl HttpCatalog {
    pub fn new(base_url: &str, application_id: impl Into<String>, token: Option<String>) -> Result<Self, CatalogError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| CatalogError::Transport(format!("Invalid catalog base URL {}: {}", base_url, e)))?;
        Ok(Self {
            client: Client::new(),
            base_url,
            application_id: application_id.into(),
            token,
        })
    }

    pub fn scope_url(&self, scope: &CatalogScope) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        match scope {
            CatalogScope::Global => format!("{}/applications/{}/commands", base, self.application_id),
            CatalogScope::Restricted(target) => format!(
                "{}/applications/{}/guilds/{}/commands",
                base, self.application_id, target
            ),
        }
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.header("Authorization", format!("Bot {}", token)),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, CatalogError> {
        let resp = builder
            .send()
            .await
            .map_err(|e| CatalogError::Transport(format!("Catalog request failed: {}", e)))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(CatalogError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn decode_records(resp: reqwest::Response) -> Result<Vec<RemoteCommandRecord>, CatalogError> {
        let values: Vec<serde_json::Value> = resp
            .json()
            .await
            .map_err(|e| CatalogError::Decode(e.to_string()))?;
        values.into_iter().map(to_record).collect()
    }

    async fn decode_record(resp: reqwest::Response) -> Result<RemoteCommandRecord, CatalogError> {
        let value: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| CatalogError::Decode(e.to_string()))?;
        to_record(value)
    }
}

/// On a request addressing a whole restricted scope, 404/403 means the target
/// is gone or no longer accessible. Entry-level requests keep the raw status.
fn scope_error(scope: &CatalogScope, err: CatalogError) -> CatalogError {
    match err {
        CatalogError::Status { status: 403 | 404, .. } if matches!(scope, CatalogScope::Restricted(_)) => {
            CatalogError::ScopeNotFound(scope.to_string())
        }
        other => other,
    }
}

fn to_record(value: serde_json::Value) -> Result<RemoteCommandRecord, CatalogError> {
    let wire: WireRecord =
        serde_json::from_value(value.clone()).map_err(|e| CatalogError::Decode(e.to_string()))?;
    Ok(RemoteCommandRecord {
        id: wire.id,
        name: wire.name,
        descriptor: value,
    })
}

#[async_trait]
impl RemoteCatalog for HttpCatalog {
    async fn list_entries(&self, scope: &CatalogScope) -> Result<Vec<RemoteCommandRecord>, CatalogError> {
        let url = self.scope_url(scope);
        debug!("[Sync] GET {}", url);
        let resp = self
            .send(self.request(Method::GET, &url))
            .await
            .map_err(|e| scope_error(scope, e))?;
        Self::decode_records(resp).await
    }

    async fn create_entry(
        &self,
        scope: &CatalogScope,
        descriptor: &serde_json::Value,
    ) -> Result<RemoteCommandRecord, CatalogError> {
        let url = self.scope_url(scope);
        let resp = self
            .send(self.request(Method::POST, &url).json(descriptor))
            .await?;
        Self::decode_record(resp).await
    }

    async fn update_entry(
        &self,
        scope: &CatalogScope,
        id: &str,
        descriptor: &serde_json::Value,
    ) -> Result<RemoteCommandRecord, CatalogError> {
        let url = format!("{}/{}", self.scope_url(scope), id);
        let resp = self
            .send(self.request(Method::PATCH, &url).json(descriptor))
            .await?;
        Self::decode_record(resp).await
    }

    async fn bulk_replace(
        &self,
        scope: &CatalogScope,
        descriptors: &[serde_json::Value],
    ) -> Result<Vec<RemoteCommandRecord>, CatalogError> {
        let url = self.scope_url(scope);
        let resp = self
            .send(self.request(Method::PUT, &url).json(descriptors))
            .await
            .map_err(|e| scope_error(scope, e))?;
        Self::decode_records(resp).await
    }

    async fn clear_entries(&self, scope: &CatalogScope) -> Result<(), CatalogError> {
        self.bulk_replace(scope, &[]).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_urls() {
        let catalog = HttpCatalog::new("https://api.example.test/v10/", "42", None).unwrap();
        assert_eq!(
            catalog.scope_url(&CatalogScope::Global),
            "https://api.example.test/v10/applications/42/commands"
        );
        assert_eq!(
            catalog.scope_url(&CatalogScope::Restricted("777".to_string())),
            "https://api.example.test/v10/applications/42/guilds/777/commands"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(
            HttpCatalog::new("not a url", "42", None),
            Err(CatalogError::Transport(_))
        ));
    }

    #[test]
    fn only_restricted_not_found_means_missing_scope() {
        let status = |code| CatalogError::Status {
            status: code,
            body: String::new(),
        };
        let target = CatalogScope::Restricted("777".to_string());
        assert!(matches!(scope_error(&target, status(404)), CatalogError::ScopeNotFound(_)));
        assert!(matches!(scope_error(&target, status(403)), CatalogError::ScopeNotFound(_)));
        assert!(matches!(
            scope_error(&target, status(500)),
            CatalogError::Status { status: 500, .. }
        ));
        assert!(matches!(
            scope_error(&CatalogScope::Global, status(404)),
            CatalogError::Status { status: 404, .. }
        ));
    }

    #[test]
    fn record_keeps_full_descriptor_snapshot() {
        let record = to_record(serde_json::json!({
            "id": "9", "name": "ban", "description": "Ban a member", "options": []
        }))
        .unwrap();
        assert_eq!(record.id, "9");
        assert_eq!(record.descriptor["description"], "Ban a member");
    }
}
