//! HTTP client for the graph service.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use tessera_core::{
    defaults, AdditiveUpdate, CreateEntityRequest, EntityRef, Error, GraphEntity, GraphStore,
    Result,
};

/// Configuration for the graph service client.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `GRAPH_API_KEY` | none | Bearer token (optional) |
/// | `GRAPH_TIMEOUT_SECS` | `30` | Request timeout |
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Graph service base URL. Usually taken from the job request.
    pub api_base: String,
    /// Bearer token, if the deployment requires one.
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl GraphConfig {
    /// Config for the given base URL, with key and timeout from environment.
    pub fn for_base(api_base: impl Into<String>) -> Self {
        let timeout_secs = std::env::var("GRAPH_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::GRAPH_TIMEOUT_SECS);

        Self {
            api_base: api_base.into(),
            api_key: std::env::var("GRAPH_API_KEY").ok(),
            timeout_secs,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    entities: Vec<EntityRef>,
}

#[derive(Debug, Deserialize)]
struct UpdatesAccepted {
    #[serde(default)]
    accepted: usize,
}

#[derive(Debug, serde::Serialize)]
struct UpdatesBody<'a> {
    updates: &'a [AdditiveUpdate],
}

/// Graph service HTTP client.
pub struct GraphClient {
    client: Client,
    config: GraphConfig,
}

impl GraphClient {
    /// Create a client for the given configuration.
    pub fn new(config: GraphConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// Create a client for the given base URL with env-derived settings.
    pub fn for_base(api_base: impl Into<String>) -> Result<Self> {
        Self::new(GraphConfig::for_base(api_base))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.api_key {
            Some(ref key) => builder.header("Authorization", format!("Bearer {}", key)),
            None => builder,
        }
    }

    /// Map a non-success response to a [`Error::Graph`] with status and body.
    async fn graph_error(context: &str, response: reqwest::Response) -> Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Error::Graph(format!("{}: HTTP {}: {}", context, status, body))
    }
}

#[async_trait]
impl GraphStore for GraphClient {
    async fn fetch_entity(&self, id: &str) -> Result<GraphEntity> {
        let url = self.url(&format!("/entities/{}", id));
        let response = self
            .authorize(self.client.get(&url))
            .query(&[("expand", "relationships:preview")])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::EntityNotFound(id.to_string()));
        }
        if !response.status().is_success() {
            return Err(Self::graph_error("fetch_entity", response).await);
        }
        Ok(response.json().await?)
    }

    async fn fetch_content(&self, id: &str, key: &str) -> Result<String> {
        let url = self.url(&format!("/entities/{}/content", id));
        let response = self
            .authorize(self.client.get(&url))
            .query(&[("key", key)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::graph_error("fetch_content", response).await);
        }
        Ok(response.text().await?)
    }

    async fn lookup_entities(
        &self,
        collection: &str,
        label: &str,
        entity_type: &str,
        limit: usize,
    ) -> Result<Vec<EntityRef>> {
        let url = self.url(&format!("/collections/{}/entities/lookup", collection));
        let response = self
            .authorize(self.client.get(&url))
            .query(&[
                ("label", label),
                ("type", entity_type),
                ("limit", &limit.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::graph_error("lookup_entities", response).await);
        }
        let parsed: LookupResponse = response.json().await?;
        Ok(parsed.entities)
    }

    async fn create_entity(&self, req: &CreateEntityRequest) -> Result<EntityRef> {
        let url = self.url("/entities");
        let response = self.authorize(self.client.post(&url)).json(req).send().await?;

        if !response.status().is_success() {
            return Err(Self::graph_error("create_entity", response).await);
        }
        Ok(response.json().await?)
    }

    async fn delete_entity(&self, id: &str) -> Result<()> {
        let url = self.url(&format!("/entities/{}", id));
        let response = self.authorize(self.client.delete(&url)).send().await?;

        if !response.status().is_success() {
            return Err(Self::graph_error("delete_entity", response).await);
        }
        Ok(())
    }

    async fn post_additive_updates(&self, updates: &[AdditiveUpdate]) -> Result<usize> {
        let url = self.url("/updates/additive");
        let response = self
            .authorize(self.client.post(&url))
            .json(&UpdatesBody { updates })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::graph_error("post_additive_updates", response).await);
        }
        let parsed: UpdatesAccepted = response.json().await?;
        debug!(accepted = parsed.accepted, "Additive update batch accepted");
        Ok(parsed.accepted)
    }
}
