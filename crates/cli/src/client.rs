//! API client for communicating with a cpuset-verifier agent

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;
use verifier_lib::{NodeAuditReport, ResourceAmounts};

/// API client for the verifier agent
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid agent URL")?;

        Ok(Self { client, base_url })
    }

    /// Build an agent URL from path segments, percent-encoding each one
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Agent URL cannot be a base: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|err| err.error)
                .unwrap_or(body);
            anyhow::bail!("API error ({}): {}", status, message);
        }

        response.json().await.context("Failed to parse response")
    }

    /// Available resources on a node
    pub async fn node_available(&self, node: &str) -> Result<NodeAvailable> {
        let url = self.endpoint(&["api", "v1", "nodes", node, "available"])?;
        self.get(url).await
    }

    /// Audit a node, overriding the agent's defaults where given
    pub async fn node_audit(&self, node: &str, query: &AuditQuery) -> Result<NodeAuditReport> {
        let mut url = self.endpoint(&["api", "v1", "nodes", node, "audit"])?;
        let params = query.to_query_string();
        if !params.is_empty() {
            url.set_query(Some(&params));
        }
        self.get(url).await
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeAvailable {
    pub node: String,
    pub available: ResourceAmounts,
    pub overcommitted: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditQuery {
    pub ratio: Option<f64>,
    pub physical_cores: Option<u32>,
    pub skip_strategy: bool,
}

impl AuditQuery {
    fn to_query_string(&self) -> String {
        let mut params = Vec::new();
        if let Some(ratio) = self.ratio {
            params.push(format!("ratio={}", ratio));
        }
        if let Some(cores) = self.physical_cores {
            params.push(format!("physical_cores={}", cores));
        }
        if self.skip_strategy {
            params.push("skip_strategy=true".to_string());
        }
        params.join("&")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(dead_code)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
