use async_trait::async_trait;
use serde_json::Value;

const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";

/// Injected Microsoft Graph sample fetcher.  The production implementation
/// issues authenticated GETs; tests substitute canned sample records.
#[async_trait]
pub trait GraphApi: Send + Sync {
    /// Fetch up to `top` sample records from a Graph endpoint such as `/users`.
    async fn fetch_samples(
        &self,
        token: &str,
        endpoint: &str,
        top: usize,
    ) -> Result<Vec<Value>, String>;
}

/// Microsoft Graph REST client.
pub struct GraphClient {
    http: reqwest::Client,
}

impl GraphClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl GraphApi for GraphClient {
    async fn fetch_samples(
        &self,
        token: &str,
        endpoint: &str,
        top: usize,
    ) -> Result<Vec<Value>, String> {
        let url = format!("{GRAPH_API_BASE}{endpoint}?$top={top}");

        tracing::debug!(endpoint, top, "Fetching Graph samples");

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| format!("Graph request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Graph returned {status}: {body}"));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| format!("Malformed Graph response: {e}"))?;

        // Collection endpoints wrap records in an OData `value` array;
        // singleton endpoints return the object directly.
        match body.get("value") {
            Some(Value::Array(items)) => Ok(items.clone()),
            _ => Ok(vec![body]),
        }
    }
}
