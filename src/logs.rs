use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default bounded time window for discovery queries (ISO 8601 duration).
pub const DEFAULT_TIMESPAN: &str = "P1D";

const LOG_ANALYTICS_API_BASE: &str = "https://api.loganalytics.io/v1";

/// One column descriptor in a Log Analytics result table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
}

/// One result table: column descriptors plus row-major cell values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    #[serde(default)]
    pub name: String,
    pub columns: Vec<ResultColumn>,
    pub rows: Vec<Vec<Value>>,
}

/// Response body of the Log Analytics query API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub tables: Vec<ResultTable>,
}

/// Injected remote query engine.  The production implementation calls the
/// Log Analytics REST API; tests substitute canned responses.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Run a KQL query over the given ISO 8601 timespan.  A non-success
    /// response is an error; retry policy is left to the caller's caller.
    async fn query(&self, token: &str, kql: &str, timespan: &str)
        -> Result<QueryResponse, String>;
}

/// Log Analytics REST client bound to a single workspace.
pub struct LogsClient {
    http: reqwest::Client,
    workspace_id: String,
}

impl LogsClient {
    pub fn new(http: reqwest::Client, workspace_id: String) -> Self {
        Self { http, workspace_id }
    }
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    timespan: &'a str,
}

#[async_trait]
impl QueryEngine for LogsClient {
    async fn query(
        &self,
        token: &str,
        kql: &str,
        timespan: &str,
    ) -> Result<QueryResponse, String> {
        let url = format!(
            "{LOG_ANALYTICS_API_BASE}/workspaces/{}/query",
            self.workspace_id
        );

        tracing::debug!(kql, timespan, "Executing Log Analytics query");

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&QueryRequest {
                query: kql,
                timespan,
            })
            .send()
            .await
            .map_err(|e| format!("Log Analytics request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Log Analytics returned {status}: {body}"));
        }

        response
            .json::<QueryResponse>()
            .await
            .map_err(|e| format!("Malformed Log Analytics response: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_deserializes_from_api_wire_shape() {
        let body = json!({
            "tables": [{
                "name": "PrimaryResult",
                "columns": [
                    {"name": "ColumnName", "type": "string"},
                    {"name": "ColumnType", "type": "string"}
                ],
                "rows": [["TimeGenerated", "datetime"], ["Message", "string"]]
            }]
        });

        let parsed: QueryResponse = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.tables.len(), 1);
        assert_eq!(parsed.tables[0].columns[0].name, "ColumnName");
        assert_eq!(parsed.tables[0].rows[1][0], json!("Message"));
    }
}
