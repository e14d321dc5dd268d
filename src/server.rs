use rmcp::{
    ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;

use crate::discovery::{
    SchemaDiscoveryService, DEFAULT_MAX_ROWS, DEFAULT_SAMPLE_SIZE, HARD_MAX_ROWS, MAX_SAMPLE_SIZE,
};
use crate::generate::{self, CodeFlavor};

// ---------------------------------------------------------------------------
// Tool parameter types
// ---------------------------------------------------------------------------

/// Parameters for `get_table_schema`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetTableSchemaParams {
    /// Log Analytics table name, e.g. `AppTraces` or `Heartbeat`.
    pub table_name: String,
}

/// Parameters for `get_api_schema`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetApiSchemaParams {
    /// Microsoft Graph endpoint path, e.g. `/users` or `/me/messages`.
    pub endpoint: String,
    /// Number of sample records used for inference (default: 5, maximum: 50).
    pub sample_size: Option<usize>,
}

/// Parameters for `test_query`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct TestQueryParams {
    /// KQL query text to execute.
    pub query: String,
    /// Maximum number of rows to return (default: 10, maximum: 100).
    pub max_rows: Option<usize>,
}

/// Parameters for `refresh_schema`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RefreshSchemaParams {
    /// Table name, or a Graph endpoint when it starts with `/`.
    pub source: String,
}

/// Parameters for `generate_code`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct GenerateCodeParams {
    /// Log Analytics table to generate code for.
    pub table_name: String,
    /// Output style: `react`, `node` or `inline`.
    pub flavor: CodeFlavor,
}

/// Parameters for `generate_query_examples`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct GenerateQueryExamplesParams {
    /// Log Analytics table to build example queries for.
    pub table_name: String,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// MCP server that exposes Log Analytics and Microsoft Graph schema
/// discovery as tools.
#[derive(Clone)]
pub struct LogAnalyticsMcpServer {
    service: Arc<SchemaDiscoveryService>,
    tool_router: ToolRouter<Self>,
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for LogAnalyticsMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .build(),
            server_info: Implementation {
                name: "loganalytics-mcp-server".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "This MCP server discovers real schemas from Azure Log \
                 Analytics tables and Microsoft Graph endpoints.  Call \
                 get_table_schema or get_api_schema before writing KQL or \
                 client code so you use actual column names and types \
                 instead of guessing.  Schemas are cached; use \
                 refresh_schema when a source has changed."
                    .into(),
            ),
        }
    }
}

#[tool_router]
impl LogAnalyticsMcpServer {
    // ------------------------------------------------------------------
    // Discovery tools
    // ------------------------------------------------------------------

    /// Discover the column schema of a Log Analytics table.
    ///
    /// Returns a JSON object with `columns` (name, type, ordinal) and a
    /// `cached` flag.
    #[tool(description = "Get the column schema (names, types, ordinals) of an \
                          Azure Log Analytics table.  Results are cached; the \
                          cached flag tells you whether this call hit the cache.")]
    async fn get_table_schema(
        &self,
        Parameters(params): Parameters<GetTableSchemaParams>,
    ) -> Result<String, String> {
        let schema = self
            .service
            .discover_table_schema(&params.table_name)
            .await
            .map_err(|e| e.to_string())?;

        serde_json::to_string(&schema).map_err(|e| e.to_string())
    }

    /// Infer the property schema of a Microsoft Graph endpoint from samples.
    #[tool(description = "Infer the property schema of a Microsoft Graph \
                          endpoint (e.g. /users) from sample records.  \
                          sample_size defaults to 5 (maximum 50).")]
    async fn get_api_schema(
        &self,
        Parameters(params): Parameters<GetApiSchemaParams>,
    ) -> Result<String, String> {
        let sample_size = params
            .sample_size
            .unwrap_or(DEFAULT_SAMPLE_SIZE)
            .min(MAX_SAMPLE_SIZE);

        let schema = self
            .service
            .discover_api_schema(&params.endpoint, sample_size)
            .await
            .map_err(|e| e.to_string())?;

        serde_json::to_string(&schema).map_err(|e| e.to_string())
    }

    /// List the table names present in the configured workspace.
    #[tool(description = "List table names in the Log Analytics workspace.  \
                          Note: some workspaces reject the underlying \
                          union-based query; the error is returned verbatim.")]
    async fn list_tables(&self) -> Result<String, String> {
        let tables = self
            .service
            .list_tables()
            .await
            .map_err(|e| e.to_string())?;

        serde_json::to_string(&tables).map_err(|e| e.to_string())
    }

    // ------------------------------------------------------------------
    // Query tools
    // ------------------------------------------------------------------

    /// Execute an ad-hoc KQL query, bypassing the schema cache.
    #[tool(description = "Execute a KQL query against the workspace and return \
                          columns and rows.  A take clause is appended unless \
                          the query already contains take or limit.  max_rows \
                          defaults to 10 (maximum 100).")]
    async fn test_query(
        &self,
        Parameters(params): Parameters<TestQueryParams>,
    ) -> Result<String, String> {
        let max_rows = params.max_rows.unwrap_or(DEFAULT_MAX_ROWS).min(HARD_MAX_ROWS);

        let result = self
            .service
            .test_query(&params.query, max_rows)
            .await
            .map_err(|e| e.to_string())?;

        serde_json::to_string(&result).map_err(|e| e.to_string())
    }

    /// Drop a cached schema and re-discover it immediately.
    #[tool(description = "Invalidate the cached schema for a table (or a Graph \
                          endpoint starting with /) and re-discover it from the \
                          live source.")]
    async fn refresh_schema(
        &self,
        Parameters(params): Parameters<RefreshSchemaParams>,
    ) -> Result<String, String> {
        let result = self
            .service
            .refresh_schema(&params.source)
            .await
            .map_err(|e| e.to_string())?;

        serde_json::to_string(&result).map_err(|e| e.to_string())
    }

    // ------------------------------------------------------------------
    // Generation tools
    // ------------------------------------------------------------------

    /// Generate source code that queries a table, using its real columns.
    #[tool(description = "Generate source code (react hook, node script, or \
                          inline KQL snippet) for querying a Log Analytics \
                          table, using its discovered column names and types.")]
    async fn generate_code(
        &self,
        Parameters(params): Parameters<GenerateCodeParams>,
    ) -> Result<String, String> {
        let schema = self
            .service
            .discover_table_schema(&params.table_name)
            .await
            .map_err(|e| e.to_string())?;

        Ok(generate::generate_code(&schema, params.flavor))
    }

    /// Generate example KQL queries tailored to a table's columns.
    #[tool(description = "Generate example KQL queries (take, count, time \
                          filter, group-by) tailored to a table's discovered \
                          columns.")]
    async fn generate_query_examples(
        &self,
        Parameters(params): Parameters<GenerateQueryExamplesParams>,
    ) -> Result<String, String> {
        let schema = self
            .service
            .discover_table_schema(&params.table_name)
            .await
            .map_err(|e| e.to_string())?;

        let examples = generate::generate_query_examples(&schema);
        serde_json::to_string(&examples).map_err(|e| e.to_string())
    }
}

impl LogAnalyticsMcpServer {
    /// Create a new server instance over an already-wired discovery service.
    pub fn new(service: SchemaDiscoveryService) -> Self {
        Self {
            service: Arc::new(service),
            tool_router: Self::tool_router(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{ClientSecretCredential, TokenCache};
    use crate::cache::SchemaCache;
    use crate::graph::GraphClient;
    use crate::logs::LogsClient;

    fn make_server(dir: &std::path::Path) -> LogAnalyticsMcpServer {
        let http = reqwest::Client::new();
        let credential = Arc::new(ClientSecretCredential::new(
            http.clone(),
            "tenant".into(),
            "client".into(),
            "secret".into(),
        ));
        let service = SchemaDiscoveryService::new(
            TokenCache::new(dir, credential),
            SchemaCache::new(&dir.join("schemas")),
            Arc::new(LogsClient::new(http.clone(), "workspace".into())),
            Arc::new(GraphClient::new(http)),
        );
        LogAnalyticsMcpServer::new(service)
    }

    #[test]
    fn server_info_contains_correct_name() {
        let dir = tempfile::tempdir().unwrap();
        let server = make_server(dir.path());
        let info = server.get_info();
        assert_eq!(info.server_info.name, "loganalytics-mcp-server");
    }

    #[test]
    fn server_info_has_tools_capability() {
        let dir = tempfile::tempdir().unwrap();
        let server = make_server(dir.path());
        let info = server.get_info();
        assert!(
            info.capabilities.tools.is_some(),
            "tools capability must be present"
        );
    }

    #[test]
    fn tool_router_lists_expected_tools() {
        let dir = tempfile::tempdir().unwrap();
        let server = make_server(dir.path());
        let tools = server.tool_router.list_all();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_ref()).collect();

        assert!(names.contains(&"get_table_schema"), "get_table_schema missing");
        assert!(names.contains(&"get_api_schema"), "get_api_schema missing");
        assert!(names.contains(&"list_tables"), "list_tables missing");
        assert!(names.contains(&"test_query"), "test_query missing");
        assert!(names.contains(&"refresh_schema"), "refresh_schema missing");
        assert!(names.contains(&"generate_code"), "generate_code missing");
        assert!(
            names.contains(&"generate_query_examples"),
            "generate_query_examples missing"
        );
    }
}
