use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::auth::{TokenCache, GRAPH_SCOPE, LOG_ANALYTICS_SCOPE};
use crate::cache::{
    api_key, table_key, ApiSchema, ColumnSchema, PropertySchema, SchemaCache, SchemaEntry,
    TableSchema,
};
use crate::error::ToolError;
use crate::graph::GraphApi;
use crate::logs::{QueryEngine, ResultTable, DEFAULT_TIMESPAN};

/// Samples fetched per endpoint when the caller does not specify a count.
pub const DEFAULT_SAMPLE_SIZE: usize = 5;
/// Hard upper limit on samples fetched per endpoint.
pub const MAX_SAMPLE_SIZE: usize = 50;
/// Default number of rows returned by a test query.
pub const DEFAULT_MAX_ROWS: usize = 10;
/// Hard upper limit on rows returned by a test query.
pub const HARD_MAX_ROWS: usize = 100;

/// Result of an ad-hoc test query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
}

/// Result of an explicit schema refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResult {
    pub success: bool,
    pub refreshed_at: String,
}

/// Produces schemas for tables and endpoints, using the cache as a fast path.
///
/// All collaborators are injected at construction; there is no ambient state.
/// No operation retries: a failed remote call surfaces directly, and the
/// tool-dispatch layer decides whether to try again.  Concurrent calls for
/// the same key may both miss and both discover — `put` is a last-write-wins
/// replacement of an immutable value, so the worst case is a redundant remote
/// call, not a correctness violation.
pub struct SchemaDiscoveryService {
    tokens: TokenCache,
    cache: SchemaCache,
    engine: Arc<dyn QueryEngine>,
    graph: Arc<dyn GraphApi>,
}

impl SchemaDiscoveryService {
    pub fn new(
        tokens: TokenCache,
        cache: SchemaCache,
        engine: Arc<dyn QueryEngine>,
        graph: Arc<dyn GraphApi>,
    ) -> Self {
        Self {
            tokens,
            cache,
            engine,
            graph,
        }
    }

    /// Discover the column schema of a Log Analytics table.
    ///
    /// Cache hits are returned with `cached = true`; a miss runs the fixed
    /// `<table> | getschema` query and stores the shaped result.
    pub async fn discover_table_schema(
        &self,
        table_name: &str,
    ) -> Result<TableSchema, ToolError> {
        let key = table_key(table_name);
        if let Some(SchemaEntry::Table(mut schema)) = self.cache.get(&key) {
            schema.cached = true;
            return Ok(schema);
        }

        let token = self.tokens.get_token(&[LOG_ANALYTICS_SCOPE]).await?;
        let kql = format!("{table_name} | getschema");
        let response = self
            .engine
            .query(&token, &kql, DEFAULT_TIMESPAN)
            .await
            .map_err(|reason| ToolError::discovery(table_name, reason))?;

        let table = response
            .tables
            .first()
            .ok_or_else(|| ToolError::discovery(table_name, "query returned no result tables"))?;

        let schema = TableSchema {
            table_name: table_name.to_string(),
            columns: shape_getschema_rows(table),
            discovered_at: Utc::now().to_rfc3339(),
            cached: false,
        };

        self.cache.put(&key, SchemaEntry::Table(schema.clone()));
        Ok(schema)
    }

    /// Infer the property schema of a Graph-style endpoint from sample records.
    pub async fn discover_api_schema(
        &self,
        endpoint: &str,
        sample_size: usize,
    ) -> Result<ApiSchema, ToolError> {
        let key = api_key(endpoint);
        if let Some(SchemaEntry::Api(schema)) = self.cache.get(&key) {
            return Ok(schema);
        }

        let token = self.tokens.get_token(&[GRAPH_SCOPE]).await?;
        let samples = self
            .graph
            .fetch_samples(&token, endpoint, sample_size)
            .await
            .map_err(|reason| ToolError::discovery(endpoint, reason))?;

        if samples.is_empty() {
            return Err(ToolError::discovery(
                endpoint,
                "endpoint returned no sample records",
            ));
        }

        let schema = ApiSchema {
            endpoint: endpoint.to_string(),
            properties: infer_properties(&samples),
            discovered_at: Utc::now().to_rfc3339(),
        };

        self.cache.put(&key, SchemaEntry::Api(schema.clone()));
        Ok(schema)
    }

    /// Run an ad-hoc KQL query, bypassing the schema cache.
    ///
    /// A `take` clause is appended unless the query already limits itself.
    pub async fn test_query(
        &self,
        query: &str,
        max_rows: usize,
    ) -> Result<QueryResult, ToolError> {
        let lowered = query.to_lowercase();
        let effective = if lowered.contains("take") || lowered.contains("limit") {
            query.to_string()
        } else {
            format!("{query} | take {max_rows}")
        };

        let token = self.tokens.get_token(&[LOG_ANALYTICS_SCOPE]).await?;
        let response = self
            .engine
            .query(&token, &effective, DEFAULT_TIMESPAN)
            .await
            .map_err(ToolError::Query)?;

        let table = response
            .tables
            .first()
            .ok_or_else(|| ToolError::Query("query returned no result tables".into()))?;

        Ok(QueryResult {
            columns: table.columns.iter().map(|c| c.name.clone()).collect(),
            rows: table.rows.clone(),
            row_count: table.rows.len(),
        })
    }

    /// Invalidate a cached schema and eagerly re-discover it.
    ///
    /// Sources starting with `/` are treated as Graph endpoints, everything
    /// else as a table name.
    pub async fn refresh_schema(&self, source: &str) -> Result<RefreshResult, ToolError> {
        if source.starts_with('/') {
            self.cache.invalidate(&api_key(source));
            self.discover_api_schema(source, DEFAULT_SAMPLE_SIZE).await?;
        } else {
            self.cache.invalidate(&table_key(source));
            self.discover_table_schema(source).await?;
        }

        Ok(RefreshResult {
            success: true,
            refreshed_at: Utc::now().to_rfc3339(),
        })
    }

    /// List table names present in the workspace.
    ///
    /// Some workspaces reject the `union *` form; `search * | distinct $table`
    /// is the known alternative but produces a differently shaped result.
    /// The rejection surfaces as a normal query error.
    pub async fn list_tables(&self) -> Result<Vec<String>, ToolError> {
        let token = self.tokens.get_token(&[LOG_ANALYTICS_SCOPE]).await?;
        let response = self
            .engine
            .query(&token, "union * | distinct $table", DEFAULT_TIMESPAN)
            .await
            .map_err(ToolError::Query)?;

        let table = response
            .tables
            .first()
            .ok_or_else(|| ToolError::Query("query returned no result tables".into()))?;

        Ok(table
            .rows
            .iter()
            .filter_map(|row| row.first())
            .filter_map(|cell| cell.as_str().map(str::to_string))
            .collect())
    }
}

/// Shape a `getschema` result table into column records.
///
/// `getschema` returns one row per column with `ColumnName`, `ColumnOrdinal`,
/// `DataType` and `ColumnType` fields; when the ordinal column is missing or
/// unparseable the row index is used instead.
fn shape_getschema_rows(table: &ResultTable) -> Vec<ColumnSchema> {
    let index_of = |name: &str| {
        table
            .columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    };

    let name_idx = index_of("ColumnName").unwrap_or(0);
    let type_idx = index_of("ColumnType")
        .or_else(|| index_of("DataType"))
        .unwrap_or(1);
    let ordinal_idx = index_of("ColumnOrdinal");

    table
        .rows
        .iter()
        .enumerate()
        .map(|(row_index, row)| ColumnSchema {
            name: cell_as_string(row.get(name_idx)),
            column_type: cell_as_string(row.get(type_idx)),
            ordinal: ordinal_idx
                .and_then(|i| row.get(i))
                .and_then(cell_as_ordinal)
                .unwrap_or(row_index),
        })
        .collect()
}

fn cell_as_string(cell: Option<&Value>) -> String {
    match cell {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Ordinals arrive as numbers from some workspaces and strings from others.
fn cell_as_ordinal(cell: &Value) -> Option<usize> {
    cell.as_u64()
        .map(|n| n as usize)
        .or_else(|| cell.as_str()?.parse().ok())
}

/// Infer property types from sample records.
///
/// The type comes from the first sample holding a non-null value for the
/// property; `required` means every sample holds a non-null value for it.
fn infer_properties(samples: &[Value]) -> BTreeMap<String, PropertySchema> {
    let objects: Vec<&serde_json::Map<String, Value>> =
        samples.iter().filter_map(|s| s.as_object()).collect();

    let mut properties = BTreeMap::new();
    for object in &objects {
        for (name, value) in object.iter() {
            let entry = properties
                .entry(name.clone())
                .or_insert_with(|| PropertySchema {
                    property_type: "null".to_string(),
                    required: true,
                });
            if entry.property_type == "null" && !value.is_null() {
                entry.property_type = json_type_name(value).to_string();
            }
        }
    }

    for (name, property) in properties.iter_mut() {
        property.required = objects
            .iter()
            .all(|object| object.get(name).is_some_and(|v| !v.is_null()));
    }

    properties
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
