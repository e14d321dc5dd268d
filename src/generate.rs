use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::cache::TableSchema;

/// Output style for generated source code.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CodeFlavor {
    /// React hook with a typed row interface.
    React,
    /// Node.js script using the Azure Monitor query SDK.
    Node,
    /// Bare KQL snippet with a column reference comment.
    Inline,
}

/// An example KQL query derived from a discovered schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryExample {
    pub description: String,
    pub query: String,
}

/// Render source code that queries the given table.  Pure string templating
/// over the discovered column names; no I/O, no state.
pub fn generate_code(schema: &TableSchema, flavor: CodeFlavor) -> String {
    match flavor {
        CodeFlavor::React => react_template(schema),
        CodeFlavor::Node => node_template(schema),
        CodeFlavor::Inline => inline_template(schema),
    }
}

fn react_template(schema: &TableSchema) -> String {
    let ident = pascal_ident(&schema.table_name);
    let fields = schema
        .columns
        .iter()
        .map(|c| format!("  {}: {};", c.name, ts_type(&c.column_type)))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "import {{ useEffect, useState }} from 'react';\n\
         \n\
         export interface {ident}Row {{\n\
         {fields}\n\
         }}\n\
         \n\
         export function use{ident}(query = '{table} | take 100') {{\n\
         \x20 const [rows, setRows] = useState<{ident}Row[]>([]);\n\
         \x20 const [error, setError] = useState<string | null>(null);\n\
         \n\
         \x20 useEffect(() => {{\n\
         \x20   fetch('/api/query', {{\n\
         \x20     method: 'POST',\n\
         \x20     headers: {{ 'Content-Type': 'application/json' }},\n\
         \x20     body: JSON.stringify({{ query }}),\n\
         \x20   }})\n\
         \x20     .then((res) => res.json())\n\
         \x20     .then((data) => setRows(data.rows))\n\
         \x20     .catch((err) => setError(String(err)));\n\
         \x20 }}, [query]);\n\
         \n\
         \x20 return {{ rows, error }};\n\
         }}\n",
        table = schema.table_name,
    )
}

fn node_template(schema: &TableSchema) -> String {
    let ident = pascal_ident(&schema.table_name);
    let projection = column_projection(schema);

    format!(
        "const {{ DefaultAzureCredential }} = require('@azure/identity');\n\
         const {{ LogsQueryClient }} = require('@azure/monitor-query');\n\
         \n\
         async function query{ident}(workspaceId) {{\n\
         \x20 const client = new LogsQueryClient(new DefaultAzureCredential());\n\
         \x20 const result = await client.queryWorkspace(\n\
         \x20   workspaceId,\n\
         \x20   '{table} | project {projection} | take 100',\n\
         \x20   {{ duration: 'P1D' }}\n\
         \x20 );\n\
         \x20 return result.tables[0].rows;\n\
         }}\n\
         \n\
         module.exports = {{ query{ident} }};\n",
        table = schema.table_name,
    )
}

fn inline_template(schema: &TableSchema) -> String {
    let reference = schema
        .columns
        .iter()
        .map(|c| format!("{} ({})", c.name, c.column_type))
        .collect::<Vec<_>>()
        .join(", ");
    let projection = column_projection(schema);

    format!(
        "// Columns of {table}: {reference}\n\
         const query = `{table}\n\
         | project {projection}\n\
         | take 100`;\n",
        table = schema.table_name,
    )
}

/// Build KQL examples tailored to the discovered columns.
pub fn generate_query_examples(schema: &TableSchema) -> Vec<QueryExample> {
    let table = &schema.table_name;
    let mut examples = vec![
        QueryExample {
            description: format!("First 10 rows of {table}"),
            query: format!("{table} | take 10"),
        },
        QueryExample {
            description: format!("Total row count of {table}"),
            query: format!("{table} | count"),
        },
    ];

    if let Some(time_column) = first_of_type(schema, "datetime") {
        examples.push(QueryExample {
            description: format!("Rows from the last hour by {time_column}"),
            query: format!("{table} | where {time_column} > ago(1h) | take 10"),
        });
    }

    if let Some(group_column) = first_of_type(schema, "string") {
        examples.push(QueryExample {
            description: format!("Row count grouped by {group_column}"),
            query: format!("{table} | summarize count() by {group_column}"),
        });
    }

    if !schema.columns.is_empty() {
        examples.push(QueryExample {
            description: "Selected columns only".to_string(),
            query: format!("{table} | project {} | take 10", column_projection(schema)),
        });
    }

    examples
}

fn first_of_type<'a>(schema: &'a TableSchema, column_type: &str) -> Option<&'a str> {
    schema
        .columns
        .iter()
        .find(|c| c.column_type == column_type)
        .map(|c| c.name.as_str())
}

/// Comma-separated projection over the first columns (capped to keep the
/// generated query readable).
fn column_projection(schema: &TableSchema) -> String {
    schema
        .columns
        .iter()
        .take(5)
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Map a KQL scalar type to its TypeScript counterpart.
fn ts_type(kql_type: &str) -> &'static str {
    match kql_type {
        "long" | "int" | "real" | "decimal" => "number",
        "bool" => "boolean",
        "dynamic" => "any",
        // datetime, timespan, guid and string all arrive as strings in JSON.
        _ => "string",
    }
}

/// Turn a table name into a PascalCase identifier safe for generated code.
fn pascal_ident(table_name: &str) -> String {
    let cleaned: String = table_name.chars().filter(|c| c.is_alphanumeric()).collect();
    let mut chars = cleaned.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() => first.to_uppercase().chain(chars).collect(),
        Some(first) => format!("T{first}{}", chars.collect::<String>()),
        None => "Table".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ColumnSchema;

    fn orders_schema() -> TableSchema {
        TableSchema {
            table_name: "Orders".into(),
            columns: vec![
                ColumnSchema {
                    name: "Id".into(),
                    column_type: "long".into(),
                    ordinal: 0,
                },
                ColumnSchema {
                    name: "PlacedAt".into(),
                    column_type: "datetime".into(),
                    ordinal: 1,
                },
                ColumnSchema {
                    name: "Status".into(),
                    column_type: "string".into(),
                    ordinal: 2,
                },
            ],
            discovered_at: "2026-01-01T00:00:00+00:00".into(),
            cached: false,
        }
    }

    #[test]
    fn react_flavor_emits_typed_interface() {
        let code = generate_code(&orders_schema(), CodeFlavor::React);
        assert!(code.contains("export interface OrdersRow"));
        assert!(code.contains("Id: number;"));
        assert!(code.contains("PlacedAt: string;"));
        assert!(code.contains("Status: string;"));
        assert!(code.contains("export function useOrders"));
    }

    #[test]
    fn node_flavor_projects_real_columns() {
        let code = generate_code(&orders_schema(), CodeFlavor::Node);
        assert!(code.contains("LogsQueryClient"));
        assert!(code.contains("Orders | project Id, PlacedAt, Status | take 100"));
    }

    #[test]
    fn inline_flavor_lists_column_types() {
        let code = generate_code(&orders_schema(), CodeFlavor::Inline);
        assert!(code.contains("Id (long)"));
        assert!(code.contains("PlacedAt (datetime)"));
        assert!(code.contains("| project Id, PlacedAt, Status"));
    }

    #[test]
    fn examples_use_datetime_and_string_columns() {
        let examples = generate_query_examples(&orders_schema());
        let queries: Vec<&str> = examples.iter().map(|e| e.query.as_str()).collect();

        assert!(queries.contains(&"Orders | take 10"));
        assert!(queries.contains(&"Orders | count"));
        assert!(queries.contains(&"Orders | where PlacedAt > ago(1h) | take 10"));
        assert!(queries.contains(&"Orders | summarize count() by Status"));
    }

    #[test]
    fn awkward_table_names_become_safe_identifiers() {
        assert_eq!(pascal_ident("container-logs"), "Containerlogs");
        assert_eq!(pascal_ident("3rdParty"), "T3rdParty");
        assert_eq!(pascal_ident(""), "Table");
    }
}
