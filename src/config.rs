use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Top-level server configuration assembled from environment variables at startup.
///
/// Required:
/// - `AZURE_TENANT_ID` — Azure AD tenant for token acquisition.
/// - `AZURE_CLIENT_ID` / `AZURE_CLIENT_SECRET` — app registration used for the
///   client-credentials grant.
/// - `LOG_ANALYTICS_WORKSPACE_ID` — workspace targeted by KQL discovery/query calls.
///
/// Optional:
/// - `TOKEN_CACHE_DIR` — where the persisted token lives (default `./.cache`).
/// - `SCHEMA_CACHE_DIR` — where discovered schemas live (default `./.cache/schemas`).
#[derive(Debug, Clone)]
pub struct Config {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub workspace_id: String,
    pub token_cache_dir: PathBuf,
    pub schema_cache_dir: PathBuf,
}

const DEFAULT_TOKEN_CACHE_DIR: &str = "./.cache";
const DEFAULT_SCHEMA_CACHE_DIR: &str = "./.cache/schemas";

impl Config {
    /// Build configuration from the current process environment.
    ///
    /// Missing required variables fail fast here; this is the only validation
    /// performed — values are not checked against Azure until first use.
    pub fn from_env() -> Result<Self> {
        let tenant_id = require("AZURE_TENANT_ID")?;
        let client_id = require("AZURE_CLIENT_ID")?;
        let client_secret = require("AZURE_CLIENT_SECRET")?;
        let workspace_id = require("LOG_ANALYTICS_WORKSPACE_ID")?;

        let token_cache_dir = env::var("TOKEN_CACHE_DIR")
            .unwrap_or_else(|_| DEFAULT_TOKEN_CACHE_DIR.to_string())
            .into();
        let schema_cache_dir = env::var("SCHEMA_CACHE_DIR")
            .unwrap_or_else(|_| DEFAULT_SCHEMA_CACHE_DIR.to_string())
            .into();

        tracing::info!(
            %workspace_id,
            "Configuration loaded — Log Analytics tools will be available"
        );

        Ok(Config {
            tenant_id,
            client_id,
            client_secret,
            workspace_id,
            token_cache_dir,
            schema_cache_dir,
        })
    }
}

fn require(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("Required environment variable {name} is not set"))
}
