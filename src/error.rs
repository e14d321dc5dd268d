use thiserror::Error;

/// Errors surfaced by the discovery/auth layers to the tool-dispatch boundary.
///
/// Configuration problems are handled separately with `anyhow` at startup and
/// are fatal.  Cache corruption never appears here: a corrupt or missing disk
/// cache file is treated as a plain miss.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Credential acquisition failed (token endpoint error, malformed
    /// response, or a response with no token in it).
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// A remote schema-discovery call failed or returned an empty result.
    #[error("schema discovery failed for {target}: {reason}")]
    Discovery { target: String, reason: String },

    /// An ad-hoc test query failed.
    #[error("query failed: {0}")]
    Query(String),
}

impl ToolError {
    pub fn discovery(target: impl Into<String>, reason: impl Into<String>) -> Self {
        ToolError::Discovery {
            target: target.into(),
            reason: reason.into(),
        }
    }
}
