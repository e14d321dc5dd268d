use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::ToolError;

/// OAuth scope for the Log Analytics query API.
pub const LOG_ANALYTICS_SCOPE: &str = "https://api.loganalytics.io/.default";
/// OAuth scope for Microsoft Graph.
pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// A token is considered "expiring soon" within this window of its expiry.
const EXPIRY_MARGIN_MS: i64 = 5 * 60 * 1000;

/// Filename of the persisted token inside the token cache directory.
const TOKEN_FILE: &str = "azure-token.json";

/// Result of a successful credential acquisition.
#[derive(Debug, Clone)]
pub struct AcquiredToken {
    pub token: String,
    pub expires_at_epoch_ms: i64,
}

/// Injected credential provider.
///
/// The production implementation talks to the Azure AD token endpoint; tests
/// substitute a counting mock.
#[async_trait]
pub trait CredentialAdapter: Send + Sync {
    async fn acquire(&self, scopes: &[&str]) -> Result<AcquiredToken, ToolError>;
}

/// Client-credentials grant against the Azure AD v2.0 token endpoint.
pub struct ClientSecretCredential {
    http: reqwest::Client,
    tenant_id: String,
    client_id: String,
    client_secret: String,
}

impl ClientSecretCredential {
    pub fn new(
        http: reqwest::Client,
        tenant_id: String,
        client_id: String,
        client_secret: String,
    ) -> Self {
        Self {
            http,
            tenant_id,
            client_id,
            client_secret,
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Lifetime in seconds from now.
    expires_in: i64,
}

#[async_trait]
impl CredentialAdapter for ClientSecretCredential {
    async fn acquire(&self, scopes: &[&str]) -> Result<AcquiredToken, ToolError> {
        let url = format!(
            "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
            self.tenant_id
        );
        let scope = scopes.join(" ");
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope.as_str()),
        ];

        let response = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| ToolError::Authentication(format!("token endpoint unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Authentication(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let parsed: TokenResponse = response.json().await.map_err(|e| {
            ToolError::Authentication(format!("malformed token response: {e}"))
        })?;

        if parsed.access_token.is_empty() {
            return Err(ToolError::Authentication(
                "token endpoint returned an empty token".into(),
            ));
        }

        Ok(AcquiredToken {
            token: parsed.access_token,
            expires_at_epoch_ms: now_ms() + parsed.expires_in * 1000,
        })
    }
}

/// A bearer token with its expiry, as persisted to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedToken {
    pub value: String,
    pub expires_at_epoch_ms: i64,
}

impl CachedToken {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at_epoch_ms <= now
    }
}

/// Serves a valid bearer token with minimal calls to the credential provider.
///
/// Holds at most one token: in memory for this process, mirrored to a JSON
/// file so a restarted process can adopt it without re-acquiring.  The token
/// is only ever replaced wholesale, never partially updated.  Disk I/O
/// failures are logged and swallowed — losing the persisted copy costs a
/// future re-acquisition, not correctness.
pub struct TokenCache {
    path: PathBuf,
    adapter: Arc<dyn CredentialAdapter>,
    current: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(token_cache_dir: &Path, adapter: Arc<dyn CredentialAdapter>) -> Self {
        Self {
            path: token_cache_dir.join(TOKEN_FILE),
            adapter,
            current: Mutex::new(None),
        }
    }

    /// Return a usable token: memory fast path, then disk, then acquisition.
    pub async fn get_token(&self, scopes: &[&str]) -> Result<String, ToolError> {
        if self.is_expiring_soon() {
            tracing::debug!("Cached token absent or expiring within five minutes");
        }

        let now = now_ms();

        if let Some(token) = self.unexpired_in_memory(now) {
            return Ok(token);
        }

        if let Some(cached) = self.load_from_disk() {
            if !cached.is_expired(now) {
                tracing::debug!("Adopted persisted token from disk");
                let value = cached.value.clone();
                *self.current.lock().unwrap() = Some(cached);
                return Ok(value);
            }
        }

        self.acquire_and_store(scopes).await
    }

    /// Discard memory and disk state, then acquire a fresh token.
    pub async fn force_refresh(&self, scopes: &[&str]) -> Result<String, ToolError> {
        self.current.lock().unwrap().take();
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to delete persisted token");
            }
        }
        self.get_token(scopes).await
    }

    /// True when no token is cached or the cached token expires within five minutes.
    pub fn is_expiring_soon(&self) -> bool {
        match self.current.lock().unwrap().as_ref() {
            Some(token) => token.expires_at_epoch_ms - now_ms() <= EXPIRY_MARGIN_MS,
            None => true,
        }
    }

    fn unexpired_in_memory(&self, now: i64) -> Option<String> {
        self.current
            .lock()
            .unwrap()
            .as_ref()
            .filter(|token| !token.is_expired(now))
            .map(|token| token.value.clone())
    }

    /// Read failures of any kind are treated as "no cached token".
    fn load_from_disk(&self) -> Option<CachedToken> {
        let bytes = std::fs::read(&self.path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring unreadable persisted token");
                None
            }
        }
    }

    async fn acquire_and_store(&self, scopes: &[&str]) -> Result<String, ToolError> {
        let acquired = self.adapter.acquire(scopes).await?;
        let token = CachedToken {
            value: acquired.token,
            expires_at_epoch_ms: acquired.expires_at_epoch_ms,
        };

        self.save_to_disk(&token);
        let value = token.value.clone();
        *self.current.lock().unwrap() = Some(token);
        Ok(value)
    }

    fn save_to_disk(&self, token: &CachedToken) {
        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(token)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            std::fs::write(&self.path, json)
        };
        if let Err(e) = write() {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to persist token");
        }
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counting adapter that hands out tokens with a configurable lifetime.
    struct MockCredential {
        calls: AtomicUsize,
        lifetime_ms: i64,
    }

    impl MockCredential {
        fn with_lifetime_ms(lifetime_ms: i64) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                lifetime_ms,
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CredentialAdapter for MockCredential {
        async fn acquire(&self, _scopes: &[&str]) -> Result<AcquiredToken, ToolError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(AcquiredToken {
                token: format!("tok-{n}"),
                expires_at_epoch_ms: now_ms() + self.lifetime_ms,
            })
        }
    }

    const HOUR_MS: i64 = 60 * 60 * 1000;

    #[tokio::test]
    async fn repeated_get_token_calls_adapter_once() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = MockCredential::with_lifetime_ms(HOUR_MS);
        let cache = TokenCache::new(dir.path(), adapter.clone());

        let first = cache.get_token(&[LOG_ANALYTICS_SCOPE]).await.unwrap();
        let second = cache.get_token(&[LOG_ANALYTICS_SCOPE]).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(adapter.call_count(), 1);
    }

    #[tokio::test]
    async fn expiring_soon_boundary_is_five_minutes() {
        let dir = tempfile::tempdir().unwrap();

        let four_min = MockCredential::with_lifetime_ms(4 * 60 * 1000);
        let cache = TokenCache::new(dir.path(), four_min);
        assert!(cache.is_expiring_soon(), "empty cache counts as expiring");
        cache.get_token(&[LOG_ANALYTICS_SCOPE]).await.unwrap();
        assert!(cache.is_expiring_soon(), "now+4min is within the window");

        let ten_min = MockCredential::with_lifetime_ms(10 * 60 * 1000);
        let cache = TokenCache::new(dir.path(), ten_min);
        cache.force_refresh(&[LOG_ANALYTICS_SCOPE]).await.unwrap();
        assert!(!cache.is_expiring_soon(), "now+10min is outside the window");
    }

    #[tokio::test]
    async fn force_refresh_discards_cached_token() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = MockCredential::with_lifetime_ms(HOUR_MS);
        let cache = TokenCache::new(dir.path(), adapter.clone());

        let first = cache.get_token(&[LOG_ANALYTICS_SCOPE]).await.unwrap();
        let refreshed = cache.force_refresh(&[LOG_ANALYTICS_SCOPE]).await.unwrap();

        assert_ne!(first, refreshed);
        assert_eq!(adapter.call_count(), 2);
    }

    #[tokio::test]
    async fn fresh_process_adopts_persisted_token() {
        let dir = tempfile::tempdir().unwrap();

        let first_adapter = MockCredential::with_lifetime_ms(HOUR_MS);
        let cache = TokenCache::new(dir.path(), first_adapter);
        let original = cache.get_token(&[LOG_ANALYTICS_SCOPE]).await.unwrap();

        // New TokenCache on the same directory simulates a restarted process.
        let second_adapter = MockCredential::with_lifetime_ms(HOUR_MS);
        let restarted = TokenCache::new(dir.path(), second_adapter.clone());
        let adopted = restarted.get_token(&[LOG_ANALYTICS_SCOPE]).await.unwrap();

        assert_eq!(original, adopted);
        assert_eq!(second_adapter.call_count(), 0);
    }

    #[tokio::test]
    async fn expired_persisted_token_triggers_acquisition() {
        let dir = tempfile::tempdir().unwrap();
        let stale = CachedToken {
            value: "stale".into(),
            expires_at_epoch_ms: now_ms() - 1_000,
        };
        std::fs::write(
            dir.path().join(TOKEN_FILE),
            serde_json::to_string(&stale).unwrap(),
        )
        .unwrap();

        let adapter = MockCredential::with_lifetime_ms(HOUR_MS);
        let cache = TokenCache::new(dir.path(), adapter.clone());
        let token = cache.get_token(&[LOG_ANALYTICS_SCOPE]).await.unwrap();

        assert_ne!(token, "stale");
        assert_eq!(adapter.call_count(), 1);
    }

    #[tokio::test]
    async fn corrupt_persisted_token_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TOKEN_FILE), b"{not json").unwrap();

        let adapter = MockCredential::with_lifetime_ms(HOUR_MS);
        let cache = TokenCache::new(dir.path(), adapter.clone());
        cache.get_token(&[LOG_ANALYTICS_SCOPE]).await.unwrap();

        assert_eq!(adapter.call_count(), 1);
    }
}
