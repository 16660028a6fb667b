use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rustls::{ClientConfig, crypto::ring};
use rustls_platform_verifier::BuilderVerifierExt;
use std::sync::Arc;
use tracing::debug;

use crate::config::PreloadConfig;
use crate::error::PreloadError;
use crate::stats::{CacheRequest, CacheResponse, TorrentStats};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Create a reqwest Client for talking to the cache server.
///
/// Timeouts are applied per request rather than on the client, since the
/// trigger and statistics requests differ by three orders of magnitude.
pub fn create_client() -> Result<Client, PreloadError> {
    // Create the crypto provider
    let provider = Arc::new(ring::default_provider());

    // Build platform default TLS configuration
    let tls_config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .expect("Failed to configure default TLS protocol versions")
        .with_platform_verifier()
        .unwrap()
        .with_no_client_auth();

    Client::builder()
        .pool_max_idle_per_host(5)
        .user_agent(DEFAULT_USER_AGENT)
        .use_preconfigured_tls(tls_config)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(PreloadError::from)
}

/// Network boundary of the negotiation: one trigger call, one statistics
/// call. Implementations own the timeout policy for both.
#[async_trait]
pub trait CacheTransport: Send + Sync {
    /// Ask the server to begin buffering the stream. Returns once the server
    /// answers or the timeout elapses; the response body is irrelevant.
    async fn trigger(&self, url: &str) -> Result<(), PreloadError>;

    /// Fetch buffering statistics for a content hash. `Ok(None)` means the
    /// server answered without a torrent payload.
    async fn fetch_stats(
        &self,
        cache_url: &str,
        hash: &str,
    ) -> Result<Option<TorrentStats>, PreloadError>;
}

/// HTTP transport against a live cache server
pub struct HttpCacheClient {
    client: Client,
    trigger_timeout: Duration,
    stats_timeout: Duration,
}

impl HttpCacheClient {
    pub fn new(client: Client, config: &PreloadConfig) -> Self {
        Self {
            client,
            trigger_timeout: config.trigger_timeout,
            stats_timeout: config.stats_timeout,
        }
    }
}

#[async_trait]
impl CacheTransport for HttpCacheClient {
    async fn trigger(&self, url: &str) -> Result<(), PreloadError> {
        let response = self
            .client
            .get(url)
            .timeout(self.trigger_timeout)
            .send()
            .await?;

        debug!(status = %response.status(), "preload trigger answered");
        Ok(())
    }

    async fn fetch_stats(
        &self,
        cache_url: &str,
        hash: &str,
    ) -> Result<Option<TorrentStats>, PreloadError> {
        let response = self
            .client
            .post(cache_url)
            .timeout(self.stats_timeout)
            .json(&CacheRequest::get(hash))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PreloadError::StatusCode(response.status()));
        }

        let payload = response.json::<CacheResponse>().await?;
        Ok(payload.torrent)
    }
}
