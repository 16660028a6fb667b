//! # Builder for PreloadConfig
//!
//! Fluent API for creating and customizing [`PreloadConfig`] instances.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use preload_engine::{PreloadConfig, ServerEndpoint};
//!
//! let config = PreloadConfig::builder()
//!     .with_primary_url("http://127.0.0.1:8090")
//!     .with_secondary_url("http://192.168.1.5:8090")
//!     .with_endpoint(ServerEndpoint::Secondary)
//!     .with_stats_timeout(Duration::from_secs(2))
//!     .build();
//!
//! assert_eq!(config.server_address(), "http://192.168.1.5:8090");
//! ```

use std::time::Duration;

use crate::config::{PreloadConfig, ServerEndpoint};

/// Builder for creating PreloadConfig instances with a fluent API
#[derive(Debug, Clone)]
pub struct PreloadConfigBuilder {
    /// Internal config being built
    config: PreloadConfig,
}

impl PreloadConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: PreloadConfig::default(),
        }
    }

    /// Enable or disable playback interception
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// Set the primary cache server address
    pub fn with_primary_url(mut self, url: impl Into<String>) -> Self {
        self.config.primary_url = url.into();
        self
    }

    /// Set the alternate cache server address
    pub fn with_secondary_url(mut self, url: impl Into<String>) -> Self {
        self.config.secondary_url = url.into();
        self
    }

    /// Select which stored endpoint is active
    pub fn with_endpoint(mut self, endpoint: ServerEndpoint) -> Self {
        self.config.endpoint = endpoint;
        self
    }

    /// Set the timeout for the preload trigger request
    pub fn with_trigger_timeout(mut self, timeout: Duration) -> Self {
        self.config.trigger_timeout = timeout;
        self
    }

    /// Set the timeout for the buffering statistics request
    pub fn with_stats_timeout(mut self, timeout: Duration) -> Self {
        self.config.stats_timeout = timeout;
        self
    }

    /// Build the PreloadConfig instance
    pub fn build(self) -> PreloadConfig {
        self.config
    }
}

impl Default for PreloadConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
