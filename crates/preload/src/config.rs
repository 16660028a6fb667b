use std::time::Duration;

/// Which of the two stored cache server endpoints requests go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerEndpoint {
    #[default]
    Primary,
    Secondary,
}

/// Configurable options for the preload engine
#[derive(Debug, Clone)]
pub struct PreloadConfig {
    /// Whether playback requests are intercepted at all
    pub enabled: bool,

    /// Primary cache server address, e.g. "http://127.0.0.1:8090"
    pub primary_url: String,

    /// Alternate cache server address
    pub secondary_url: String,

    /// Which stored endpoint is active
    pub endpoint: ServerEndpoint,

    /// Timeout for the preload trigger request. The trigger is allowed to
    /// run for as long as the server may need to buffer.
    pub trigger_timeout: Duration,

    /// Timeout for the buffering statistics request
    pub stats_timeout: Duration,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            primary_url: String::new(),
            secondary_url: String::new(),
            endpoint: ServerEndpoint::default(),
            trigger_timeout: Duration::from_secs(1800),
            stats_timeout: Duration::from_secs(2),
        }
    }
}

impl PreloadConfig {
    pub fn builder() -> crate::builder::PreloadConfigBuilder {
        crate::builder::PreloadConfigBuilder::new()
    }

    /// Address of the currently selected cache server endpoint
    pub fn server_address(&self) -> &str {
        match self.endpoint {
            ServerEndpoint::Primary => &self.primary_url,
            ServerEndpoint::Secondary => &self.secondary_url,
        }
    }
}
