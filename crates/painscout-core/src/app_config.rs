use std::path::PathBuf;

/// Connection settings for one model service endpoint.
#[derive(Clone)]
pub struct ServiceConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("api_key", &"[redacted]")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Web-search-augmented model used for candidate and reply discovery.
    pub search: ServiceConfig,
    /// Fast model used for keyword derivation and pain classification.
    pub classify: ServiceConfig,
    pub max_retries: u32,
    pub retry_backoff_base_ms: u64,
    pub monthly_budget: u64,
    pub window_limit: u32,
    pub audiences_path: Option<PathBuf>,
    pub log_level: String,
}
