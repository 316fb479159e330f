use thiserror::Error;

/// Errors returned by a model service.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered 429.
    #[error("rate limited by model service (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Any other non-2xx status.
    #[error("model service returned status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// The response parsed but carried no completion text.
    #[error("model service returned no completion choices")]
    EmptyResponse,

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
}
