use painscout_llm::LlmError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    /// No balanced JSON object could be recovered from the text.
    #[error("no structured output found in model response")]
    NoStructuredOutputFound,

    /// A JSON object was recovered but does not have the expected shape.
    #[error("structured output has unexpected shape for {context}: {source}")]
    Shape {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("structured output for {0} contained no usable entries")]
    Empty(&'static str),
}

#[derive(Debug, Error)]
pub enum FinderError {
    #[error("topic must not be empty")]
    EmptyTopic,

    #[error("model service error: {0}")]
    Llm(#[from] LlmError),

    #[error("{service} call timed out after {timeout_ms} ms")]
    Timeout {
        service: &'static str,
        timeout_ms: u128,
    },

    /// The short rate-limit window is exhausted and has not reset yet.
    #[error("rate limit window exhausted; request not sent")]
    RateLimited,

    #[error(transparent)]
    Parse(#[from] ParseError),
}
