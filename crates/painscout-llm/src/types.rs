use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One prompt for a model service.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    /// Ask the service to ground its answer in live web/social search.
    pub web_search: bool,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    /// A plain classification-style request: no web search, low temperature.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            web_search: false,
            max_tokens: 2_000,
            temperature: 0.2,
        }
    }

    #[must_use]
    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    #[must_use]
    pub fn web_search(mut self, enabled: bool) -> Self {
        self.web_search = enabled;
        self
    }

    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Free-text answer plus whatever rate-limit state the service reported.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub rate_limit: Option<RateLimitSnapshot>,
}

/// Self-reported short-window rate limit of a model service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: Option<DateTime<Utc>>,
}

// Wire types for the OpenAI-compatible chat completions API.

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub(crate) model: &'a str,
    pub(crate) messages: Vec<ChatMessage<'a>>,
    pub(crate) temperature: f32,
    pub(crate) max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) search_parameters: Option<SearchParameters>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage<'a> {
    pub(crate) role: &'static str,
    pub(crate) content: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct SearchParameters {
    pub(crate) mode: &'static str,
    pub(crate) sources: Vec<SearchSource>,
    pub(crate) max_search_results: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct SearchSource {
    #[serde(rename = "type")]
    pub(crate) kind: &'static str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub(crate) choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    pub(crate) message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoiceMessage {
    #[serde(default)]
    pub(crate) content: Option<String>,
}
