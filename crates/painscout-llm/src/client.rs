//! HTTP client for OpenAI-compatible chat completion APIs.
//!
//! Wraps `reqwest` with status mapping and rate-limit header capture. Each
//! `complete` is exactly one HTTP request; callers own retries so every
//! attempt is metered. Web search is requested through the
//! `search_parameters` extension understood by search-augmented providers.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode, Url};

use crate::error::LlmError;
use crate::rate_limit::parse_rate_limit;
use crate::service::ModelService;
use crate::types::{
    ChatMessage, ChatRequest, ChatResponse, Completion, CompletionRequest, SearchParameters,
    SearchSource,
};

/// Upper bound on web results the service may ground one answer in.
const MAX_SEARCH_RESULTS: u32 = 25;

/// Client for one model on one chat-completions endpoint.
///
/// Use [`ChatClient::new`] for production or point `base_url` at a mock server
/// in tests.
pub struct ChatClient {
    client: Client,
    api_key: String,
    endpoint: Url,
    model: String,
}

impl ChatClient {
    /// Creates a client for `model` at `base_url` (e.g. `https://api.x.ai/v1`).
    ///
    /// `timeout_secs` bounds each HTTP attempt; callers bound the whole call.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Http`] if the underlying `reqwest::Client` cannot be
    /// constructed, or [`LlmError::InvalidBaseUrl`] if `base_url` does not parse.
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        timeout_secs: u64,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("painscout/0.1 (pain-signal-discovery)")
            .build()?;

        // Normalise to exactly one trailing slash so `join` appends rather than
        // replacing the last path segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let endpoint = Url::parse(&normalised)
            .and_then(|base| base.join("chat/completions"))
            .map_err(|e| LlmError::InvalidBaseUrl(format!("'{base_url}': {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.to_owned(),
            endpoint,
            model: model.to_owned(),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn build_body<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let search_parameters = request.web_search.then(|| SearchParameters {
            mode: "on",
            sources: vec![SearchSource { kind: "x" }],
            max_search_results: MAX_SEARCH_RESULTS,
        });

        ChatRequest {
            model: &self.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            search_parameters,
        }
    }

    /// One HTTP attempt: send, map status, decode.
    async fn send(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let body = self.build_body(request);
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let rate_limit = parse_rate_limit(response.headers(), Utc::now());

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(LlmError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::UnexpectedStatus {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let raw = response.text().await?;
        let parsed: ChatResponse =
            serde_json::from_str(&raw).map_err(|e| LlmError::Deserialize {
                context: format!("chat completion from {}", self.model),
                source: e,
            })?;

        let text = parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)?;

        Ok(Completion { text, rate_limit })
    }
}

#[async_trait]
impl ModelService for ChatClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        tracing::debug!(
            model = %self.model,
            web_search = request.web_search,
            prompt_chars = request.prompt.len(),
            "sending completion request"
        );
        self.send(request).await
    }
}
