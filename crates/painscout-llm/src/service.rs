use async_trait::async_trait;

use crate::error::LlmError;
use crate::types::{Completion, CompletionRequest};

/// A language-model service: prompt in, free text out, fallible.
///
/// The text is expected (not guaranteed) to contain a JSON object; callers
/// parse it with their own tolerance for truncation and malformed output.
#[async_trait]
pub trait ModelService: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError>;
}
