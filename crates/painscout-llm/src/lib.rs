//! Model-service plumbing for painscout.
//!
//! Defines the [`ModelService`] contract (prompt in, free text out, fallible),
//! an OpenAI-compatible HTTP implementation in [`ChatClient`], and the
//! process-wide [`BudgetGovernor`] that every outbound call reports to.

pub mod client;
pub mod error;
pub mod governor;
pub mod rate_limit;
pub mod retry;
pub mod service;
pub mod types;

pub use client::ChatClient;
pub use error::LlmError;
pub use governor::{BudgetGovernor, BudgetStatus, FINDER_RUN_COST};
pub use retry::{is_retriable, Backoff};
pub use service::ModelService;
pub use types::{Completion, CompletionRequest, RateLimitSnapshot};
