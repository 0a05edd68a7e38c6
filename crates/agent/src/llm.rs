use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use orumaiv_core::observability::ErrorCategory;
use thiserror::Error;

use crate::agent::AgentError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("model service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("model deadline exceeded: {0}")]
    DeadlineExceeded(String),
    #[error("model rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("model credentials rejected: {0}")]
    Unauthenticated(String),
    #[error("model rejected the request: {0}")]
    InvalidRequest(String),
    #[error("model returned status {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("model transport failed: {0}")]
    Transport(String),
    #[error("model response could not be decoded: {0}")]
    Decode(String),
}

impl LlmError {
    /// Only outages and deadlines are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ServiceUnavailable(_) | Self::DeadlineExceeded(_))
    }
}

impl ErrorCategory for LlmError {
    fn category(&self) -> &'static str {
        match self {
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::DeadlineExceeded(_) => "deadline_exceeded",
            Self::RateLimited(_) => "rate_limited",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Upstream { .. } => "upstream",
            Self::Transport(_) => "transport",
            Self::Decode(_) => "decode",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTool {
    GoogleSearch,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub tools: Vec<ModelTool>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self { temperature: 0.1, tools: vec![ModelTool::GoogleSearch] }
    }
}

/// Raw model output; `text` is `None` when the reply carried no text part.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelOutput {
    pub text: Option<String>,
}

impl ModelOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()) }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<ModelOutput, LlmError>;
}

/// Produces a live client; called once per agent lifetime by `prepare`.
#[async_trait]
pub trait LlmConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn LlmClient>, AgentError>;
}
