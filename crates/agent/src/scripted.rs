//! Deterministic model client that replays a fixed script of replies.
//!
//! Used by tests across the workspace in place of a live model.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::agent::AgentError;
use crate::llm::{GenerationOptions, LlmClient, LlmConnector, LlmError, ModelOutput};

/// Replays queued replies in order. Once the queue is drained, the fallback
/// reply (if any) is repeated; otherwise calls fail as unavailable.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Result<ModelOutput, LlmError>>>,
    fallback: Option<Result<ModelOutput, LlmError>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicU32,
}

impl ScriptedClient {
    pub fn new(replies: impl IntoIterator<Item = Result<ModelOutput, LlmError>>) -> Self {
        Self { replies: Mutex::new(replies.into_iter().collect()), ..Self::default() }
    }

    /// A client that answers every prompt with `text`.
    pub fn always(text: impl Into<String>) -> Self {
        Self { fallback: Some(Ok(ModelOutput::text(text))), ..Self::default() }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        match self.prompts.lock() {
            Ok(prompts) => prompts.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn next_reply(&self) -> Result<ModelOutput, LlmError> {
        let queued = match self.replies.lock() {
            Ok(mut replies) => replies.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        queued.or_else(|| self.fallback.clone()).unwrap_or_else(|| {
            Err(LlmError::ServiceUnavailable("scripted replies exhausted".to_string()))
        })
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn generate(
        &self,
        prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<ModelOutput, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.prompts.lock() {
            Ok(mut prompts) => prompts.push(prompt.to_owned()),
            Err(poisoned) => poisoned.into_inner().push(prompt.to_owned()),
        }
        self.next_reply()
    }
}

/// Hands out one shared [`ScriptedClient`], optionally after a delay or with
/// a forced failure.
#[derive(Debug)]
pub struct ScriptedConnector {
    client: Arc<ScriptedClient>,
    connect_delay: Duration,
    failure: Option<String>,
    connects: AtomicU32,
}

impl ScriptedConnector {
    pub fn new(client: Arc<ScriptedClient>) -> Self {
        Self { client, connect_delay: Duration::ZERO, failure: None, connects: AtomicU32::new(0) }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self { failure: Some(message.into()), ..Self::new(Arc::new(ScriptedClient::default())) }
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub fn client(&self) -> Arc<ScriptedClient> {
        Arc::clone(&self.client)
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmConnector for ScriptedConnector {
    async fn connect(&self) -> Result<Arc<dyn LlmClient>, AgentError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(AgentError::Initialization(message.clone()));
        }
        let client: Arc<dyn LlmClient> = self.client.clone();
        Ok(client)
    }
}
