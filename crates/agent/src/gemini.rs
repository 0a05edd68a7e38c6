//! Google Gemini `generateContent` client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use orumaiv_core::config::LlmConfig;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::agent::AgentError;
use crate::llm::{GenerationOptions, LlmClient, LlmConnector, LlmError, ModelOutput, ModelTool};

const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiClient {
    http: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig) -> Result<Self, AgentError> {
        let api_key = config.api_key().ok_or_else(|| {
            AgentError::Initialization(
                "llm.api_key is required (set ORUMAIV_LLM_API_KEY or GOOGLE_API_KEY)".to_string(),
            )
        })?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| {
                AgentError::Initialization(format!("failed to build http client: {error}"))
            })?;

        Ok(Self {
            http,
            api_key: SecretString::from(api_key.to_owned()),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.trim_start_matches("models/").to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn model_url(&self) -> String {
        format!("{}/v1beta/models/{}", self.base_url, self.model)
    }

    /// Resolves the configured model, failing when it does not exist or the
    /// key is rejected.
    pub async fn verify_model(&self) -> Result<(), LlmError> {
        let response = self
            .http
            .get(self.model_url())
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(map_status(status, upstream_message(&body)))
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<ModelOutput, LlmError> {
        let url = format!("{}:generateContent", self.model_url());
        let response = self
            .http
            .post(url)
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .json(&request_body(prompt, options))
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, upstream_message(&body)));
        }

        let payload: GenerateContentResponse =
            response.json().await.map_err(|error| LlmError::Decode(error.to_string()))?;
        Ok(ModelOutput { text: payload.into_text() })
    }
}

/// Builds a [`GeminiClient`] from configuration and checks the model exists.
pub struct GeminiConnector {
    config: LlmConfig,
}

impl GeminiConnector {
    pub fn new(config: LlmConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LlmConnector for GeminiConnector {
    async fn connect(&self) -> Result<Arc<dyn LlmClient>, AgentError> {
        let client = GeminiClient::new(&self.config)?;
        client.verify_model().await.map_err(|error| {
            error!(
                event_name = "agent.model.verify_failed",
                model = %client.model(),
                error = %error,
                "could not resolve configured model"
            );
            AgentError::Initialization(format!("model `{}` unavailable: {error}", client.model()))
        })?;

        info!(event_name = "agent.model.connected", model = %client.model(), "gemini client ready");
        Ok(Arc::new(client))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
}

fn request_body(prompt: &str, options: &GenerationOptions) -> Value {
    let mut body = json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        "generationConfig": GenerationConfig { temperature: options.temperature },
    });

    let tools: Vec<Value> = options
        .tools
        .iter()
        .map(|tool| match tool {
            ModelTool::GoogleSearch => json!({ "google_search": {} }),
        })
        .collect();
    if !tools.is_empty() {
        body["tools"] = Value::Array(tools);
    }

    body
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateContentResponse {
    fn into_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let texts: Vec<String> = content.parts.into_iter().filter_map(|part| part.text).collect();
        if texts.is_empty() {
            None
        } else {
            Some(texts.concat())
        }
    }
}

fn map_transport_error(error: reqwest::Error) -> LlmError {
    if error.is_timeout() {
        LlmError::DeadlineExceeded(error.to_string())
    } else if error.is_connect() {
        LlmError::ServiceUnavailable(error.to_string())
    } else {
        LlmError::Transport(error.to_string())
    }
}

fn map_status(status: StatusCode, message: String) -> LlmError {
    match status.as_u16() {
        503 => LlmError::ServiceUnavailable(message),
        504 | 408 => LlmError::DeadlineExceeded(message),
        429 => LlmError::RateLimited(message),
        401 | 403 => LlmError::Unauthenticated(message),
        code if status.is_client_error() => LlmError::InvalidRequest(format!("{code}: {message}")),
        code => LlmError::Upstream { status: code, message },
    }
}

fn upstream_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value["error"]["message"].as_str().map(str::to_owned))
        .unwrap_or_else(|| body.chars().take(200).collect())
}
