//! Natural-language understanding agent.
//!
//! One `process` call renders a prompt, asks the model with retry, and turns
//! whatever comes back into an [`Interpretation`]. Model and parsing failures
//! never escape: they become the `error` or `unknown` payloads.

pub mod confidence;
pub mod interpretation;
pub mod parse;
pub mod prompt;

use std::sync::Arc;

use async_trait::async_trait;
use orumaiv_core::config::AppConfig;
use orumaiv_core::observability::{labels, record_span, timed, CorrelationContext, MetricsSink};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::agent::{Agent, AgentCore, AgentError, AgentResponse};
use crate::context::ConversationContext;
use crate::llm::{GenerationOptions, LlmClient, LlmConnector, ModelOutput, ModelTool};
use crate::retry::RetryPolicy;

pub use interpretation::{Entity, Interpretation, INTENT_ERROR, INTENT_UNKNOWN};

pub const AGENT_KIND: &str = "NLUAgent";
pub const DEFAULT_AGENT_NAME: &str = "nlu_agent";

#[derive(Clone, Debug, PartialEq)]
pub struct NluConfig {
    pub name: Option<String>,
    pub generation: GenerationOptions,
    pub retry: RetryPolicy,
}

impl Default for NluConfig {
    fn default() -> Self {
        Self {
            name: Some(DEFAULT_AGENT_NAME.to_string()),
            generation: GenerationOptions::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl NluConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        let tools = if config.llm.search_grounding { vec![ModelTool::GoogleSearch] } else { Vec::new() };
        Self {
            name: Some(DEFAULT_AGENT_NAME.to_string()),
            generation: GenerationOptions { temperature: config.llm.temperature, tools },
            retry: RetryPolicy::from(&config.retry),
        }
    }
}

pub struct NluAgent {
    core: AgentCore,
    config: NluConfig,
    connector: Arc<dyn LlmConnector>,
    metrics_sink: Arc<dyn MetricsSink>,
    client: RwLock<Option<Arc<dyn LlmClient>>>,
}

impl NluAgent {
    pub fn new(
        config: NluConfig,
        connector: Arc<dyn LlmConnector>,
        metrics_sink: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            core: AgentCore::new(AGENT_KIND, config.name.clone()),
            config,
            connector,
            metrics_sink,
            client: RwLock::new(None),
        }
    }

    pub async fn is_prepared(&self) -> bool {
        self.client.read().await.is_some()
    }

    /// Returns the live client, connecting at most once even under
    /// concurrent first calls.
    async fn client(&self) -> Result<Arc<dyn LlmClient>, AgentError> {
        if let Some(client) = self.client.read().await.as_ref() {
            return Ok(Arc::clone(client));
        }

        let mut slot = self.client.write().await;
        if let Some(client) = slot.as_ref() {
            return Ok(Arc::clone(client));
        }

        info!(
            event_name = "agent.nlu.prepare.start",
            agent_id = %self.agent_id(),
            "connecting model client"
        );
        let client = self.connector.connect().await.map_err(|error| {
            error!(
                event_name = "agent.nlu.prepare.failed",
                agent_id = %self.agent_id(),
                error = %error,
                "model client initialization failed"
            );
            error
        })?;
        *slot = Some(Arc::clone(&client));
        info!(event_name = "agent.nlu.prepare.complete", agent_id = %self.agent_id(), "model client ready");
        Ok(client)
    }

    async fn interpret(&self, prompt: &str) -> Result<ModelOutput, AgentError> {
        let client = self.client().await?;
        let client: &dyn LlmClient = client.as_ref();
        let options = &self.config.generation;

        let output = self
            .config
            .retry
            .run(move |attempt| {
                debug!(event_name = "agent.model.attempt", attempt, "invoking model");
                client.generate(prompt, options)
            })
            .await?;
        Ok(output)
    }
}

fn response_metadata(interpretation: &Interpretation, text: &str, has_context: bool) -> Map<String, Value> {
    let mut metadata = Map::new();
    if interpretation.is_error() {
        metadata.insert("error".to_string(), Value::Bool(true));
        metadata.insert("original_text".to_string(), Value::String(text.to_owned()));
    } else {
        metadata.insert("original_text".to_string(), Value::String(text.to_owned()));
        metadata.insert("has_context".to_string(), Value::Bool(has_context));
    }
    metadata
}

#[async_trait]
impl Agent for NluAgent {
    type Content = Interpretation;

    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn prepare(&self) -> Result<(), AgentError> {
        self.client().await.map(|_| ())
    }

    async fn cleanup(&self) -> Result<(), AgentError> {
        let released = self.client.write().await.take().is_some();
        info!(
            event_name = "agent.nlu.cleanup",
            agent_id = %self.agent_id(),
            released,
            "model client released"
        );
        Ok(())
    }

    async fn process(
        &self,
        text: &str,
        context: Option<&ConversationContext>,
        correlation: &CorrelationContext,
    ) -> AgentResponse<Interpretation> {
        let started = Instant::now();
        let correlation_id = correlation.id();
        info!(
            event_name = "agent.nlu.process.start",
            correlation_id,
            agent_id = %self.agent_id(),
            text_chars = text.chars().count(),
            has_context = context.is_some(),
            "interpreting message"
        );

        let prompt = prompt::build_prompt(text, context);
        let outcome = record_span(
            "nlu_agent.process",
            correlation_id,
            timed(
                self.metrics_sink.as_ref(),
                "agent_processing",
                labels([("agent", "nlu"), ("function", "process")]),
                self.interpret(&prompt),
            ),
        )
        .await;

        let interpretation = match outcome {
            Ok(output) => parse::parse_output(&output),
            Err(error) => {
                error!(
                    event_name = "agent.nlu.process.failed",
                    correlation_id,
                    agent_id = %self.agent_id(),
                    error = %error,
                    "model invocation failed; returning degraded response"
                );
                Interpretation::error(error.to_string())
            }
        };

        let confidence = confidence::score(&interpretation);
        let metadata = response_metadata(&interpretation, text, context.is_some());
        self.core.metrics().record(!interpretation.is_error(), started.elapsed());

        info!(
            event_name = "agent.nlu.process.complete",
            correlation_id,
            agent_id = %self.agent_id(),
            intent = %interpretation.intent,
            entity_count = interpretation.entities.len(),
            confidence,
            "message interpreted"
        );

        AgentResponse::new(self.agent_id(), interpretation, confidence, metadata)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use orumaiv_core::config::AppConfig;
    use orumaiv_core::observability::{CorrelationContext, InMemoryMetricsSink, MetricsSink};
    use serde_json::json;
    use tokio::time::Instant;

    use super::{NluAgent, NluConfig};
    use crate::agent::{Agent, AgentError};
    use crate::context::{ConversationContext, TaskContext};
    use crate::llm::{LlmError, ModelOutput, ModelTool};
    use crate::scripted::{ScriptedClient, ScriptedConnector};

    fn agent_with(connector: ScriptedConnector) -> (NluAgent, Arc<ScriptedConnector>, InMemoryMetricsSink) {
        let connector = Arc::new(connector);
        let sink = InMemoryMetricsSink::new();
        let agent = NluAgent::new(NluConfig::default(), connector.clone(), Arc::new(sink.clone()));
        (agent, connector, sink)
    }

    fn scripted(replies: Vec<Result<ModelOutput, LlmError>>) -> ScriptedConnector {
        ScriptedConnector::new(Arc::new(ScriptedClient::new(replies)))
    }

    fn unavailable() -> Result<ModelOutput, LlmError> {
        Err(LlmError::ServiceUnavailable("overloaded".to_owned()))
    }

    #[test]
    fn config_follows_application_settings() {
        let mut app = AppConfig::default();
        app.llm.temperature = 0.4;
        app.llm.search_grounding = false;
        app.retry.max_attempts = 5;

        let config = NluConfig::from_app_config(&app);
        assert_eq!(config.name.as_deref(), Some("nlu_agent"));
        assert!((config.generation.temperature - 0.4).abs() < f32::EPSILON);
        assert!(config.generation.tools.is_empty());
        assert_eq!(config.retry.max_attempts, 5);

        assert_eq!(NluConfig::default().generation.tools, vec![ModelTool::GoogleSearch]);
    }

    #[tokio::test]
    async fn well_formed_reply_is_scored_and_annotated() {
        let reply = json!({
            "intent": "create_reminder",
            "entities": [{"name": "time", "value": "tomorrow 9am"}],
            "requires_task_info": true,
            "requires_user_history": false,
            "requires_external_info": false
        });
        let (agent, connector, _) = agent_with(scripted(vec![Ok(ModelOutput::text(reply.to_string()))]));

        let context = ConversationContext::with_task(TaskContext::with_id("task-7"));
        let response = agent.process("remind me tomorrow", Some(&context), &CorrelationContext::new()).await;

        assert_eq!(response.agent_id, "nlu_agent");
        assert_eq!(response.content.intent, "create_reminder");
        assert!((response.confidence - 1.0).abs() < 1e-9);
        assert_eq!(response.metadata["original_text"], "remind me tomorrow");
        assert_eq!(response.metadata["has_context"], true);
        assert_eq!(connector.client().calls(), 1);
        assert!(connector.client().prompts()[0].ends_with("USER TEXT: remind me tomorrow"));
    }

    #[tokio::test]
    async fn model_payload_with_extra_keys_is_returned_unchanged() {
        let reply = json!({
            "intent": "schedule_meeting",
            "entities": [
                {"name": "date", "value": "friday", "type": "date"},
                {"name": "attendees", "value": 4, "confidence": 0.8}
            ],
            "requires_task_info": false,
            "requires_user_history": false,
            "requires_external_info": true,
            "search_query": "team calendar",
            "language": "en"
        });
        let (agent, _, _) = agent_with(scripted(vec![Ok(ModelOutput::text(reply.to_string()))]));

        let response = agent.process("book a meeting friday", None, &CorrelationContext::new()).await;

        assert_eq!(serde_json::to_value(&response.content).expect("serialize"), reply);
        assert!((response.confidence - 1.0).abs() < 1e-9);
        assert_eq!(response.metadata["has_context"], false);
    }

    #[tokio::test]
    async fn null_entity_list_keeps_the_model_intent() {
        let reply = r#"{"intent": "greet", "entities": null, "requires_task_info": false,
            "requires_user_history": false, "requires_external_info": false}"#;
        let (agent, _, _) = agent_with(scripted(vec![Ok(ModelOutput::text(reply))]));

        let response = agent.process("hello", None, &CorrelationContext::new()).await;

        assert_eq!(response.content.intent, "greet");
        assert!((response.confidence - 0.7).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_with_backoff() {
        let (agent, connector, _) = agent_with(scripted(vec![
            unavailable(),
            Err(LlmError::DeadlineExceeded("slow".to_owned())),
            Ok(ModelOutput::text(r#"{"intent": "get_help"}"#)),
        ]));
        let started = Instant::now();

        let response = agent.process("help", None, &CorrelationContext::new()).await;

        assert_eq!(response.content.intent, "get_help");
        assert!((response.confidence - 0.7).abs() < 1e-9);
        assert_eq!(connector.client().calls(), 3);
        assert!(started.elapsed() >= Duration::from_secs(6));
        assert_eq!(agent.health_check().await.metrics.successful_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_degrade_to_error_payload() {
        let (agent, connector, sink) =
            agent_with(scripted(vec![unavailable(), unavailable(), unavailable()]));

        let response = agent.process("help", None, &CorrelationContext::new()).await;

        assert_eq!(response.content.intent, "error");
        assert!(response.content.error.is_some());
        assert_eq!(response.confidence, 0.0);
        assert_eq!(response.metadata["error"], true);
        assert_eq!(response.metadata["original_text"], "help");
        assert_eq!(connector.client().calls(), 3);

        let metrics = agent.health_check().await.metrics;
        assert_eq!(metrics.total_calls, 1);
        assert_eq!(metrics.failed_calls, 1);
        let errors = &sink.summary().errors["agent_processing"];
        assert_eq!(errors.len(), 1);
        assert_eq!(errors["agent:nlu_error:service_unavailable_function:process"], 1);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let (agent, connector, _) =
            agent_with(scripted(vec![Err(LlmError::Unauthenticated("bad key".to_owned()))]));

        let response = agent.process("hi", None, &CorrelationContext::new()).await;

        assert_eq!(response.content.intent, "error");
        assert_eq!(connector.client().calls(), 1);
    }

    #[tokio::test]
    async fn prose_wrapped_and_prose_only_replies() {
        let (agent, _, _) = agent_with(scripted(vec![
            Ok(ModelOutput::text("Here you go: {\"intent\": \"find_task\", \"entities\": []} done")),
            Ok(ModelOutput::text("no structure at all")),
        ]));
        let correlation = CorrelationContext::new();

        let wrapped = agent.process("find my task", None, &correlation).await;
        assert_eq!(wrapped.content.intent, "find_task");
        assert!((wrapped.confidence - 0.7).abs() < 1e-9);

        let prose = agent.process("???", None, &correlation).await;
        assert_eq!(prose.content.intent, "unknown");
        assert_eq!(prose.content.raw_response.as_deref(), Some("no structure at all"));
        assert!((prose.confidence - 0.3).abs() < 1e-9);
        assert_eq!(prose.metadata["has_context"], false);

        let metrics = agent.health_check().await.metrics;
        assert_eq!(metrics.total_calls, 2);
        assert_eq!(metrics.successful_calls, 2);
    }

    #[tokio::test]
    async fn reply_without_text_counts_as_failure() {
        let (agent, _, _) = agent_with(scripted(vec![Ok(ModelOutput { text: None })]));

        let response = agent.process("hi", None, &CorrelationContext::new()).await;

        assert_eq!(response.content.intent, "error");
        assert_eq!(response.confidence, 0.0);
        assert_eq!(agent.health_check().await.metrics.failed_calls, 1);
    }

    #[tokio::test]
    async fn success_counter_tracks_non_error_intents() {
        let (agent, _, _) = agent_with(scripted(vec![
            Ok(ModelOutput::text(r#"{"intent": "greet"}"#)),
            Err(LlmError::InvalidRequest("400: bad".to_owned())),
            Ok(ModelOutput::text("plain prose")),
        ]));
        let correlation = CorrelationContext::new();

        for text in ["hello", "again", "more"] {
            agent.process(text, None, &correlation).await;
        }

        let metrics = agent.health_check().await.metrics;
        assert_eq!(metrics.total_calls, 3);
        assert_eq!(metrics.successful_calls, 2);
        assert_eq!(metrics.failed_calls, 1);
        assert!(metrics.total_processing_time >= 0.0);
    }

    #[tokio::test]
    async fn failed_lazy_prepare_yields_degraded_response() {
        let (agent, connector, _) = agent_with(ScriptedConnector::failing("missing api key"));

        let response = agent.process("hi", None, &CorrelationContext::new()).await;

        assert_eq!(response.content.intent, "error");
        assert!(response.content.error.as_deref().unwrap_or_default().contains("missing api key"));
        assert!(!agent.is_prepared().await);
        assert_eq!(connector.connects(), 1);

        let direct = agent.prepare().await;
        assert!(matches!(direct, Err(AgentError::Initialization(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_first_calls_connect_once() {
        let connector = ScriptedConnector::new(Arc::new(ScriptedClient::always(r#"{"intent": "greet"}"#)))
            .with_connect_delay(Duration::from_millis(50));
        let (agent, connector, _) = agent_with(connector);
        let agent = Arc::new(agent);

        let mut handles = Vec::new();
        for index in 0..8 {
            let agent = Arc::clone(&agent);
            handles.push(tokio::spawn(async move {
                let correlation = CorrelationContext::with_id(format!("req-{index}"));
                agent.process("hello", None, &correlation).await
            }));
        }
        for handle in handles {
            let response = handle.await.expect("task should complete");
            assert_eq!(response.content.intent, "greet");
        }

        assert_eq!(connector.connects(), 1);
        assert_eq!(connector.client().calls(), 8);
        assert_eq!(agent.health_check().await.metrics.successful_calls, 8);
    }

    #[tokio::test]
    async fn prepare_is_idempotent_and_cleanup_releases_client() {
        let (agent, connector, _) =
            agent_with(ScriptedConnector::new(Arc::new(ScriptedClient::always(r#"{"intent": "greet"}"#))));

        agent.prepare().await.expect("first prepare");
        agent.prepare().await.expect("second prepare");
        assert_eq!(connector.connects(), 1);
        assert!(agent.is_prepared().await);

        agent.cleanup().await.expect("cleanup");
        assert!(!agent.is_prepared().await);

        agent.process("hello", None, &CorrelationContext::new()).await;
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test]
    async fn processing_time_is_recorded_in_sink() {
        let (agent, _, sink) = agent_with(scripted(vec![Ok(ModelOutput::text(r#"{"intent": "greet"}"#))]));

        agent.process("hello", None, &CorrelationContext::new()).await;

        let summary = sink.summary();
        let times = &summary.processing_times["agent_processing"]["agent:nlu_function:process"];
        assert_eq!(times.len(), 1);
    }
}
