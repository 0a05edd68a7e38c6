use std::sync::Arc;

use orumaiv_agent::{
    Agent, AgentResponse, ConversationContext, GeminiConnector, Interpretation, LlmConnector,
    NluAgent, NluConfig, TaskContext,
};
use orumaiv_core::config::{AppConfig, LoadOptions};
use orumaiv_core::observability::{CorrelationContext, InMemoryMetricsSink};
use serde::Serialize;
use tracing::warn;

use crate::commands::CommandResult;

const COMMAND: &str = "interpret";

#[derive(Clone, Debug, Default)]
pub struct InterpretRequest {
    pub text: String,
    pub task_title: Option<String>,
    pub task_description: Option<String>,
}

impl InterpretRequest {
    fn context(&self) -> Option<ConversationContext> {
        if self.task_title.is_none() && self.task_description.is_none() {
            return None;
        }
        Some(ConversationContext::with_task(TaskContext {
            title: self.task_title.clone(),
            description: self.task_description.clone(),
            ..TaskContext::default()
        }))
    }
}

#[derive(Debug, Serialize)]
struct InterpretOutcome {
    command: &'static str,
    status: &'static str,
    correlation_id: String,
    response: AgentResponse<Interpretation>,
}

pub fn run(request: InterpretRequest) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(COMMAND, "config_validation", error.to_string(), 2)
        }
    };

    let connector = Arc::new(GeminiConnector::new(config.llm.clone()));
    run_with_connector(&config, connector, request)
}

/// Runs one interpretation end to end: prepare, process, cleanup.
pub fn run_with_connector(
    config: &AppConfig,
    connector: Arc<dyn LlmConnector>,
    request: InterpretRequest,
) -> CommandResult {
    if request.text.trim().is_empty() {
        return CommandResult::failure(COMMAND, "invalid_input", "message text must not be empty", 2);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                1,
            )
        }
    };

    runtime.block_on(async {
        let agent = NluAgent::new(
            NluConfig::from_app_config(config),
            connector,
            Arc::new(InMemoryMetricsSink::new()),
        );
        if let Err(error) = agent.prepare().await {
            return CommandResult::failure(COMMAND, "agent_initialization", error.to_string(), 3);
        }

        let correlation = CorrelationContext::new();
        let context = request.context();
        let response = agent.process(&request.text, context.as_ref(), &correlation).await;
        let degraded = response.content.is_error();
        if let Err(error) = agent.cleanup().await {
            warn!(
                event_name = "cli.interpret.cleanup_failed",
                correlation_id = correlation.id(),
                error = %error,
                "agent cleanup failed"
            );
        }

        let outcome = InterpretOutcome {
            command: COMMAND,
            status: if degraded { "degraded" } else { "ok" },
            correlation_id: correlation.id().to_string(),
            response,
        };
        match serde_json::to_string_pretty(&outcome) {
            Ok(output) => CommandResult { exit_code: if degraded { 1 } else { 0 }, output },
            Err(error) => CommandResult::failure(COMMAND, "serialization", error.to_string(), 1),
        }
    })
}
