use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use orumaiv_agent::{Agent, GeminiConnector, LlmConnector, NluAgent, NluConfig};
use orumaiv_core::config::{AppConfig, ConfigError, LoadOptions};
use orumaiv_core::errors::ApplicationError;
use orumaiv_core::observability::{InMemoryMetricsSink, MetricsSink};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{chat, health};

/// Everything a request handler needs; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub nlu_agent: Arc<NluAgent>,
    pub metrics: Arc<dyn MetricsSink>,
}

impl AppState {
    pub fn new(config: AppConfig, connector: Arc<dyn LlmConnector>) -> Self {
        let metrics: Arc<dyn MetricsSink> = Arc::new(InMemoryMetricsSink::new());
        let nlu_agent =
            Arc::new(NluAgent::new(NluConfig::from_app_config(&config), connector, Arc::clone(&metrics)));
        Self { config: Arc::new(config), nlu_agent, metrics }
    }
}

pub struct Application {
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Application(#[from] ApplicationError),
}

impl Application {
    pub fn config(&self) -> &AppConfig {
        &self.state.config
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Releases agent resources, bounded by `server.graceful_shutdown_secs`.
    pub async fn shutdown(&self) {
        let limit = Duration::from_secs(self.config().server.graceful_shutdown_secs);
        match tokio::time::timeout(limit, self.state.nlu_agent.cleanup()).await {
            Ok(Ok(())) => info!(
                event_name = "system.shutdown.agents_released",
                correlation_id = "shutdown",
                "agent resources released"
            ),
            Ok(Err(error)) => error!(
                event_name = "system.shutdown.cleanup_failed",
                correlation_id = "shutdown",
                error = %error,
                "agent cleanup failed"
            ),
            Err(_) => warn!(
                event_name = "system.shutdown.cleanup_timeout",
                correlation_id = "shutdown",
                timeout_secs = limit.as_secs(),
                "agent cleanup did not finish in time"
            ),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let chat_path = format!("{}/chat/message", state.config.server.api_prefix.trim_end_matches('/'));
    Router::new().merge(health::routes()).merge(chat::routes(&chat_path)).with_state(state)
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let connector = Arc::new(GeminiConnector::new(config.llm.clone()));
    bootstrap_with_connector(config, connector).await
}

/// Builds the application and prepares every agent; a failed `prepare`
/// aborts startup.
pub async fn bootstrap_with_connector(
    config: AppConfig,
    connector: Arc<dyn LlmConnector>,
) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        environment = config.server.environment(),
        model = %config.llm.model,
        "starting application bootstrap"
    );

    let state = AppState::new(config, connector);
    state
        .nlu_agent
        .prepare()
        .await
        .map_err(|error| ApplicationError::Initialization(error.to_string()))?;

    info!(
        event_name = "system.bootstrap.agents_ready",
        correlation_id = "bootstrap",
        agent_id = %state.nlu_agent.agent_id(),
        "agents prepared"
    );

    Ok(Application { state })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use orumaiv_agent::scripted::{ScriptedClient, ScriptedConnector};
    use orumaiv_core::config::{AppConfig, ConfigOverrides, LoadOptions};
    use orumaiv_core::errors::ApplicationError;

    use crate::bootstrap::{bootstrap, bootstrap_with_connector, BootstrapError};

    #[tokio::test]
    async fn bootstrap_fails_fast_when_agent_cannot_prepare() {
        let connector = Arc::new(ScriptedConnector::failing("llm.api_key is required"));

        let result = bootstrap_with_connector(AppConfig::default(), connector).await;

        let error = result.err().expect("bootstrap should fail");
        assert!(matches!(error, BootstrapError::Application(ApplicationError::Initialization(_))));
        assert!(error.to_string().contains("llm.api_key"));
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_invalid_configuration() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides { llm_model: Some("   ".to_string()), ..ConfigOverrides::default() },
            ..LoadOptions::default()
        })
        .await;

        assert!(matches!(result, Err(BootstrapError::Config(_))));
    }

    #[tokio::test]
    async fn bootstrap_prepares_agent_and_shutdown_releases_it() {
        let connector = Arc::new(ScriptedConnector::new(Arc::new(ScriptedClient::always("{}"))));

        let app = bootstrap_with_connector(AppConfig::default(), connector.clone())
            .await
            .expect("bootstrap should succeed with a scripted model");

        assert!(app.state.nlu_agent.is_prepared().await);
        assert_eq!(connector.connects(), 1);

        app.shutdown().await;
        assert!(!app.state.nlu_agent.is_prepared().await);
    }
}
