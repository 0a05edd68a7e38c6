use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orumaiv_core::observability::{CorrelationContext, ErrorCategory};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

use crate::context::ConversationContext;
use crate::llm::LlmError;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent initialization failed: {0}")]
    Initialization(String),
    #[error(transparent)]
    Model(#[from] LlmError),
}

impl ErrorCategory for AgentError {
    fn category(&self) -> &'static str {
        match self {
            Self::Initialization(_) => "initialization",
            Self::Model(error) => error.category(),
        }
    }
}

/// Call counters shared by every concurrent `process` on one agent.
#[derive(Debug, Default)]
pub struct AgentMetrics {
    total_calls: AtomicU64,
    successful_calls: AtomicU64,
    failed_calls: AtomicU64,
    total_processing_micros: AtomicU64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    /// Seconds.
    pub total_processing_time: f64,
}

impl AgentMetrics {
    pub fn record(&self, success: bool, elapsed: Duration) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_calls.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_calls.fetch_add(1, Ordering::Relaxed);
        }
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.total_processing_micros.fetch_add(micros, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            successful_calls: self.successful_calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            total_processing_time: self.total_processing_micros.load(Ordering::Relaxed) as f64
                / 1_000_000.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HealthStatus {
    pub agent_id: String,
    pub status: &'static str,
    pub uptime_seconds: f64,
    pub metrics: MetricsSnapshot,
}

/// Identity, creation time and metrics common to every agent.
#[derive(Debug)]
pub struct AgentCore {
    agent_id: String,
    created_at: DateTime<Utc>,
    started: Instant,
    metrics: AgentMetrics,
}

impl AgentCore {
    /// Uses `name` when given, otherwise `{kind}-{8 hex chars}`.
    pub fn new(kind: &str, name: Option<String>) -> Self {
        let agent_id = name.filter(|name| !name.trim().is_empty()).unwrap_or_else(|| {
            let suffix = Uuid::new_v4().simple().to_string();
            format!("{kind}-{}", &suffix[..8])
        });

        Self { agent_id, created_at: Utc::now(), started: Instant::now(), metrics: AgentMetrics::default() }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn metrics(&self) -> &AgentMetrics {
        &self.metrics
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            agent_id: self.agent_id.clone(),
            status: "healthy",
            uptime_seconds: self.uptime().as_secs_f64(),
            metrics: self.metrics.snapshot(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgentResponse<C> {
    pub agent_id: String,
    pub content: C,
    /// Heuristic score in `[0, 1]`; not a calibrated probability.
    pub confidence: f64,
    pub metadata: Map<String, Value>,
    pub response_id: String,
    pub created_at: DateTime<Utc>,
}

impl<C> AgentResponse<C> {
    pub fn new(
        agent_id: impl Into<String>,
        content: C,
        confidence: f64,
        metadata: Map<String, Value>,
    ) -> Self {
        let confidence = if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) };
        Self {
            agent_id: agent_id.into(),
            content,
            confidence,
            metadata,
            response_id: format!("response-{}", Uuid::new_v4().simple()),
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait Agent: Send + Sync {
    type Content: Send;

    fn core(&self) -> &AgentCore;

    fn agent_id(&self) -> &str {
        self.core().agent_id()
    }

    /// Acquires external resources. Must be idempotent.
    async fn prepare(&self) -> Result<(), AgentError> {
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), AgentError> {
        Ok(())
    }

    /// Never fails: internal failures come back as a degraded response.
    async fn process(
        &self,
        text: &str,
        context: Option<&ConversationContext>,
        correlation: &CorrelationContext,
    ) -> AgentResponse<Self::Content>;

    async fn health_check(&self) -> HealthStatus {
        self.core().health()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use orumaiv_core::observability::{CorrelationContext, ErrorCategory};
    use serde_json::Map;

    use super::{Agent, AgentCore, AgentMetrics, AgentResponse};
    use crate::context::ConversationContext;

    struct EchoAgent {
        core: AgentCore,
    }

    #[async_trait]
    impl Agent for EchoAgent {
        type Content = String;

        fn core(&self) -> &AgentCore {
            &self.core
        }

        async fn process(
            &self,
            text: &str,
            _context: Option<&ConversationContext>,
            _correlation: &CorrelationContext,
        ) -> AgentResponse<String> {
            self.core.metrics().record(true, Duration::from_millis(1));
            AgentResponse::new(self.agent_id(), text.to_owned(), 1.0, Map::new())
        }
    }

    #[test]
    fn generated_identity_uses_kind_and_short_suffix() {
        let core = AgentCore::new("EchoAgent", None);
        let (kind, suffix) = core.agent_id().split_once('-').expect("id should contain a dash");
        assert_eq!(kind, "EchoAgent");
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn explicit_name_wins_over_generated_identity() {
        let core = AgentCore::new("EchoAgent", Some("echo".to_owned()));
        assert_eq!(core.agent_id(), "echo");
    }

    #[test]
    fn response_confidence_is_clamped_and_ids_are_unique() {
        let high = AgentResponse::new("a", (), 1.7, Map::new());
        let low = AgentResponse::new("a", (), -0.2, Map::new());
        assert_eq!(high.confidence, 1.0);
        assert_eq!(low.confidence, 0.0);
        assert!(high.response_id.starts_with("response-"));
        assert_ne!(high.response_id, low.response_id);
    }

    #[test]
    fn metrics_split_successes_and_failures() {
        let metrics = AgentMetrics::default();
        metrics.record(true, Duration::from_millis(250));
        metrics.record(false, Duration::from_millis(750));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_calls, 2);
        assert_eq!(snapshot.successful_calls, 1);
        assert_eq!(snapshot.failed_calls, 1);
        assert!((snapshot.total_processing_time - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn concurrent_updates_are_not_lost() {
        let metrics = Arc::new(AgentMetrics::default());
        let mut handles = Vec::new();
        for index in 0..64 {
            let metrics = Arc::clone(&metrics);
            handles.push(tokio::spawn(async move {
                metrics.record(index % 3 != 0, Duration::from_micros(10));
            }));
        }
        for handle in handles {
            handle.await.expect("task should complete");
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_calls, 64);
        assert_eq!(snapshot.successful_calls + snapshot.failed_calls, 64);
    }

    #[tokio::test]
    async fn default_lifecycle_and_health_check() {
        let agent = EchoAgent { core: AgentCore::new("EchoAgent", Some("echo".to_owned())) };
        agent.prepare().await.expect("default prepare is a no-op");

        let response = agent.process("hello", None, &CorrelationContext::new()).await;
        assert_eq!(response.content, "hello");
        assert_eq!(response.agent_id, "echo");

        let health = agent.health_check().await;
        assert_eq!(health.agent_id, "echo");
        assert_eq!(health.status, "healthy");
        assert_eq!(health.metrics.total_calls, 1);
        assert!(health.uptime_seconds >= 0.0);

        agent.cleanup().await.expect("default cleanup is a no-op");
    }
}
