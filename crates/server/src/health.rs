use std::collections::BTreeMap;

use axum::{extract::State, routing::get, Json, Router};
use orumaiv_agent::{Agent, HealthStatus};
use orumaiv_core::observability::MetricsSummary;
use serde::Serialize;

use crate::bootstrap::AppState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ServiceHealth {
    pub status: &'static str,
    pub version: &'static str,
    pub environment: &'static str,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgentsHealth {
    pub agents: BTreeMap<&'static str, HealthStatus>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/agents", get(agents_health))
        .route("/health/metrics", get(metrics_summary))
}

pub async fn health(State(state): State<AppState>) -> Json<ServiceHealth> {
    Json(ServiceHealth {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.server.environment(),
    })
}

pub async fn agents_health(State(state): State<AppState>) -> Json<AgentsHealth> {
    let mut agents = BTreeMap::new();
    agents.insert("nlu", state.nlu_agent.health_check().await);
    Json(AgentsHealth { agents })
}

pub async fn metrics_summary(State(state): State<AppState>) -> Json<MetricsSummary> {
    Json(state.metrics.summary())
}
