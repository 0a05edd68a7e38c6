use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use orumaiv_agent::nlu::Entity;
use orumaiv_agent::{Agent, ConversationContext, Interpretation, TaskContext};
use orumaiv_core::errors::InterfaceError;
use orumaiv_core::observability::{labels, CorrelationContext, MetricAction, CORRELATION_HEADER};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bootstrap::AppState;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct MessageRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MessageResponse {
    pub id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub intent: String,
    pub entities: Vec<Entity>,
}

pub fn routes(path: &str) -> Router<AppState> {
    Router::new().route(path, post(send_message))
}

pub async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<MessageRequest>, JsonRejection>,
) -> Response {
    let correlation = CorrelationContext::from_inbound(
        headers.get(CORRELATION_HEADER).and_then(|value| value.to_str().ok()),
    );

    let response = match payload {
        Ok(Json(request)) => handle_message(&state, request, &correlation).await,
        Err(rejection) => {
            Err(InterfaceError::bad_request(rejection.body_text(), correlation.id()))
        }
    };

    let mut response = match response {
        Ok(body) => Json(body).into_response(),
        Err(error) => error_response(&error),
    };
    if let Ok(value) = HeaderValue::from_str(correlation.id()) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

async fn handle_message(
    state: &AppState,
    request: MessageRequest,
    correlation: &CorrelationContext,
) -> Result<MessageResponse, InterfaceError> {
    let correlation_id = correlation.id();
    if request.user_id.trim().is_empty() {
        return Err(InterfaceError::bad_request("user_id must not be empty", correlation_id));
    }
    if request.content.trim().is_empty() {
        return Err(InterfaceError::bad_request("content must not be empty", correlation_id));
    }

    let metric_labels = labels([("endpoint", "chat_message")]);
    let started_at = state.metrics.record("chat_request", MetricAction::Start, &metric_labels, None);

    info!(
        event_name = "chat.message.received",
        correlation_id,
        user_id = %request.user_id,
        session_id = request.session_id.as_deref().unwrap_or("none"),
        task_id = request.task_id.as_deref().unwrap_or("none"),
        "chat message received"
    );

    let context = request
        .task_id
        .as_deref()
        .map(|task_id| ConversationContext::with_task(TaskContext::with_id(task_id)));
    let agent_response =
        state.nlu_agent.process(&request.content, context.as_ref(), correlation).await;
    let interpretation = agent_response.content;
    if interpretation.is_error() {
        warn!(
            event_name = "chat.message.degraded",
            correlation_id,
            error = interpretation.error.as_deref().unwrap_or("unknown"),
            "message interpreted with degraded response"
        );
    }

    let reply = MessageResponse {
        id: message_id(),
        content: reply_text(&interpretation),
        timestamp: Utc::now(),
        intent: interpretation.intent.clone(),
        entities: interpretation.entities,
    };

    state.metrics.record(
        "chat_request",
        MetricAction::Count("success".to_string()),
        &metric_labels,
        None,
    );
    state.metrics.record("chat_request", MetricAction::End, &metric_labels, Some(started_at));

    info!(
        event_name = "chat.message.replied",
        correlation_id,
        message_id = %reply.id,
        intent = %reply.intent,
        confidence = agent_response.confidence,
        "chat reply sent"
    );

    Ok(reply)
}

fn message_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("msg-{}", &suffix[..8])
}

fn reply_text(interpretation: &Interpretation) -> String {
    let mut text = format!("Understood, you want: {}", interpretation.intent);
    if !interpretation.entities.is_empty() {
        let entities = interpretation
            .entities
            .iter()
            .map(|entity| format!("{}: {}", entity.name, entity.value_text()))
            .collect::<Vec<_>>()
            .join(", ");
        text.push_str("\nEntities identified: ");
        text.push_str(&entities);
    }
    text
}

fn error_response(error: &InterfaceError) -> Response {
    let status = StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    warn!(
        event_name = "chat.message.rejected",
        correlation_id = error.correlation_id(),
        status = status.as_u16(),
        error = %error,
        "chat request rejected"
    );
    let body = json!({
        "error": error.user_message(),
        "detail": error.to_string(),
        "correlation_id": error.correlation_id(),
    });
    (status, Json(body)).into_response()
}
