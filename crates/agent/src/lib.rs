//! Agent runtime - model-backed interpretation of user messages
//!
//! This crate provides the agents behind the orumaiv chat surface:
//! - A common agent contract (`Agent`) with identity, lifecycle and metrics
//! - A natural-language understanding agent (`nlu::NluAgent`)
//! - A pluggable model boundary (`LlmClient`) with a Gemini implementation
//!
//! # Pipeline
//!
//! One `process` call runs:
//! 1. **Prompt** (`nlu::prompt`) - instruction, optional context, user text
//! 2. **Invocation** (`retry`) - model call, transient failures retried with backoff
//! 3. **Parsing** (`nlu::parse`) - strict decode, embedded object, `unknown` fallback
//! 4. **Scoring** (`nlu::confidence`) - completeness heuristic
//!
//! # Failure Principle
//!
//! `process` never fails. Every model or parsing failure is reported as a
//! degraded `error` interpretation with confidence `0.0`.

pub mod agent;
pub mod context;
pub mod gemini;
pub mod llm;
pub mod nlu;
pub mod retry;
#[cfg(any(test, feature = "test-support"))]
pub mod scripted;

pub use agent::{Agent, AgentCore, AgentError, AgentMetrics, AgentResponse, HealthStatus, MetricsSnapshot};
pub use context::{ConversationContext, HistoryTurn, TaskContext};
pub use gemini::{GeminiClient, GeminiConnector};
pub use llm::{GenerationOptions, LlmClient, LlmConnector, LlmError, ModelOutput, ModelTool};
pub use nlu::{Interpretation, NluAgent, NluConfig};
pub use retry::RetryPolicy;
