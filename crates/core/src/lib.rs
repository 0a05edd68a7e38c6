pub mod config;
pub mod errors;
pub mod observability;

pub use config::{AppConfig, ConfigError, LlmConfig, LoadOptions, RetryConfig};
pub use errors::{ApplicationError, InterfaceError};
pub use observability::{CorrelationContext, InMemoryMetricsSink, MetricsSink, MetricsSummary};
