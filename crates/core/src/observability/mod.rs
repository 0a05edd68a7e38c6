//! Instrumentation boundary consumed by agents and transports.
//!
//! Nothing here owns a sink of its own: the correlation context is passed
//! explicitly through each call chain, and metrics go to whichever
//! [`MetricsSink`] the pipeline owner injects.

pub mod correlation;
pub mod metrics;
pub mod span;

pub use correlation::{CorrelationContext, CORRELATION_HEADER};
pub use metrics::{
    labels, timed, ErrorCategory, InMemoryMetricsSink, Labels, MetricAction, MetricsSink,
    MetricsSummary,
};
pub use span::record_span;
