use std::fmt::Display;
use std::future::Future;
use std::time::Instant;

use tracing::{debug, error, info_span, Instrument};

/// Runs `operation` inside a named span tagged with the correlation id.
///
/// Start and completion are logged at debug level with the elapsed time; an
/// `Err` result is logged at error level and returned unchanged.
pub async fn record_span<F, T, E>(name: &'static str, correlation_id: &str, operation: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    let span = info_span!("span", span_name = name, correlation_id = %correlation_id);

    async move {
        debug!(event_name = "observability.span.started", span_name = name, "starting {name}");
        let started = Instant::now();

        match operation.await {
            Ok(value) => {
                let duration = started.elapsed().as_secs_f64();
                debug!(
                    event_name = "observability.span.completed",
                    span_name = name,
                    duration_secs = duration,
                    "completed {name} in {duration:.3}s"
                );
                Ok(value)
            }
            Err(failure) => {
                let duration = started.elapsed().as_secs_f64();
                error!(
                    event_name = "observability.span.failed",
                    span_name = name,
                    duration_secs = duration,
                    error = %failure,
                    "error in {name} after {duration:.3}s"
                );
                Err(failure)
            }
        }
    }
    .instrument(span)
    .await
}
