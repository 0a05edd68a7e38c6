use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;
use tracing::debug;

pub type Labels = BTreeMap<String, String>;

/// Builds a label map from string pairs.
pub fn labels<const N: usize>(pairs: [(&str, &str); N]) -> Labels {
    pairs.into_iter().map(|(key, value)| (key.to_owned(), value.to_owned())).collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetricAction {
    Start,
    End,
    Error,
    Count(String),
}

impl MetricAction {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Start => "start",
            Self::End => "end",
            Self::Error => "error",
            Self::Count(name) => name,
        }
    }
}

/// Point-in-time view of everything a sink has recorded.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MetricsSummary {
    /// metric type -> labels key -> durations in seconds
    pub processing_times: BTreeMap<String, BTreeMap<String, Vec<f64>>>,
    /// metric type -> labels key -> error count
    pub errors: BTreeMap<String, BTreeMap<String, u64>>,
    /// metric type -> counter name -> labels key -> count
    pub counters: BTreeMap<String, BTreeMap<String, BTreeMap<String, u64>>>,
}

pub trait MetricsSink: Send + Sync {
    /// Records one event and returns the instant it was recorded at, so a
    /// `Start` result can be handed back with the matching `End`.
    fn record(
        &self,
        metric_type: &str,
        action: MetricAction,
        labels: &Labels,
        started_at: Option<Instant>,
    ) -> Instant;

    fn summary(&self) -> MetricsSummary;
}

pub fn labels_key(labels: &Labels) -> String {
    labels.iter().map(|(key, value)| format!("{key}:{value}")).collect::<Vec<_>>().join("_")
}

#[derive(Clone, Default)]
pub struct InMemoryMetricsSink {
    summary: Arc<Mutex<MetricsSummary>>,
}

impl InMemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_summary<R>(&self, apply: impl FnOnce(&mut MetricsSummary) -> R) -> R {
        match self.summary.lock() {
            Ok(mut summary) => apply(&mut summary),
            Err(poisoned) => apply(&mut poisoned.into_inner()),
        }
    }
}

impl MetricsSink for InMemoryMetricsSink {
    fn record(
        &self,
        metric_type: &str,
        action: MetricAction,
        labels: &Labels,
        started_at: Option<Instant>,
    ) -> Instant {
        let now = Instant::now();
        let key = labels_key(labels);

        match (&action, started_at) {
            (MetricAction::Start, _) => {}
            (MetricAction::End, Some(started_at)) => {
                let duration = now.saturating_duration_since(started_at).as_secs_f64();
                self.with_summary(|summary| {
                    summary
                        .processing_times
                        .entry(metric_type.to_owned())
                        .or_default()
                        .entry(key.clone())
                        .or_default()
                        .push(duration);
                });
                debug!(
                    event_name = "observability.metric.recorded",
                    metric_type,
                    action = action.as_str(),
                    labels = %key,
                    duration_secs = duration,
                    "metric recorded"
                );
                return now;
            }
            (MetricAction::End, None) => {}
            (MetricAction::Error, _) => {
                self.with_summary(|summary| {
                    *summary
                        .errors
                        .entry(metric_type.to_owned())
                        .or_default()
                        .entry(key.clone())
                        .or_default() += 1;
                });
            }
            (MetricAction::Count(name), _) => {
                self.with_summary(|summary| {
                    *summary
                        .counters
                        .entry(metric_type.to_owned())
                        .or_default()
                        .entry(name.clone())
                        .or_default()
                        .entry(key.clone())
                        .or_default() += 1;
                });
            }
        }

        debug!(
            event_name = "observability.metric.recorded",
            metric_type,
            action = action.as_str(),
            labels = %key,
            "metric recorded"
        );
        now
    }

    fn summary(&self) -> MetricsSummary {
        self.with_summary(|summary| summary.clone())
    }
}

/// Fixed label for a failure. Error series are keyed by this rather than the
/// message text, so the number of series stays bounded.
pub trait ErrorCategory {
    fn category(&self) -> &'static str;
}

/// Times `operation` against `sink`: `Start` before, then `End` on success or
/// `Error` (with an `error` category label) on failure.
pub async fn timed<F, T, E>(
    sink: &dyn MetricsSink,
    metric_type: &str,
    mut labels: Labels,
    operation: F,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: ErrorCategory,
{
    let started_at = sink.record(metric_type, MetricAction::Start, &labels, None);

    match operation.await {
        Ok(value) => {
            sink.record(metric_type, MetricAction::End, &labels, Some(started_at));
            Ok(value)
        }
        Err(failure) => {
            labels.insert("error".to_owned(), failure.category().to_owned());
            sink.record(metric_type, MetricAction::Error, &labels, None);
            Err(failure)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        labels, labels_key, timed, ErrorCategory, InMemoryMetricsSink, MetricAction, MetricsSink,
    };

    #[derive(Debug, PartialEq)]
    struct Upstream(String);

    impl ErrorCategory for Upstream {
        fn category(&self) -> &'static str {
            "upstream"
        }
    }

    #[test]
    fn labels_key_is_sorted_by_label_name() {
        let key = labels_key(&labels([("user_id", "u1"), ("intent", "create_task")]));
        assert_eq!(key, "intent:create_task_user_id:u1");
    }

    #[test]
    fn end_with_start_records_duration() {
        let sink = InMemoryMetricsSink::new();
        let chat_labels = labels([("user_id", "u1")]);

        let started = sink.record("chat_request", MetricAction::Start, &chat_labels, None);
        sink.record("chat_request", MetricAction::End, &chat_labels, Some(started));

        let summary = sink.summary();
        let durations = &summary.processing_times["chat_request"]["user_id:u1"];
        assert_eq!(durations.len(), 1);
        assert!(durations[0] >= 0.0);
    }

    #[test]
    fn end_without_start_records_nothing() {
        let sink = InMemoryMetricsSink::new();
        sink.record("chat_request", MetricAction::End, &labels([("user_id", "u1")]), None);
        assert!(sink.summary().processing_times.is_empty());
    }

    #[test]
    fn errors_and_counters_accumulate() {
        let sink = InMemoryMetricsSink::new();
        let error_labels = labels([("agent", "nlu")]);
        sink.record("agent_processing", MetricAction::Error, &error_labels, None);
        sink.record("agent_processing", MetricAction::Error, &error_labels, None);
        sink.record(
            "chat_request",
            MetricAction::Count("success".to_owned()),
            &labels([("intent", "create_task")]),
            None,
        );

        let summary = sink.summary();
        assert_eq!(summary.errors["agent_processing"]["agent:nlu"], 2);
        assert_eq!(summary.counters["chat_request"]["success"]["intent:create_task"], 1);
    }

    #[tokio::test]
    async fn timed_records_end_on_success_and_error_on_failure() {
        let sink = InMemoryMetricsSink::new();

        let ok: Result<u8, Upstream> =
            timed(&sink, "agent_processing", labels([("agent", "nlu")]), async { Ok(1) }).await;
        assert_eq!(ok, Ok(1));

        for message in ["boom", "connection reset", "boom again"] {
            let failed: Result<u8, Upstream> =
                timed(&sink, "agent_processing", labels([("agent", "nlu")]), async {
                    Err(Upstream(message.to_owned()))
                })
                .await;
            assert!(failed.is_err());
        }

        let summary = sink.summary();
        assert_eq!(summary.processing_times["agent_processing"]["agent:nlu"].len(), 1);
        assert_eq!(summary.errors["agent_processing"].len(), 1);
        assert_eq!(summary.errors["agent_processing"]["agent:nlu_error:upstream"], 3);
    }
}
