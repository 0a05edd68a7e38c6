use std::sync::OnceLock;

use uuid::Uuid;

/// Header used to propagate a correlation identifier across process boundaries.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Correlation identifier scoped to one logical request.
///
/// The identifier is minted on first access and stays stable for the rest of
/// the invocation chain. Callers that received an identifier from upstream
/// seed it with [`CorrelationContext::with_id`].
#[derive(Debug, Default)]
pub struct CorrelationContext {
    id: OnceLock<String>,
}

impl CorrelationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        let context = Self::default();
        let _ = context.id.set(id.into());
        context
    }

    /// Seeds from an optional inbound value, ignoring blank strings.
    pub fn from_inbound(value: Option<&str>) -> Self {
        match value.map(str::trim).filter(|value| !value.is_empty()) {
            Some(id) => Self::with_id(id),
            None => Self::new(),
        }
    }

    pub fn id(&self) -> &str {
        self.id.get_or_init(|| Uuid::new_v4().to_string())
    }

    pub fn is_assigned(&self) -> bool {
        self.id.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::CorrelationContext;

    #[test]
    fn id_is_created_lazily_and_stays_stable() {
        let context = CorrelationContext::new();
        assert!(!context.is_assigned());

        let first = context.id().to_owned();
        assert!(context.is_assigned());
        assert_eq!(context.id(), first);
        assert_eq!(first.len(), 36);
    }

    #[test]
    fn seeded_id_is_preserved() {
        let context = CorrelationContext::with_id("req-42");
        assert_eq!(context.id(), "req-42");
    }

    #[test]
    fn blank_inbound_value_mints_a_fresh_id() {
        let context = CorrelationContext::from_inbound(Some("   "));
        assert!(!context.is_assigned());
        assert_ne!(context.id().trim(), "");

        let seeded = CorrelationContext::from_inbound(Some(" upstream-7 "));
        assert_eq!(seeded.id(), "upstream-7");
    }

    #[test]
    fn separate_requests_get_distinct_ids() {
        let first = CorrelationContext::new();
        let second = CorrelationContext::new();
        assert_ne!(first.id(), second.id());
    }
}
