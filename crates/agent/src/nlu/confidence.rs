//! Completeness heuristic for an [`Interpretation`].
//!
//! The score rewards payloads that name entities and requirements. It is not
//! a probability, and scores are only comparable with other scores produced
//! by this function.

use crate::nlu::interpretation::Interpretation;

pub const ERROR_CONFIDENCE: f64 = 0.0;
pub const UNKNOWN_CONFIDENCE: f64 = 0.3;
const BASE_CONFIDENCE: f64 = 0.7;
const ENTITIES_BONUS: f64 = 0.2;
const REQUIREMENTS_BONUS: f64 = 0.1;

pub fn score(interpretation: &Interpretation) -> f64 {
    if interpretation.is_error() {
        return ERROR_CONFIDENCE;
    }
    if interpretation.is_unknown() {
        return UNKNOWN_CONFIDENCE;
    }

    let mut confidence = BASE_CONFIDENCE;
    if !interpretation.entities.is_empty() {
        confidence += ENTITIES_BONUS;
    }
    if interpretation.requires_any() {
        confidence += REQUIREMENTS_BONUS;
    }

    confidence.min(1.0)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::score;
    use crate::nlu::interpretation::{Entity, Interpretation};

    fn interpretation(intent: &str, with_entity: bool, requires_search: bool) -> Interpretation {
        let mut interpretation: Interpretation =
            serde_json::from_value(json!({ "intent": intent })).expect("minimal payload");
        if with_entity {
            interpretation.entities.push(Entity::new("date", json!("today")));
        }
        interpretation.requires_external_info = requires_search;
        interpretation
    }

    #[test]
    fn sentinel_intents_have_fixed_scores() {
        assert_eq!(score(&Interpretation::error("boom")), 0.0);
        assert_eq!(score(&Interpretation::unknown("text")), 0.3);
    }

    #[test]
    fn bonuses_accumulate_and_cap_at_one() {
        assert!((score(&interpretation("greet", false, false)) - 0.7).abs() < 1e-9);
        assert!((score(&interpretation("greet", true, false)) - 0.9).abs() < 1e-9);
        assert!((score(&interpretation("greet", false, true)) - 0.8).abs() < 1e-9);
        assert!((score(&interpretation("greet", true, true)) - 1.0).abs() < 1e-9);
        assert!(score(&interpretation("greet", true, true)) <= 1.0);
    }
}
