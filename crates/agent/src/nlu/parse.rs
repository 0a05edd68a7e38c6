//! Best-effort recovery of an [`Interpretation`] from model text.
//!
//! The chain is strict decode, then decode of the widest `{ ... }` span, then
//! the `unknown` fallback. The brace span runs from the first `{` to the last
//! `}`, so text holding several separate objects will not decode in stage two
//! and lands on the fallback.

use tracing::{error, warn};

use crate::llm::ModelOutput;
use crate::nlu::interpretation::Interpretation;

pub fn parse_output(output: &ModelOutput) -> Interpretation {
    let Some(text) = output.text.as_deref() else {
        error!(event_name = "agent.nlu.parse_failed", "model response carried no text");
        return Interpretation::error("model response contained no text");
    };

    match decode_strict(text) {
        Ok(interpretation) => interpretation,
        Err(reason) => {
            warn!(
                event_name = "agent.nlu.strict_decode_failed",
                error = %reason,
                response_text = %text,
                "model response is not a well-formed payload; trying embedded object"
            );

            extract_object(text)
                .and_then(|candidate| decode_strict(candidate).ok())
                .unwrap_or_else(|| Interpretation::unknown(text))
        }
    }
}

fn decode_strict(text: &str) -> Result<Interpretation, String> {
    let interpretation: Interpretation =
        serde_json::from_str(text).map_err(|error| error.to_string())?;
    if interpretation.intent.trim().is_empty() {
        return Err("intent must be a non-empty string".to_string());
    }
    Ok(interpretation)
}

/// Greedy span from the first `{` to the last `}`.
fn extract_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
