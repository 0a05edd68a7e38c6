use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const INTENT_UNKNOWN: &str = "unknown";
pub const INTENT_ERROR: &str = "error";

/// Structured reading of one utterance.
///
/// Exactly one of three shapes is produced: a decoded model payload, the
/// `unknown` fallback carrying `raw_response`, or the `error` fallback
/// carrying `error`. Keys the model adds beyond the schema are kept in
/// `extra` so a decoded payload serializes back unchanged. A `null` entity
/// list or flag reads as empty or `false`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interpretation {
    pub intent: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub entities: Vec<Entity>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub requires_task_info: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub requires_user_history: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub requires_external_info: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub value: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Entity {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self { name: name.into(), value, extra: Map::new() }
    }

    /// The value as display text; strings are rendered without quotes.
    pub fn value_text(&self) -> String {
        match &self.value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

impl Interpretation {
    fn empty(intent: &str) -> Self {
        Self {
            intent: intent.to_owned(),
            entities: Vec::new(),
            requires_task_info: false,
            requires_user_history: false,
            requires_external_info: false,
            search_query: None,
            raw_response: None,
            error: None,
            extra: Map::new(),
        }
    }

    /// Fallback when the model answered with text that holds no usable payload.
    pub fn unknown(raw_response: impl Into<String>) -> Self {
        Self { raw_response: Some(raw_response.into()), ..Self::empty(INTENT_UNKNOWN) }
    }

    /// Degraded payload for any failure to obtain or read a model answer.
    pub fn error(message: impl Into<String>) -> Self {
        Self { error: Some(message.into()), ..Self::empty(INTENT_ERROR) }
    }

    pub fn is_error(&self) -> bool {
        self.intent == INTENT_ERROR
    }

    pub fn is_unknown(&self) -> bool {
        self.intent == INTENT_UNKNOWN
    }

    pub fn requires_any(&self) -> bool {
        self.requires_task_info || self.requires_user_history || self.requires_external_info
    }
}
