use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use orumaiv_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILES};
use toml::Value;

/// One reported setting: dotted key, rendered value and the environment
/// variables that can set it, highest precedence first.
struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let api_key = if config.llm.api_key().is_some() { "<redacted>" } else { "<unset>" };

    vec![
        Field {
            key: "llm.api_key",
            value: api_key.to_string(),
            env_keys: &["ORUMAIV_LLM_API_KEY", "GOOGLE_API_KEY"],
        },
        Field {
            key: "llm.model",
            value: config.llm.model.clone(),
            env_keys: &["ORUMAIV_LLM_MODEL", "GEMINI_MODEL_ID"],
        },
        Field {
            key: "llm.base_url",
            value: config.llm.base_url.clone(),
            env_keys: &["ORUMAIV_LLM_BASE_URL"],
        },
        Field {
            key: "llm.timeout_secs",
            value: config.llm.timeout_secs.to_string(),
            env_keys: &["ORUMAIV_LLM_TIMEOUT_SECS"],
        },
        Field {
            key: "llm.temperature",
            value: config.llm.temperature.to_string(),
            env_keys: &["ORUMAIV_LLM_TEMPERATURE"],
        },
        Field {
            key: "llm.search_grounding",
            value: config.llm.search_grounding.to_string(),
            env_keys: &["ORUMAIV_LLM_SEARCH_GROUNDING"],
        },
        Field {
            key: "retry.max_attempts",
            value: config.retry.max_attempts.to_string(),
            env_keys: &["ORUMAIV_RETRY_MAX_ATTEMPTS"],
        },
        Field {
            key: "retry.initial_backoff_ms",
            value: config.retry.initial_backoff_ms.to_string(),
            env_keys: &["ORUMAIV_RETRY_INITIAL_BACKOFF_MS"],
        },
        Field {
            key: "retry.max_backoff_ms",
            value: config.retry.max_backoff_ms.to_string(),
            env_keys: &["ORUMAIV_RETRY_MAX_BACKOFF_MS"],
        },
        Field {
            key: "server.bind_address",
            value: config.server.bind_address.clone(),
            env_keys: &["ORUMAIV_SERVER_BIND_ADDRESS", "HOST"],
        },
        Field {
            key: "server.port",
            value: config.server.port.to_string(),
            env_keys: &["ORUMAIV_SERVER_PORT", "PORT"],
        },
        Field {
            key: "server.api_prefix",
            value: config.server.api_prefix.clone(),
            env_keys: &["ORUMAIV_SERVER_API_PREFIX"],
        },
        Field {
            key: "server.debug",
            value: format!("{} ({})", config.server.debug, config.server.environment()),
            env_keys: &["ORUMAIV_SERVER_DEBUG", "DEBUG"],
        },
        Field {
            key: "server.graceful_shutdown_secs",
            value: config.server.graceful_shutdown_secs.to_string(),
            env_keys: &["ORUMAIV_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        },
        Field {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["ORUMAIV_LOGGING_LEVEL", "ORUMAIV_LOG_LEVEL"],
        },
        Field {
            key: "logging.format",
            value: format!("{:?}", config.logging.format),
            env_keys: &["ORUMAIV_LOGGING_FORMAT", "ORUMAIV_LOG_FORMAT"],
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    DEFAULT_CONFIG_FILES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
