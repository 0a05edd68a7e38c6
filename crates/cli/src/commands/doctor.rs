use orumaiv_core::config::{AppConfig, LoadOptions};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
    Info,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_api_key(&config));
            checks.push(check_retry_budget(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["llm_api_key", "retry_budget"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks
        .iter()
        .all(|check| matches!(check.status, CheckStatus::Pass | CheckStatus::Info));
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_api_key(config: &AppConfig) -> DoctorCheck {
    match config.llm.api_key() {
        Some(_) => DoctorCheck {
            name: "llm_api_key",
            status: CheckStatus::Pass,
            details: format!("api key present for model `{}`", config.llm.model),
        },
        None => DoctorCheck {
            name: "llm_api_key",
            status: CheckStatus::Fail,
            details: "llm.api_key is not set (ORUMAIV_LLM_API_KEY or GOOGLE_API_KEY)".to_string(),
        },
    }
}

/// Worst-case time spent backing off before a request gives up. Reported
/// for the operator; it never fails the run.
fn check_retry_budget(config: &AppConfig) -> DoctorCheck {
    let retry = &config.retry;
    let mut delay_ms = retry.initial_backoff_ms;
    let mut total_ms = 0_u64;
    for _ in 1..retry.max_attempts {
        total_ms = total_ms.saturating_add(delay_ms.min(retry.max_backoff_ms));
        delay_ms = delay_ms.saturating_mul(2);
    }

    DoctorCheck {
        name: "retry_budget",
        status: CheckStatus::Info,
        details: format!(
            "{} attempts, up to {total_ms} ms of backoff plus {} s model timeout per attempt",
            retry.max_attempts, config.llm.timeout_secs
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
            CheckStatus::Info => "info",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use orumaiv_core::config::AppConfig;

    use super::{check_retry_budget, CheckStatus};

    #[test]
    fn retry_budget_sums_capped_backoff() {
        let config = AppConfig::default();
        let check = check_retry_budget(&config);
        assert_eq!(check.status, CheckStatus::Info);
        assert!(check.details.starts_with("3 attempts, up to 6000 ms"));
    }
}
