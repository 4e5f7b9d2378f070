use serde::Serialize;
use waypoint_core::config::{AppConfig, LoadOptions};
use waypoint_mcp::HttpToolTransport;
use waypoint_server::OpenAiCompatibleEngine;

use super::{CommandResult, EXIT_CHECKS_FAILED};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Skipped, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { EXIT_CHECKS_FAILED };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass(
                "config_validation",
                "configuration loaded and validated",
            ));
            let (reasoning, tools) = check_dependencies(&config);
            checks.push(reasoning);
            checks.push(tools);
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            let reason = "skipped because configuration did not load";
            checks.push(DoctorCheck::skipped("reasoning_endpoint", reason));
            checks.push(DoctorCheck::skipped("tool_service", reason));
        }
    }

    // Skipped checks (tools disabled on purpose) do not fail the report.
    let all_pass = checks.iter().all(|check| check.status != CheckStatus::Fail);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_dependencies(config: &AppConfig) -> (DoctorCheck, DoctorCheck) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            let details = format!("failed to initialize async runtime: {error}");
            return (
                DoctorCheck::fail("reasoning_endpoint", details.clone()),
                DoctorCheck::fail("tool_service", details),
            );
        }
    };

    runtime.block_on(async {
        let reasoning = check_reasoning_endpoint(config).await;
        let tools = check_tool_service(config).await;
        (reasoning, tools)
    })
}

async fn check_reasoning_endpoint(config: &AppConfig) -> DoctorCheck {
    let engine = match OpenAiCompatibleEngine::from_config(&config.llm) {
        Ok(engine) => engine,
        Err(error) => {
            return DoctorCheck::fail(
                "reasoning_endpoint",
                format!("failed to build client: {error}"),
            )
        }
    };

    match engine.ping().await {
        Ok(()) => DoctorCheck::pass(
            "reasoning_endpoint",
            format!("`{}` reachable for model `{}`", engine.endpoint(), engine.model()),
        ),
        Err(error) => DoctorCheck::fail("reasoning_endpoint", error.to_string()),
    }
}

async fn check_tool_service(config: &AppConfig) -> DoctorCheck {
    if !config.tools.enabled {
        return DoctorCheck::skipped("tool_service", "tools disabled in config");
    }

    let transport = match HttpToolTransport::from_config(&config.tools) {
        Ok(transport) => transport,
        Err(error) => {
            return DoctorCheck::fail("tool_service", format!("failed to build client: {error}"))
        }
    };

    match transport.ping().await {
        Ok(report) => DoctorCheck::pass(
            "tool_service",
            format!(
                "`{}` {} with {} operations",
                transport.base_url(),
                report.status,
                report.operations
            ),
        ),
        Err(error) => DoctorCheck::fail("tool_service", error.to_string()),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
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
    use super::{render_human, CheckStatus, DoctorCheck, DoctorReport};

    #[test]
    fn human_rendering_marks_each_check() {
        let report = DoctorReport {
            overall_status: CheckStatus::Fail,
            summary: "doctor: one or more readiness checks failed".to_string(),
            checks: vec![
                DoctorCheck::pass("config_validation", "ok"),
                DoctorCheck::fail("reasoning_endpoint", "connection refused"),
                DoctorCheck::skipped("tool_service", "tools disabled in config"),
            ],
        };

        let rendered = render_human(&report);
        assert!(rendered.contains("- [ok] config_validation: ok"));
        assert!(rendered.contains("- [fail] reasoning_endpoint: connection refused"));
        assert!(rendered.contains("- [skip] tool_service: tools disabled in config"));
    }
}
