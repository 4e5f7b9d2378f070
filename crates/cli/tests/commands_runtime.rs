use std::env;
use std::fs;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use waypoint_cli::commands::{config, doctor, registry};

// An address nothing listens on, so connection attempts fail fast.
const DEAD_ENDPOINT: &str = "http://127.0.0.1:9";

#[test]
fn config_reports_env_sources_and_redacts_the_api_key() {
    with_env(
        &[
            ("WAYPOINT_LLM_PROVIDER", "openai"),
            ("WAYPOINT_LLM_API_KEY", "sk-very-secret"),
            ("WAYPOINT_CACHE_CAPACITY", "25"),
        ],
        || {
            let result = config::run();
            assert_eq!(result.exit_code, 0, "expected config to load");
            assert!(result
                .output
                .contains("- llm.api_key = sk-*** (source: env (WAYPOINT_LLM_API_KEY))"));
            assert!(result
                .output
                .contains("- cache.capacity = 25 (source: env (WAYPOINT_CACHE_CAPACITY))"));
            assert!(result.output.contains("- server.port = 8000 (source: default)"));
            assert!(!result.output.contains("very-secret"));
        },
    );
}

#[test]
fn config_returns_validation_failure_for_bad_env() {
    with_env(&[("WAYPOINT_CACHE_CAPACITY", "lots")], || {
        let result = config::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "config");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_fails_when_the_reasoning_endpoint_is_down() {
    let vars = [("WAYPOINT_LLM_BASE_URL", DEAD_ENDPOINT), ("WAYPOINT_TOOLS_ENABLED", "false")];
    with_env(&vars, || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 6, "expected failed readiness checks");

        let report = parse_payload(&result.output);
        assert_eq!(report["overall_status"], "fail");
        let checks = report["checks"].as_array().cloned().unwrap_or_default();
        assert_eq!(checks.len(), 3);
        assert_eq!(checks[0]["name"], "config_validation");
        assert_eq!(checks[0]["status"], "pass");
        assert_eq!(checks[1]["name"], "reasoning_endpoint");
        assert_eq!(checks[1]["status"], "fail");
        assert_eq!(checks[2]["name"], "tool_service");
        assert_eq!(checks[2]["status"], "skipped");
    });
}

#[test]
fn doctor_skips_dependency_checks_when_config_is_invalid() {
    with_env(&[("WAYPOINT_TOOLS_MAX_ATTEMPTS", "many")], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 6);
        assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
        assert!(result.output.contains("- [fail] config_validation"));
        assert!(result.output.contains("- [skip] reasoning_endpoint"));
        assert!(result.output.contains("- [skip] tool_service"));
    });
}

#[test]
fn agents_lists_builtin_handlers() {
    with_env(&[], || {
        let result = registry::agents();
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "agents");
        let ids: Vec<&str> = payload["data"]
            .as_array()
            .map(|handlers| handlers.iter().filter_map(|h| h["id"].as_str()).collect())
            .unwrap_or_default();
        assert!(ids.contains(&"cost_analysis"));
        assert!(ids.contains(&"general"));
    });
}

#[test]
fn status_reports_a_known_handler_and_rejects_unknown_ones() {
    with_env(&[], || {
        let known = registry::status("cost_analysis");
        assert_eq!(known.exit_code, 0);
        let payload = parse_payload(&known.output);
        assert_eq!(payload["data"]["id"], "cost_analysis");
        assert_eq!(payload["data"]["enabled"], true);

        let unknown = registry::status("billing");
        assert_eq!(unknown.exit_code, 4);
        let payload = parse_payload(&unknown.output);
        assert_eq!(payload["error_class"], "handler_not_found");
    });
}

#[test]
fn find_routes_pricing_questions_to_cost_analysis() {
    with_env(&[], || {
        let result = registry::find("What is the monthly cost of a small compute instance?");
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["selected_handler"], "cost_analysis");
        assert_eq!(payload["data"]["fallback_applied"], false);
    });
}

#[test]
fn find_falls_back_to_the_general_handler() {
    with_env(&[], || {
        let result = registry::find("hello there");
        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["selected_handler"], "general");
        assert_eq!(payload["data"]["fallback_applied"], true);
    });
}

#[test]
fn test_runs_the_named_handler_without_classifying() {
    let vars = [("WAYPOINT_LLM_BASE_URL", DEAD_ENDPOINT), ("WAYPOINT_TOOLS_ENABLED", "false")];
    with_env(&vars, || {
        // A pricing question would classify to cost_analysis; the general
        // handler still runs and fails on the unreachable engine.
        let result = registry::test("general", "monthly cost of a t3.small");
        assert_eq!(result.exit_code, 7, "unexpected output: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "test");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "reasoning_engine_unreachable");
    });
}

#[test]
fn test_rejects_unknown_handlers_and_empty_queries() {
    with_env(&[], || {
        let unknown = registry::test("billing", "what is a VPC");
        assert_eq!(unknown.exit_code, 4);
        assert_eq!(parse_payload(&unknown.output)["error_class"], "handler_not_found");

        let empty = registry::test("general", "   ");
        assert_eq!(empty.exit_code, 1);
        assert_eq!(parse_payload(&empty.output)["error_class"], "invalid_query");
    });
}

#[test]
fn export_writes_the_registry_file() {
    with_env(&[], || {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out").join("registry.json");

        let result = registry::export(&path);
        assert_eq!(result.exit_code, 0, "export failed: {}", result.output);

        let written: Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("export file")).expect("json");
        assert_eq!(written["handlers"].as_array().map(Vec::len), Some(2));
        assert!(written["exported_at"].is_string());
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "WAYPOINT_LLM_PROVIDER",
        "WAYPOINT_LLM_API_KEY",
        "WAYPOINT_LLM_BASE_URL",
        "WAYPOINT_LLM_MODEL",
        "WAYPOINT_LLM_TIMEOUT_SECS",
        "WAYPOINT_TOOLS_ENABLED",
        "WAYPOINT_TOOLS_BASE_URL",
        "WAYPOINT_TOOLS_CALL_TIMEOUT_MS",
        "WAYPOINT_TOOLS_MAX_ATTEMPTS",
        "WAYPOINT_ROUTER_REQUEST_TIMEOUT_SECS",
        "WAYPOINT_ROUTER_MAX_TOOL_ROUNDS",
        "WAYPOINT_ROUTER_STRICT_REGISTRATION",
        "WAYPOINT_CACHE_ENABLED",
        "WAYPOINT_CACHE_CAPACITY",
        "WAYPOINT_SERVER_BIND_ADDRESS",
        "WAYPOINT_SERVER_PORT",
        "WAYPOINT_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "WAYPOINT_LOGGING_LEVEL",
        "WAYPOINT_LOGGING_FORMAT",
        "WAYPOINT_LOG_LEVEL",
        "WAYPOINT_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        match value {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }
}
