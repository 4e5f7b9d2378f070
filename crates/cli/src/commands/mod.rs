pub mod config;
pub mod doctor;
pub mod registry;

use serde::Serialize;
use serde_json::Value;
use waypoint_core::config::LoadOptions;
use waypoint_server::{bootstrap, Application, BootstrapError};

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_BOOTSTRAP: u8 = 3;
pub const EXIT_NOT_FOUND: u8 = 4;
pub const EXIT_IO: u8 = 5;
pub const EXIT_CHECKS_FAILED: u8 = 6;
pub const EXIT_HANDLER_FAILED: u8 = 7;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data: None,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    /// Success carrying a structured payload under `data`.
    pub fn with_data(command: &str, message: impl Into<String>, data: impl Serialize) -> Self {
        let data = match serde_json::to_value(data) {
            Ok(data) => data,
            Err(error) => return Self::failure(command, "serialization", error.to_string(), 1),
        };
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data: Some(data),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

/// Loads config and assembles the router the same way the server does.
pub(crate) fn load_application(command: &str) -> Result<Application, CommandResult> {
    bootstrap(LoadOptions::default()).map_err(|error| match error {
        BootstrapError::Config(error) => {
            CommandResult::failure(command, "config_validation", error.to_string(), EXIT_CONFIG)
        }
        other => CommandResult::failure(command, "bootstrap", other.to_string(), EXIT_BOOTSTRAP),
    })
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
