//! Registry inspection: listing, per-handler status, dry-run routing and
//! export. All of these assemble the router exactly as the server would but
//! never contact the reasoning engine or the tool service. `test` is the
//! exception: it runs one handler for real.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use waypoint_core::domain::intent::HandlerId;
use waypoint_core::domain::query::Query;

use super::{load_application, CommandResult, EXIT_HANDLER_FAILED, EXIT_IO, EXIT_NOT_FOUND};

#[derive(Debug, Serialize)]
struct HandlerStatus {
    id: HandlerId,
    name: String,
    version: String,
    enabled: bool,
    registered_at: String,
    capabilities: Vec<String>,
}

pub fn agents() -> CommandResult {
    let app = match load_application("agents") {
        Ok(app) => app,
        Err(failure) => return failure,
    };
    let handlers = app.runtime.registry().handlers();
    CommandResult::with_data("agents", format!("{} handlers registered", handlers.len()), handlers)
}

pub fn status(handler: &str) -> CommandResult {
    let app = match load_application("status") {
        Ok(app) => app,
        Err(failure) => return failure,
    };
    let handler_id = HandlerId::from(handler.trim());
    let Some(entry) = app.runtime.registry().entry(&handler_id) else {
        return CommandResult::failure(
            "status",
            "handler_not_found",
            format!("no handler registered as `{handler_id}`"),
            EXIT_NOT_FOUND,
        );
    };

    let state = if entry.enabled { "enabled" } else { "disabled" };
    let status = HandlerStatus {
        id: entry.metadata.id.clone(),
        name: entry.metadata.name.clone(),
        version: entry.metadata.version.clone(),
        enabled: entry.enabled,
        registered_at: entry.registered_at.to_rfc3339(),
        capabilities: entry.descriptors.iter().map(|d| d.name.clone()).collect(),
    };
    CommandResult::with_data("status", format!("handler `{handler_id}` is {state}"), status)
}

/// Classifies `query` without dispatching it.
pub fn find(query: &str) -> CommandResult {
    if query.trim().is_empty() {
        return CommandResult::failure("find", "invalid_query", "query must not be empty", 1);
    }
    let app = match load_application("find") {
        Ok(app) => app,
        Err(failure) => return failure,
    };
    let decision = app.runtime.classify(&Query::new(query));
    let message = format!("routed to `{}`", decision.selected_handler);
    CommandResult::with_data("find", message, decision)
}

/// Sends `query` straight to one handler, skipping classification, the cache
/// and the request timeout.
pub fn test(handler: &str, query: &str) -> CommandResult {
    if query.trim().is_empty() {
        return CommandResult::failure("test", "invalid_query", "query must not be empty", 1);
    }
    let app = match load_application("test") {
        Ok(app) => app,
        Err(failure) => return failure,
    };
    let handler_id = HandlerId::from(handler.trim());
    let Some(target) = app.runtime.handler(&handler_id) else {
        return CommandResult::failure(
            "test",
            "handler_not_found",
            format!("no enabled handler registered as `{handler_id}`"),
            EXIT_NOT_FOUND,
        );
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "test",
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                1,
            )
        }
    };
    let response = runtime.block_on(target.process(&Query::new(query)));

    match response.error_kind {
        None => {
            let message = format!("`{handler_id}` answered from {:?}", response.data_source);
            CommandResult::with_data("test", message, response)
        }
        Some(kind) => {
            CommandResult::failure("test", kind.as_str(), response.content, EXIT_HANDLER_FAILED)
        }
    }
}

pub fn export(path: &Path) -> CommandResult {
    let app = match load_application("export") {
        Ok(app) => app,
        Err(failure) => return failure,
    };
    let export = app.runtime.registry().export();
    let handlers = export.handlers.len();

    match write_export(path, &export) {
        Ok(()) => CommandResult::success(
            "export",
            format!("wrote {handlers} handlers to {}", path.display()),
        ),
        Err(error) => CommandResult::failure("export", "io", format!("{error:#}"), EXIT_IO),
    }
}

fn write_export(path: &Path, export: &impl Serialize) -> anyhow::Result<()> {
    let body = serde_json::to_string_pretty(export).context("serializing registry export")?;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    fs::write(path, body).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
