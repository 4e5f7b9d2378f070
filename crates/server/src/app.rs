use std::collections::HashMap;
use std::future::{Future, IntoFuture};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{info, warn};
use waypoint_agent::conversation::ConversationLog;
use waypoint_agent::AgentRuntime;
use waypoint_mcp::HttpToolTransport;

use crate::bootstrap::Application;
use crate::{chat, health};

/// Shared by every request. The conversation map is the only state the
/// HTTP layer owns; its lock is never held across an await.
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<AgentRuntime>,
    pub conversations: Arc<Mutex<HashMap<String, ConversationLog>>>,
    pub max_context_turns: usize,
    pub tool_transport: Option<HttpToolTransport>,
    pub model: String,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(app: &Application) -> Self {
        Self {
            runtime: app.runtime.clone(),
            conversations: Arc::new(Mutex::new(HashMap::new())),
            max_context_turns: app.config.router.max_context_turns,
            tool_transport: app.tool_transport.clone(),
            model: app.engine.model().to_string(),
            started_at: Instant::now(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health::index))
        .route("/health", get(health::health))
        .route("/status", get(health::status))
        .route("/router-chat", post(chat::router_chat))
        .route(
            "/conversations/{user_id}",
            get(chat::conversation_summary).delete(chat::reset_conversation),
        )
        .with_state(state)
}

/// Serves until `shutdown` resolves, then lets in-flight requests drain for
/// at most `grace`.
pub async fn serve<F>(
    listener: TcpListener,
    state: AppState,
    shutdown: F,
    grace: Duration,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (draining_tx, draining_rx) = oneshot::channel::<()>();
    let signal = async move {
        shutdown.await;
        info!(
            event_name = "system.server.stopping",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "shutdown requested; draining in-flight requests"
        );
        let _ = draining_tx.send(());
    };

    let server = axum::serve(listener, router(state)).with_graceful_shutdown(signal).into_future();
    let deadline = async move {
        if draining_rx.await.is_ok() {
            tokio::time::sleep(grace).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = server => result,
        _ = deadline => {
            warn!(
                event_name = "system.server.drain_timeout",
                correlation_id = "shutdown",
                "in-flight requests outlived the shutdown grace period"
            );
            Ok(())
        }
    }
}
