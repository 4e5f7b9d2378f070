//! Waypoint tool proxy binary
//!
//! Serves the price list tool operations over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! # Built-in price list on the default address
//! waypoint-mcp
//!
//! # Custom address and price list file
//! WAYPOINT_MCP_BIND=0.0.0.0:8001 WAYPOINT_PRICE_LIST=prices.toml waypoint-mcp
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use waypoint_mcp::{PriceList, ToolServer};

const DEFAULT_BIND: &str = "127.0.0.1:8001";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let bind = std::env::var("WAYPOINT_MCP_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let prices = match std::env::var_os("WAYPOINT_PRICE_LIST").map(PathBuf::from) {
        Some(path) => {
            info!(path = %path.display(), "loading price list");
            PriceList::load(&path).with_context(|| format!("loading {}", path.display()))?
        }
        None => PriceList::builtin(),
    };
    if prices.is_empty() {
        warn!("price list is empty; every get_pricing call will be rejected");
    }

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding tool proxy to {bind}"))?;
    ToolServer::new(Arc::new(prices)).serve(listener, shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "could not listen for ctrl-c; serving until killed");
        std::future::pending::<()>().await;
    }
}
