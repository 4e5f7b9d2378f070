//! Client/server round trips for the tool proxy.
//!
//! Each test binds the proxy on an ephemeral port and talks to it through
//! the same transport the agent uses.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::oneshot;
use waypoint_agent::tools::{ResilientToolClient, RetryPolicy, ToolClient, ToolTransport};
use waypoint_core::domain::cost::PricingPayload;
use waypoint_core::domain::tool::{ToolCall, ToolErrorKind, ToolFilter, ToolResult};
use waypoint_mcp::{HttpToolTransport, PriceList, ToolServer};

struct RunningProxy {
    base_url: String,
    stop: Option<oneshot::Sender<()>>,
}

impl Drop for RunningProxy {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

async fn start_proxy() -> RunningProxy {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("address");
    let (stop, stopped) = oneshot::channel::<()>();
    let server = ToolServer::new(Arc::new(PriceList::builtin()));
    tokio::spawn(async move {
        let _ = server
            .serve(listener, async move {
                let _ = stopped.await;
            })
            .await;
    });
    RunningProxy { base_url: format!("http://{address}"), stop: Some(stop) }
}

fn transport(base_url: &str) -> HttpToolTransport {
    HttpToolTransport::new(base_url, Duration::from_secs(2)).expect("transport")
}

#[tokio::test]
async fn get_pricing_round_trips_through_http() {
    let proxy = start_proxy().await;
    let call = ToolCall::new("AmazonEC2", "get_pricing")
        .in_region("us-east-1")
        .filter(ToolFilter::equals("instanceType", "t3.small"))
        .filter(ToolFilter::equals("operatingSystem", "Linux"));

    let ToolResult::Success { payload } = transport(&proxy.base_url).send(&call).await else {
        panic!("expected a successful pricing lookup");
    };
    let pricing: PricingPayload = serde_json::from_value(payload).expect("pricing payload");
    assert_eq!(pricing.products.len(), 1);
    assert_eq!(pricing.products[0].unit_price, Decimal::new(208, 4));
    assert_eq!(pricing.region.as_deref(), Some("us-east-1"));
}

#[tokio::test]
async fn rejected_parameters_are_not_retried() {
    let proxy = start_proxy().await;
    let client = ResilientToolClient::new(
        Arc::new(transport(&proxy.base_url)),
        RetryPolicy { max_attempts: 3, base_delay_ms: 10, max_delay_ms: 20 },
    );

    let result = client
        .invoke(&ToolCall::new("NoSuchService", "get_pricing"), Duration::from_secs(2))
        .await;
    assert_eq!(result.error_kind(), Some(ToolErrorKind::InvalidParameters));

    let unknown = client
        .invoke(&ToolCall::new("AmazonEC2", "launch_instances"), Duration::from_secs(2))
        .await;
    assert_eq!(unknown.error_kind(), Some(ToolErrorKind::InvalidParameters));
}

#[tokio::test]
async fn unreachable_proxy_is_unavailable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let address = listener.local_addr().expect("address");
    drop(listener);

    let result = transport(&format!("http://{address}"))
        .send(&ToolCall::new("AmazonEC2", "get_pricing_service_codes"))
        .await;
    assert_eq!(result.error_kind(), Some(ToolErrorKind::Unavailable));
}

#[tokio::test]
async fn ping_reports_operation_count() {
    let proxy = start_proxy().await;
    let health = transport(&proxy.base_url).ping().await.expect("health");
    assert_eq!(health.status, "ready");
    assert_eq!(health.operations, 5);
}
