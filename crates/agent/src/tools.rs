use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use waypoint_core::config::{retry_backoff, ToolsConfig};
use waypoint_core::domain::tool::{ToolCall, ToolErrorKind, ToolResult};

/// One attempt against the tool service. Implementations map every failure
/// to a `ToolResult::Failure`; timeouts and retries live in
/// [`ResilientToolClient`].
#[async_trait]
pub trait ToolTransport: Send + Sync {
    async fn send(&self, call: &ToolCall) -> ToolResult;
}

#[async_trait]
pub trait ToolClient: Send + Sync {
    async fn invoke(&self, call: &ToolCall, timeout: Duration) -> ToolResult;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_ms: 200, max_delay_ms: 1_000 }
    }
}

impl RetryPolicy {
    pub fn from_config(tools: &ToolsConfig) -> Self {
        Self {
            max_attempts: tools.max_attempts.max(1),
            base_delay_ms: tools.retry_base_delay_ms,
            max_delay_ms: tools.retry_max_delay_ms,
        }
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        retry_backoff(self.base_delay_ms, self.max_delay_ms, attempt)
    }
}

/// Enforces the per-call timeout itself and retries transient failures.
pub struct ResilientToolClient {
    transport: Arc<dyn ToolTransport>,
    policy: RetryPolicy,
}

impl ResilientToolClient {
    pub fn new(transport: Arc<dyn ToolTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl ToolClient for ResilientToolClient {
    async fn invoke(&self, call: &ToolCall, timeout: Duration) -> ToolResult {
        if let Err(detail) = call.validate() {
            return ToolResult::failure(ToolErrorKind::InvalidParameters, detail);
        }

        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            let result = match tokio::time::timeout(timeout, self.transport.send(call)).await {
                Ok(result) => result,
                Err(_) => ToolResult::failure(
                    ToolErrorKind::Timeout,
                    format!("no response within {} ms", timeout.as_millis()),
                ),
            };

            let retryable = match &result {
                ToolResult::Success { .. } => {
                    debug!(
                        event_name = "tool.call.succeeded",
                        service = %call.service,
                        operation = %call.operation,
                        attempt,
                        "tool call succeeded"
                    );
                    return result;
                }
                ToolResult::Failure { kind, detail } => {
                    warn!(
                        event_name = "tool.call.failed",
                        service = %call.service,
                        operation = %call.operation,
                        attempt,
                        max_attempts,
                        error_kind = %kind,
                        error = %detail,
                        "tool call attempt failed"
                    );
                    kind.is_retryable()
                }
            };

            attempt += 1;
            if !retryable || attempt >= max_attempts {
                return result;
            }
            tokio::time::sleep(self.policy.backoff(attempt - 1)).await;
        }
    }
}

/// Stands in for the tool service when tools are switched off.
#[derive(Clone, Debug, Default)]
pub struct DisabledToolClient;

#[async_trait]
impl ToolClient for DisabledToolClient {
    async fn invoke(&self, call: &ToolCall, _timeout: Duration) -> ToolResult {
        ToolResult::failure(
            ToolErrorKind::Unavailable,
            format!("tool service disabled; `{}` was not called", call.operation),
        )
    }
}

/// Declared shape of one operation a handler may ask the reasoning engine to
/// call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub operation: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Debug, Default)]
pub struct ToolCatalog {
    tools: BTreeMap<String, ToolSchema>,
}

impl ToolCatalog {
    pub fn register(&mut self, schema: ToolSchema) {
        self.tools.insert(schema.operation.clone(), schema);
    }

    pub fn get(&self, operation: &str) -> Option<&ToolSchema> {
        self.tools.get(operation)
    }

    pub fn contains(&self, operation: &str) -> bool {
        self.tools.contains_key(operation)
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use waypoint_core::config::ToolsConfig;
    use waypoint_core::domain::tool::{ToolCall, ToolErrorKind, ToolFilter, ToolResult};

    use super::{
        DisabledToolClient, ResilientToolClient, RetryPolicy, ToolCatalog, ToolClient,
        ToolSchema, ToolTransport,
    };

    struct CountingTransport {
        calls: AtomicU32,
        script: Vec<ToolResult>,
    }

    impl CountingTransport {
        fn new(script: Vec<ToolResult>) -> Arc<Self> {
            Arc::new(Self { calls: AtomicU32::new(0), script })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ToolTransport for CountingTransport {
        async fn send(&self, _call: &ToolCall) -> ToolResult {
            let index = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            self.script
                .get(index)
                .or_else(|| self.script.last())
                .cloned()
                .unwrap_or_else(|| ToolResult::success(json!({})))
        }
    }

    struct HangingTransport;

    #[async_trait]
    impl ToolTransport for HangingTransport {
        async fn send(&self, _call: &ToolCall) -> ToolResult {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            ToolResult::success(json!({}))
        }
    }

    fn pricing_call() -> ToolCall {
        ToolCall::new("AmazonEC2", "get_pricing")
            .in_region("us-east-1")
            .filter(ToolFilter::equals("instanceType", "t3.small"))
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_until_success() {
        let transport = CountingTransport::new(vec![
            ToolResult::failure(ToolErrorKind::Unavailable, "connection refused"),
            ToolResult::failure(ToolErrorKind::Timeout, "slow"),
            ToolResult::success(json!({"unitPrice": "0.0208"})),
        ]);
        let client = ResilientToolClient::new(transport.clone(), RetryPolicy::default());

        let result = client.invoke(&pricing_call(), Duration::from_secs(2)).await;
        assert!(result.is_success());
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_stop_at_the_attempt_bound() {
        let transport = CountingTransport::new(vec![ToolResult::failure(
            ToolErrorKind::Unavailable,
            "connection refused",
        )]);
        let client = ResilientToolClient::new(transport.clone(), RetryPolicy::default());

        let result = client.invoke(&pricing_call(), Duration::from_secs(2)).await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::Unavailable));
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_parameters_are_never_retried() {
        let transport = CountingTransport::new(vec![ToolResult::failure(
            ToolErrorKind::InvalidParameters,
            "unknown filter field",
        )]);
        let client = ResilientToolClient::new(transport.clone(), RetryPolicy::default());

        let result = client.invoke(&pricing_call(), Duration::from_secs(2)).await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::InvalidParameters));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_calls_fail_without_reaching_transport() {
        let transport = CountingTransport::new(Vec::new());
        let client = ResilientToolClient::new(transport.clone(), RetryPolicy::default());

        let result = client.invoke(&ToolCall::new("AmazonEC2", ""), Duration::from_secs(2)).await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::InvalidParameters));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn client_enforces_timeout_itself() {
        let client = ResilientToolClient::new(
            Arc::new(HangingTransport),
            RetryPolicy { max_attempts: 2, base_delay_ms: 100, max_delay_ms: 100 },
        );

        let started = tokio::time::Instant::now();
        let result = client.invoke(&pricing_call(), Duration::from_millis(500)).await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::Timeout));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1_100));
        assert!(elapsed < Duration::from_millis(1_200));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy { max_attempts: 5, base_delay_ms: 200, max_delay_ms: 1_000 };
        assert_eq!(policy.backoff(0), Duration::from_millis(200));
        assert_eq!(policy.backoff(1), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(1_000));
    }

    #[test]
    fn policy_from_config_backs_off_like_the_config() {
        let tools = ToolsConfig {
            max_attempts: 4,
            retry_base_delay_ms: 150,
            retry_max_delay_ms: 500,
            enabled: true,
            base_url: "http://127.0.0.1:8811".to_string(),
            call_timeout_ms: 1_000,
        };
        let policy = RetryPolicy::from_config(&tools);
        for attempt in [0, 1, 2, 40] {
            assert_eq!(policy.backoff(attempt), tools.backoff(attempt));
        }
        assert_eq!(policy.backoff(40), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn disabled_client_reports_unavailable() {
        let result = DisabledToolClient.invoke(&pricing_call(), Duration::from_secs(1)).await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::Unavailable));
    }

    #[test]
    fn catalog_indexes_schemas_by_operation() {
        let mut catalog = ToolCatalog::default();
        catalog.register(ToolSchema {
            operation: "get_pricing".into(),
            description: "price lookup".into(),
            parameters: json!({"type": "object"}),
        });
        assert!(catalog.contains("get_pricing"));
        assert!(!catalog.contains("delete_everything"));
        assert_eq!(catalog.len(), 1);
    }
}
