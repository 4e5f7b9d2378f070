use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};
use waypoint_core::config::AppConfig;
use waypoint_core::domain::intent::{HandlerId, IntentDecision};
use waypoint_core::domain::query::{Query, QueryFingerprint, RequestId};
use waypoint_core::domain::response::{HandlerResponse, RoutedResponse};
use waypoint_core::errors::{ApplicationError, ErrorKind, InterfaceError};

use crate::cache::{CacheStats, ResponseCache};
use crate::classifier::{ClassifierConfig, IntentClassifier};
use crate::handler::{Handler, ToolLoopSettings};
use crate::handlers::{CostAnalysisHandler, GeneralHandler};
use crate::reasoning::ReasoningEngine;
use crate::registry::{CapabilityRegistry, HandlerSummary, RegistrationMode};
use crate::tools::ToolClient;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CACHE_CAPACITY: usize = 10;

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    fallbacks: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RouterCounters {
    pub requests: u64,
    pub cache_hits: u64,
    pub fallbacks: u64,
    pub failures: u64,
    pub timeouts: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RuntimeStatus {
    pub handlers: Vec<HandlerSummary>,
    pub cache: Option<CacheStats>,
    pub counters: RouterCounters,
    pub request_timeout_ms: u64,
    pub general_handler: HandlerId,
}

pub struct AgentRuntimeBuilder {
    registry: Option<Arc<CapabilityRegistry>>,
    classifier: ClassifierConfig,
    handlers: Vec<Arc<dyn Handler>>,
    cache: Option<Arc<ResponseCache>>,
    request_timeout: Duration,
    registration_mode: RegistrationMode,
}

impl Default for AgentRuntimeBuilder {
    fn default() -> Self {
        Self {
            registry: None,
            classifier: ClassifierConfig::default(),
            handlers: Vec::new(),
            cache: Some(Arc::new(ResponseCache::new(DEFAULT_CACHE_CAPACITY))),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            registration_mode: RegistrationMode::Overwrite,
        }
    }
}

impl AgentRuntimeBuilder {
    pub fn registry(mut self, registry: Arc<CapabilityRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn classifier(mut self, classifier: ClassifierConfig) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn registration_mode(mut self, mode: RegistrationMode) -> Self {
        self.registration_mode = mode;
        self
    }

    /// Registers every handler's capabilities, then checks that the general
    /// handler is among them.
    pub fn build(self) -> Result<AgentRuntime, ApplicationError> {
        let registry = self.registry.unwrap_or_default();
        let mut handlers = BTreeMap::new();
        for handler in self.handlers {
            registry.register_with(
                handler.metadata(),
                handler.capabilities(),
                self.registration_mode,
            )?;
            handlers.insert(handler.id(), handler);
        }

        let general = &self.classifier.general_handler;
        if !handlers.contains_key(general) {
            return Err(ApplicationError::Configuration(format!(
                "general handler `{general}` has no registered implementation"
            )));
        }

        Ok(AgentRuntime {
            registry,
            classifier: IntentClassifier::new(self.classifier),
            handlers,
            cache: self.cache,
            request_timeout: self.request_timeout,
            counters: Counters::default(),
        })
    }
}

/// The router: fingerprint → cache → classify → dispatch under one timeout.
pub struct AgentRuntime {
    registry: Arc<CapabilityRegistry>,
    classifier: IntentClassifier,
    handlers: BTreeMap<HandlerId, Arc<dyn Handler>>,
    cache: Option<Arc<ResponseCache>>,
    request_timeout: Duration,
    counters: Counters,
}

impl AgentRuntime {
    pub fn builder() -> AgentRuntimeBuilder {
        AgentRuntimeBuilder::default()
    }

    /// Wires the built-in cost-analysis and general handlers from config.
    pub fn from_config(
        config: &AppConfig,
        engine: Arc<dyn ReasoningEngine>,
        tools: Arc<dyn ToolClient>,
    ) -> Result<Self, ApplicationError> {
        let settings = ToolLoopSettings::from_config(config);
        let general_id = HandlerId::from(config.router.general_handler.clone());
        let mode = if config.router.strict_registration {
            RegistrationMode::Strict
        } else {
            RegistrationMode::Overwrite
        };

        let builder = Self::builder()
            .classifier(ClassifierConfig::from_router(&config.router))
            .request_timeout(config.router.request_timeout())
            .registration_mode(mode)
            .handler(Arc::new(CostAnalysisHandler::new(engine.clone(), tools, settings)))
            .handler(Arc::new(GeneralHandler::with_id(general_id, engine)));
        let builder = if config.cache.enabled {
            builder.cache(Arc::new(ResponseCache::new(config.cache.capacity)))
        } else {
            builder.without_cache()
        };
        builder.build()
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> Option<&Arc<ResponseCache>> {
        self.cache.as_ref()
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Classification only; nothing is executed or cached.
    pub fn classify(&self, query: &Query) -> IntentDecision {
        self.classifier.classify(query, &self.registry.snapshot())
    }

    pub async fn handle(&self, query: Query) -> RoutedResponse {
        let started = Instant::now();
        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        let request_id = query.request_id().clone();
        let fingerprint = query.fingerprint();

        if let Some(entry) = self.cache.as_ref().and_then(|cache| cache.get_entry(&fingerprint)) {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            info!(
                event_name = "router.cache.hit",
                correlation_id = %request_id,
                fingerprint = %fingerprint.short(),
                handler = %entry.response.handler,
                "served from cache"
            );
            return finish(
                request_id,
                entry.response.as_cached(),
                entry.intent,
                fingerprint,
                true,
                started,
            );
        }

        let decision = self.classify(&query);
        if decision.fallback_applied {
            self.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
        }
        info!(
            event_name = "router.intent.classified",
            correlation_id = %request_id,
            fingerprint = %fingerprint.short(),
            handler = %decision.selected_handler,
            confidence = decision.confidence.as_str(),
            fallback = decision.fallback_applied,
            "query classified"
        );

        let response = match self.resolve(&decision.selected_handler) {
            Some(handler) => self.dispatch(handler, query, &request_id).await,
            None => {
                warn!(
                    event_name = "router.handler.unavailable",
                    correlation_id = %request_id,
                    handler = %decision.selected_handler,
                    "selected handler is missing or disabled"
                );
                HandlerResponse::failure(
                    decision.selected_handler.clone(),
                    ErrorKind::HandlerUnavailable,
                    format!("handler `{}` is unavailable", decision.selected_handler),
                )
            }
        };

        let response = if response.is_success() {
            if let Some(cache) = &self.cache {
                cache.put(fingerprint.clone(), response.clone(), decision.clone());
            }
            response
        } else {
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
            self.envelope(&request_id, response)
        };

        let routed = finish(request_id, response, decision, fingerprint, false, started);
        info!(
            event_name = "router.request.completed",
            correlation_id = %routed.request_id,
            handler = %routed.response.handler,
            status = ?routed.response.status,
            data_source = ?routed.response.data_source,
            elapsed_ms = routed.elapsed_ms,
            "request completed"
        );
        routed
    }

    pub fn counters(&self) -> RouterCounters {
        RouterCounters {
            requests: self.counters.requests.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            fallbacks: self.counters.fallbacks.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            timeouts: self.counters.timeouts.load(Ordering::Relaxed),
        }
    }

    pub fn status(&self) -> RuntimeStatus {
        RuntimeStatus {
            handlers: self.registry.handlers(),
            cache: self.cache.as_ref().map(|cache| cache.stats()),
            counters: self.counters(),
            request_timeout_ms: self.request_timeout_ms(),
            general_handler: self.classifier.config().general_handler.clone(),
        }
    }

    /// A registered, enabled handler, for callers that bypass classification.
    pub fn handler(&self, handler_id: &HandlerId) -> Option<Arc<dyn Handler>> {
        self.resolve(handler_id)
    }

    fn request_timeout_ms(&self) -> u64 {
        u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX)
    }

    fn resolve(&self, handler_id: &HandlerId) -> Option<Arc<dyn Handler>> {
        if !self.registry.is_enabled(handler_id) {
            return None;
        }
        self.handlers.get(handler_id).cloned()
    }

    /// Runs the handler on its own task so the timeout can abort it, which
    /// also drops any tool calls still in flight.
    async fn dispatch(
        &self,
        handler: Arc<dyn Handler>,
        query: Query,
        request_id: &RequestId,
    ) -> HandlerResponse {
        let handler_id = handler.id();
        let mut task = tokio::spawn(async move { handler.process(&query).await });

        match tokio::time::timeout(self.request_timeout, &mut task).await {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => {
                warn!(
                    event_name = "router.handler.crashed",
                    correlation_id = %request_id,
                    handler = %handler_id,
                    error = %error,
                    "handler task ended abnormally"
                );
                HandlerResponse::failure(handler_id, ErrorKind::Internal, error.to_string())
            }
            Err(_) => {
                task.abort();
                self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(
                    event_name = "router.handler.timeout",
                    correlation_id = %request_id,
                    handler = %handler_id,
                    timeout_ms = self.request_timeout_ms(),
                    "handler exceeded the request timeout"
                );
                HandlerResponse::failure(
                    handler_id,
                    ErrorKind::RequestTimeout,
                    format!("no answer within {} ms", self.request_timeout_ms()),
                )
            }
        }
    }

    /// Uniform orchestration failure: tagged with the fallback handler id,
    /// no data source, and a user-facing message instead of internals.
    fn envelope(&self, request_id: &RequestId, failed: HandlerResponse) -> HandlerResponse {
        let kind = failed.error_kind.unwrap_or(ErrorKind::Internal);
        warn!(
            event_name = "router.request.failed",
            correlation_id = %request_id,
            handler = %failed.handler,
            error_kind = kind.as_str(),
            error = %failed.content,
            "request ended in an orchestration failure"
        );
        let interface = InterfaceError::from_kind(kind, failed.content, request_id.to_string());
        HandlerResponse::failure(HandlerId::orchestrator_fallback(), kind, interface.user_message())
    }
}

fn finish(
    request_id: RequestId,
    response: HandlerResponse,
    intent: IntentDecision,
    fingerprint: QueryFingerprint,
    served_from_cache: bool,
    started: Instant,
) -> RoutedResponse {
    RoutedResponse {
        request_id,
        response,
        intent,
        fingerprint,
        served_from_cache,
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        completed_at: Utc::now(),
    }
}
