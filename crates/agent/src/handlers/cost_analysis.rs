use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};
use waypoint_core::domain::cost::{
    CostBreakdown, CostLineItem, CostReport, PricingPayload,
};
use waypoint_core::domain::intent::{
    CapabilityDescriptor, ConfidenceBand, HandlerId, HandlerMetadata,
};
use waypoint_core::domain::query::Query;
use waypoint_core::domain::response::{DataSource, HandlerResponse, ResponseMetadata};
use waypoint_core::domain::tool::ToolResult;

use crate::annotation::annotate_costs;
use crate::handler::{Handler, ToolLoop, ToolLoopOutcome, ToolLoopSettings};
use crate::reasoning::{ReasoningEngine, ReasoningRequest, ToolExchange};
use crate::tools::{ToolCatalog, ToolClient, ToolSchema};

pub const FALLBACK_DISCLAIMER: &str = "Real-time pricing data is unavailable; figures are knowledge-based estimates. Verify against the provider's pricing calculator before committing.";
pub const LIVE_DATA_FOOTER: &str = "**Data Source:** Live pricing data";

const SYSTEM_PROMPT: &str = "You are a cloud cost analyst. Identify the services, \
instance sizes and regions in the question, look up current unit prices with the \
declared pricing tools, and answer with a monthly and annual estimate plus a \
per-service breakdown. Monthly figures assume 730 hours of usage. When the tools \
return nothing usable, answer from general pricing knowledge and say the figures \
are estimates. Suggest concrete savings when the question asks about optimization.";

pub struct CostAnalysisHandler {
    tool_loop: ToolLoop,
}

impl CostAnalysisHandler {
    pub fn new(
        engine: Arc<dyn ReasoningEngine>,
        tools: Arc<dyn ToolClient>,
        settings: ToolLoopSettings,
    ) -> Self {
        Self { tool_loop: ToolLoop::new(engine, tools, tool_catalog(), settings) }
    }

    /// Live only when a priced line item backs the answer. Successful lookups
    /// that yield no price (service codes, attributes, unusable payloads) do
    /// not count.
    fn compose(&self, outcome: ToolLoopOutcome) -> HandlerResponse {
        let breakdown = pricing_breakdown(&outcome.exchanges);
        let (data_source, confidence) = match (&breakdown, outcome.failed_calls()) {
            (Some(_), 0) => (DataSource::Live, ConfidenceBand::High),
            (Some(_), _) => (DataSource::Live, ConfidenceBand::Medium),
            (None, _) => (DataSource::FallbackKnowledge, ConfidenceBand::Low),
        };

        let mut content = outcome.answer.trim_end().to_string();
        if data_source == DataSource::Live {
            content.push_str("\n\n");
            content.push_str(LIVE_DATA_FOOTER);
        } else {
            content.push_str("\n\n> ");
            content.push_str(FALLBACK_DISCLAIMER);
            let failed = failed_operations(&outcome.exchanges);
            if !failed.is_empty() {
                content.push_str("\n> Lookups that failed: ");
                content.push_str(&failed.join(", "));
            }
        }

        let metadata = match breakdown {
            Some(breakdown) => Some(ResponseMetadata::CostBreakdown(breakdown)),
            None => annotate_costs(&outcome.answer).map(ResponseMetadata::ExtractedCosts),
        };
        debug!(
            event_name = "handler.cost_analysis.composed",
            data_source = ?data_source,
            structured = matches!(metadata, Some(ResponseMetadata::CostBreakdown(_))),
            "cost answer composed"
        );

        let response =
            HandlerResponse::success(HandlerId::CostAnalysis, content, data_source, confidence)
            .with_tool_calls(outcome.tool_calls());
        match metadata {
            Some(metadata) => response.with_metadata(metadata),
            None => response,
        }
    }
}

#[async_trait]
impl Handler for CostAnalysisHandler {
    fn id(&self) -> HandlerId {
        HandlerId::CostAnalysis
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            id: HandlerId::CostAnalysis,
            name: "Cost analysis".to_string(),
            description: "Prices cloud services and architectures from live price-list data"
                .to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn capabilities(&self) -> Vec<CapabilityDescriptor> {
        descriptors()
    }

    async fn process(&self, query: &Query) -> HandlerResponse {
        let request = ReasoningRequest::new(SYSTEM_PROMPT, query.text())
            .with_context(query.context().to_vec());

        match self.tool_loop.run(&HandlerId::CostAnalysis, request).await {
            Ok(outcome) => {
                info!(
                    event_name = "handler.cost_analysis.completed",
                    correlation_id = %query.request_id(),
                    rounds = outcome.rounds,
                    tool_calls = outcome.tool_calls(),
                    failed_calls = outcome.failed_calls(),
                    "cost analysis completed"
                );
                self.compose(outcome)
            }
            Err(error) => {
                HandlerResponse::failure(HandlerId::CostAnalysis, error.kind(), error.to_string())
            }
        }
    }
}

pub fn descriptors() -> Vec<CapabilityDescriptor> {
    vec![
        CapabilityDescriptor::new(HandlerId::CostAnalysis, "cost analysis")
            .describe("Price a service, instance or resource")
            .keywords([
                "cost", "price", "pricing", "budget", "estimate", "expensive", "cheap", "savings",
                "bill", "billing", "monthly", "hourly", "instance", "compute",
            ])
            .phrases([
                "how much does",
                "cost analysis",
                "pricing for",
                "budget for",
                "monthly cost",
                "cost of",
                "cost comparison",
            ])
            .priority(8)
            .threshold(0.3),
        CapabilityDescriptor::new(HandlerId::CostAnalysis, "cost optimization")
            .describe("Find cheaper configurations for an existing setup")
            .keywords(["optimize", "reduce", "save", "cheaper", "alternative", "efficiency"])
            .phrases([
                "optimize costs",
                "reduce spending",
                "save money",
                "cost optimization",
                "cheaper alternative",
            ])
            .priority(7)
            .threshold(0.3),
        CapabilityDescriptor::new(HandlerId::CostAnalysis, "architecture costing")
            .describe("Estimate a whole workload or deployment")
            .keywords(["architecture", "workload", "deployment", "infrastructure", "setup"])
            .phrases([
                "architecture cost",
                "workload pricing",
                "deployment cost",
                "infrastructure cost",
            ])
            .priority(6)
            .threshold(0.3),
    ]
}

pub fn tool_catalog() -> ToolCatalog {
    let filters = json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "field": {"type": "string"},
                "value": {},
                "matchType": {"type": "string", "enum": ["EQUALS", "CONTAINS", "ANY_OF"]}
            },
            "required": ["field", "value", "matchType"]
        }
    });

    let mut catalog = ToolCatalog::default();
    catalog.register(ToolSchema {
        operation: "get_pricing".to_string(),
        description: "Unit prices for a service code in a region, narrowed by filters".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "service": {"type": "string"},
                "region": {"type": "string"},
                "filters": filters
            },
            "required": ["service"]
        }),
    });
    catalog.register(ToolSchema {
        operation: "get_pricing_service_codes".to_string(),
        description: "Lists the service codes the price list knows".to_string(),
        parameters: json!({"type": "object", "properties": {}}),
    });
    catalog.register(ToolSchema {
        operation: "get_pricing_service_attributes".to_string(),
        description: "Lists filterable attribute names for a service code".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {"service": {"type": "string"}},
            "required": ["service"]
        }),
    });
    catalog.register(ToolSchema {
        operation: "get_pricing_attribute_values".to_string(),
        description: "Lists valid values of the attributes named in the filters".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {"service": {"type": "string"}, "filters": filters},
            "required": ["service"]
        }),
    });
    catalog.register(ToolSchema {
        operation: "generate_cost_report".to_string(),
        description: "Monthly and annual cost report for every product matching the filters, \
                      priced at 730 hours per month"
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "service": {"type": "string"},
                "region": {"type": "string"},
                "filters": filters
            },
            "required": ["service"]
        }),
    });
    catalog
}

/// Priced lines from successful lookups: the first product of each
/// `get_pricing` call and every line of each `generate_cost_report`.
/// Payloads of the wrong shape, or whose prices overflow, are skipped.
fn pricing_breakdown(exchanges: &[ToolExchange]) -> Option<CostBreakdown> {
    let mut currency = None;
    let mut line_items = Vec::new();

    for exchange in exchanges {
        let ToolResult::Success { payload } = &exchange.result else {
            continue;
        };
        let priced = match exchange.call.operation.as_str() {
            "get_pricing" => serde_json::from_value::<PricingPayload>(payload.clone())
                .ok()
                .map(|pricing| first_product_line(&pricing, exchange)),
            "generate_cost_report" => serde_json::from_value::<CostReport>(payload.clone())
                .ok()
                .map(|report| (report.breakdown.currency, report.breakdown.line_items)),
            _ => continue,
        };
        let Some((payload_currency, items)) = priced else {
            debug!(
                event_name = "handler.cost_analysis.payload_skipped",
                service = %exchange.call.service,
                operation = %exchange.call.operation,
                "pricing payload did not match the expected shape"
            );
            continue;
        };
        if !items.is_empty() {
            currency.get_or_insert(payload_currency);
            line_items.extend(items);
        }
    }

    if line_items.is_empty() {
        return None;
    }
    let breakdown =
        CostBreakdown::from_line_items(currency.unwrap_or_else(|| "USD".to_string()), line_items);
    if breakdown.is_none() {
        debug!(
            event_name = "handler.cost_analysis.totals_overflowed",
            "priced lines were dropped because their totals overflow"
        );
    }
    breakdown
}

fn first_product_line(
    pricing: &PricingPayload,
    exchange: &ToolExchange,
) -> (String, Vec<CostLineItem>) {
    let region = pricing.region.clone().or_else(|| exchange.call.region.clone());
    let item =
        pricing.products.first().and_then(|product| product.line_item(&pricing.service, region));
    (pricing.currency.clone(), item.into_iter().collect())
}

fn failed_operations(exchanges: &[ToolExchange]) -> Vec<String> {
    exchanges
        .iter()
        .filter_map(|exchange| {
            exchange
                .result
                .error_kind()
                .map(|kind| {
                    format!("{} {} ({kind})", exchange.call.service, exchange.call.operation)
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use rust_decimal::Decimal;
    use serde_json::json;
    use waypoint_core::domain::cost::PricingPayload;
    use waypoint_core::domain::intent::{ConfidenceBand, HandlerId};
    use waypoint_core::domain::query::Query;
    use waypoint_core::domain::response::{DataSource, ResponseMetadata, ResponseStatus};
    use waypoint_core::domain::tool::{ToolCall, ToolErrorKind, ToolFilter, ToolResult};
    use waypoint_core::errors::ErrorKind;

    use super::{descriptors, pricing_breakdown, CostAnalysisHandler, FALLBACK_DISCLAIMER};
    use crate::handler::{Handler, ToolLoopSettings};
    use crate::reasoning::{ReasoningOutcome, ToolExchange};
    use crate::testing::{FailingToolClient, ScriptedReasoningEngine, StaticToolClient};

    fn ec2_call() -> ToolCall {
        ToolCall::new("AmazonEC2", "get_pricing")
            .in_region("us-east-1")
            .filter(ToolFilter::equals("instanceType", "t3.small"))
    }

    fn ec2_payload() -> serde_json::Value {
        json!({
            "service": "AmazonEC2",
            "region": "us-east-1",
            "currency": "USD",
            "products": [{"sku": "T3S", "unitPrice": "0.0208", "unit": "Hrs",
                          "attributes": {"instanceType": "t3.small"}}]
        })
    }

    fn settings() -> ToolLoopSettings {
        ToolLoopSettings { max_rounds: 3, call_timeout: Duration::from_millis(500) }
    }

    #[tokio::test]
    async fn live_prices_become_a_structured_breakdown() {
        let engine = ScriptedReasoningEngine::new([
            Ok(ReasoningOutcome::InvokeTools(vec![ec2_call()])),
            Ok(ReasoningOutcome::FinalAnswer("A t3.small runs about $15.18/month.".into())),
        ]);
        let handler = CostAnalysisHandler::new(
            Arc::new(engine),
            Arc::new(StaticToolClient::new(ec2_payload())),
            settings(),
        );

        let response = handler.process(&Query::new("monthly cost of a t3.small")).await;
        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.data_source, DataSource::Live);
        assert_eq!(response.confidence, ConfidenceBand::High);
        assert_eq!(response.tool_calls, 1);
        assert!(response.content.ends_with("**Data Source:** Live pricing data"));

        let Some(ResponseMetadata::CostBreakdown(breakdown)) = response.metadata else {
            panic!("expected a cost breakdown");
        };
        assert_eq!(breakdown.monthly_total, Decimal::new(208, 4) * Decimal::from(730));
        assert_eq!(breakdown.line_items[0].region.as_deref(), Some("us-east-1"));
    }

    #[tokio::test]
    async fn failed_tools_fall_back_with_disclaimer() {
        let engine = ScriptedReasoningEngine::new([
            Ok(ReasoningOutcome::InvokeTools(vec![ec2_call()])),
            Ok(ReasoningOutcome::FinalAnswer("Expect roughly **$15/month**.".into())),
        ]);
        let tools = Arc::new(FailingToolClient::new(ToolErrorKind::Timeout));
        let handler = CostAnalysisHandler::new(Arc::new(engine), tools.clone(), settings());

        let response = handler.process(&Query::new("monthly cost of a t3.small")).await;
        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.data_source, DataSource::FallbackKnowledge);
        assert_eq!(response.confidence, ConfidenceBand::Low);
        assert!(response.content.contains(FALLBACK_DISCLAIMER));
        assert!(response.content.contains("AmazonEC2 get_pricing (timeout)"));
        assert_eq!(tools.calls(), 1);

        let Some(ResponseMetadata::ExtractedCosts(extracted)) = response.metadata else {
            panic!("expected extracted costs");
        };
        assert_eq!(extracted.monthly_total, Some(Decimal::from(15)));
    }

    #[tokio::test]
    async fn unreachable_engine_is_an_error_response() {
        let handler = CostAnalysisHandler::new(
            Arc::new(ScriptedReasoningEngine::unreachable()),
            Arc::new(StaticToolClient::new(ec2_payload())),
            settings(),
        );

        let response = handler.process(&Query::new("monthly cost of a t3.small")).await;
        assert_eq!(response.status, ResponseStatus::Error);
        assert_eq!(response.error_kind, Some(ErrorKind::ReasoningEngineUnreachable));
        assert_eq!(response.handler, HandlerId::CostAnalysis);
    }

    #[test]
    fn breakdown_ignores_failures_and_other_operations() {
        let exchanges = vec![
            ToolExchange { call: ec2_call(), result: ToolResult::success(ec2_payload()) },
            ToolExchange {
                call: ToolCall::new("AmazonRDS", "get_pricing"),
                result: ToolResult::failure(ToolErrorKind::Unavailable, "down"),
            },
            ToolExchange {
                call: ToolCall::new("AmazonEC2", "get_pricing_service_attributes"),
                result: ToolResult::success(json!({"attributes": ["instanceType"]})),
            },
        ];
        let breakdown = pricing_breakdown(&exchanges).expect("one priced line");
        assert_eq!(breakdown.line_items.len(), 1);
        assert_eq!(breakdown.currency, "USD");
    }

    #[tokio::test]
    async fn oversized_price_degrades_instead_of_failing() {
        let engine = ScriptedReasoningEngine::new([
            Ok(ReasoningOutcome::InvokeTools(vec![ec2_call()])),
            Ok(ReasoningOutcome::FinalAnswer("Pricing looks unusual.".into())),
        ]);
        let payload = json!({
            "service": "AmazonEC2",
            "products": [{"sku": "HUGE", "unitPrice": "79228162514264337593543950335",
                          "unit": "Hrs"}]
        });
        let handler = CostAnalysisHandler::new(
            Arc::new(engine),
            Arc::new(StaticToolClient::new(payload)),
            settings(),
        );

        let response = handler.process(&Query::new("monthly cost of a t3.small")).await;
        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.error_kind, None);
        assert_eq!(response.data_source, DataSource::FallbackKnowledge);
        assert!(response.content.contains(FALLBACK_DISCLAIMER));
    }

    #[tokio::test]
    async fn lookups_without_prices_are_not_live() {
        let engine = ScriptedReasoningEngine::new([
            Ok(ReasoningOutcome::InvokeTools(vec![ToolCall::new(
                "",
                "get_pricing_service_codes",
            )])),
            Ok(ReasoningOutcome::FinalAnswer("EC2 is usually about $15/month.".into())),
        ]);
        let tools = Arc::new(StaticToolClient::new(json!({"serviceCodes": ["AmazonEC2"]})));
        let handler = CostAnalysisHandler::new(Arc::new(engine), tools, settings());

        let response = handler.process(&Query::new("monthly cost of a t3.small")).await;
        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.data_source, DataSource::FallbackKnowledge);
        assert_eq!(response.confidence, ConfidenceBand::Low);
        assert!(response.content.contains(FALLBACK_DISCLAIMER));
        assert!(!response.content.contains("Live pricing data"));
    }

    #[tokio::test]
    async fn unparseable_pricing_payload_is_not_live() {
        let engine = ScriptedReasoningEngine::new([
            Ok(ReasoningOutcome::InvokeTools(vec![ec2_call()])),
            Ok(ReasoningOutcome::FinalAnswer("About $15/month.".into())),
        ]);
        let tools = Arc::new(StaticToolClient::new(json!({"price": "cheap"})));
        let handler = CostAnalysisHandler::new(Arc::new(engine), tools, settings());

        let response = handler.process(&Query::new("monthly cost of a t3.small")).await;
        assert_eq!(response.data_source, DataSource::FallbackKnowledge);
        assert_eq!(response.confidence, ConfidenceBand::Low);
    }

    #[test]
    fn cost_reports_contribute_every_line() {
        let pricing: PricingPayload = serde_json::from_value(json!({
            "service": "AmazonEC2",
            "region": "us-east-1",
            "products": [
                {"sku": "A", "unitPrice": "0.0208", "unit": "Hrs"},
                {"sku": "B", "unitPrice": "0.0416", "unit": "Hrs"}
            ]
        }))
        .expect("payload");
        let report = pricing.cost_report().expect("report");
        let exchanges = vec![
            ToolExchange {
                call: ToolCall::new("AmazonEC2", "generate_cost_report"),
                result: ToolResult::success(serde_json::to_value(report).expect("json")),
            },
            ToolExchange { call: ec2_call(), result: ToolResult::success(ec2_payload()) },
        ];

        let breakdown = pricing_breakdown(&exchanges).expect("priced lines");
        assert_eq!(breakdown.line_items.len(), 3);
        assert_eq!(breakdown.monthly_total, Decimal::new(832, 4) * Decimal::from(730));
    }

    #[test]
    fn descriptors_cover_three_capabilities() {
        let descriptors = descriptors();
        let priorities = descriptors.iter().map(|d| d.priority).collect::<Vec<_>>();
        assert_eq!(priorities, vec![8, 7, 6]);
        assert!(descriptors.iter().all(|d| d.handler_id == HandlerId::CostAnalysis));
    }
}
