//! In-memory price list backend.
//!
//! Loaded from a TOML file with one `[[prices]]` table per product:
//!
//! ```toml
//! [[prices]]
//! service = "AmazonEC2"
//! region = "us-east-1"
//! sku = "EC2-T3SMALL-LINUX"
//! unit_price = "0.0208"
//! unit = "Hrs"
//! attributes = { instanceType = "t3.small", operatingSystem = "Linux" }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use waypoint_agent::handlers::cost_analysis;
use waypoint_agent::tools::ToolSchema;
use waypoint_core::domain::cost::{CostReport, PricedProduct, PricingPayload};
use waypoint_core::domain::tool::{MatchType, ToolCall, ToolFilter};

use crate::server::ToolBackend;
use crate::{ProxyError, ProxyResult};

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct PriceEntry {
    pub service: String,
    pub region: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub sku: String,
    #[serde(default)]
    pub description: String,
    pub unit_price: Decimal,
    pub unit: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl PriceEntry {
    fn product(&self) -> PricedProduct {
        PricedProduct {
            sku: self.sku.clone(),
            description: self.description.clone(),
            unit_price: self.unit_price,
            unit: self.unit.clone(),
            attributes: self.attributes.clone(),
        }
    }

    /// Attribute lookup that also exposes the entry's region under the
    /// `regionCode` name price lists use.
    fn attribute(&self, field: &str) -> Option<&str> {
        if field == "regionCode" {
            return Some(self.region.as_str());
        }
        self.attributes.get(field).map(String::as_str)
    }

    fn matches(&self, filter: &ToolFilter) -> bool {
        let Some(actual) = self.attribute(&filter.field) else {
            return false;
        };
        match filter.match_type {
            MatchType::Equals => filter_text(&filter.value).is_some_and(|wanted| actual == wanted),
            MatchType::Contains => filter_text(&filter.value).is_some_and(|wanted| {
                actual.to_ascii_lowercase().contains(&wanted.to_ascii_lowercase())
            }),
            MatchType::AnyOf => filter
                .value
                .as_array()
                .is_some_and(|values| values.iter().filter_map(filter_text).any(|v| actual == v)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PriceListFile {
    #[serde(default)]
    prices: Vec<PriceEntry>,
}

#[derive(Clone, Debug, Default)]
pub struct PriceList {
    entries: Vec<PriceEntry>,
}

impl PriceList {
    pub fn new(entries: Vec<PriceEntry>) -> Self {
        Self { entries }
    }

    /// A small on-demand price list, enough to answer common questions
    /// without a file.
    pub fn builtin() -> Self {
        let ec2 = |region: &str, instance: &str, os: &str, price: Decimal| PriceEntry {
            service: "AmazonEC2".to_string(),
            region: region.to_string(),
            currency: default_currency(),
            sku: format!("EC2-{}-{}-{}", region, instance, os).to_ascii_uppercase(),
            description: String::new(),
            unit_price: price,
            unit: "Hrs".to_string(),
            attributes: BTreeMap::from([
                ("instanceType".to_string(), instance.to_string()),
                ("operatingSystem".to_string(), os.to_string()),
                ("tenancy".to_string(), "Shared".to_string()),
            ]),
        };
        let monthly = |service: &str, region: &str, sku: &str, description: &str, price: Decimal| {
            PriceEntry {
                service: service.to_string(),
                region: region.to_string(),
                currency: default_currency(),
                sku: sku.to_string(),
                description: description.to_string(),
                unit_price: price,
                unit: "GB-Mo".to_string(),
                attributes: BTreeMap::from([(
                    "storageClass".to_string(),
                    description.to_string(),
                )]),
            }
        };

        Self::new(vec![
            ec2("us-east-1", "t3.micro", "Linux", Decimal::new(104, 4)),
            ec2("us-east-1", "t3.small", "Linux", Decimal::new(208, 4)),
            ec2("us-east-1", "t3.medium", "Linux", Decimal::new(416, 4)),
            ec2("us-east-1", "t3.small", "Windows", Decimal::new(392, 4)),
            ec2("us-east-1", "m5.large", "Linux", Decimal::new(96, 3)),
            ec2("eu-west-1", "t3.small", "Linux", Decimal::new(228, 4)),
            monthly("AmazonS3", "us-east-1", "S3-STANDARD", "General Purpose", Decimal::new(23, 3)),
            monthly("AmazonS3", "us-east-1", "S3-GLACIER", "Archive", Decimal::new(4, 3)),
            PriceEntry {
                service: "AWSLambda".to_string(),
                region: "us-east-1".to_string(),
                currency: default_currency(),
                sku: "LAMBDA-REQUESTS".to_string(),
                description: "Requests".to_string(),
                unit_price: Decimal::new(2, 7),
                unit: "Requests".to_string(),
                attributes: BTreeMap::from([(
                    "group".to_string(),
                    "AWS-Lambda-Requests".to_string(),
                )]),
            },
        ])
    }

    pub fn from_toml_str(source: &str) -> ProxyResult<Self> {
        let file: PriceListFile =
            toml::from_str(source).map_err(|error| ProxyError::PriceList(error.to_string()))?;
        Ok(Self::new(file.prices))
    }

    pub fn load(path: &Path) -> ProxyResult<Self> {
        let source = fs::read_to_string(path).map_err(|error| {
            ProxyError::PriceList(format!("could not read `{}`: {error}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn service_codes(&self) -> Vec<String> {
        let codes = self.entries.iter().map(|entry| entry.service.clone()).collect::<BTreeSet<_>>();
        codes.into_iter().collect()
    }

    pub fn pricing(&self, call: &ToolCall) -> ProxyResult<PricingPayload> {
        let service = self.known_service(call)?;
        let currency =
            service.first().map(|entry| entry.currency.clone()).unwrap_or_else(default_currency);
        let products = service
            .into_iter()
            .filter(|entry| call.region.as_deref().map_or(true, |region| entry.region == region))
            .filter(|entry| call.filters.iter().all(|filter| entry.matches(filter)))
            .map(PriceEntry::product)
            .collect::<Vec<_>>();
        debug!(
            event_name = "tool_proxy.pricing.matched",
            service = %call.service,
            products = products.len(),
            "price list lookup"
        );
        Ok(PricingPayload {
            service: call.service.clone(),
            region: call.region.clone(),
            currency,
            products,
        })
    }

    /// Report over every product `pricing` would return for the same call.
    pub fn cost_report(&self, call: &ToolCall) -> ProxyResult<CostReport> {
        self.pricing(call)?.cost_report().ok_or_else(|| {
            ProxyError::InvalidParameters(format!(
                "prices for `{}` are too large to total",
                call.service
            ))
        })
    }

    pub fn service_attributes(&self, call: &ToolCall) -> ProxyResult<Vec<String>> {
        let mut names = BTreeSet::from(["regionCode".to_string()]);
        for entry in self.known_service(call)? {
            names.extend(entry.attributes.keys().cloned());
        }
        Ok(names.into_iter().collect())
    }

    /// Valid values of every attribute named by the call's filters.
    pub fn attribute_values(&self, call: &ToolCall) -> ProxyResult<BTreeMap<String, Vec<String>>> {
        if call.filters.is_empty() {
            return Err(ProxyError::InvalidParameters(
                "get_pricing_attribute_values needs at least one filter naming an attribute".into(),
            ));
        }
        let entries = self.known_service(call)?;
        let mut values = BTreeMap::new();
        for filter in &call.filters {
            let found = entries
                .iter()
                .filter_map(|entry| entry.attribute(&filter.field))
                .map(str::to_string)
                .collect::<BTreeSet<_>>();
            values.insert(filter.field.clone(), found.into_iter().collect());
        }
        Ok(values)
    }

    fn known_service(&self, call: &ToolCall) -> ProxyResult<Vec<&PriceEntry>> {
        if call.service.trim().is_empty() {
            return Err(ProxyError::InvalidParameters("service is required".into()));
        }
        let entries =
            self.entries.iter().filter(|entry| entry.service == call.service).collect::<Vec<_>>();
        if entries.is_empty() {
            return Err(ProxyError::InvalidParameters(format!(
                "unknown service code `{}`",
                call.service
            )));
        }
        Ok(entries)
    }
}

#[async_trait]
impl ToolBackend for PriceList {
    fn operations(&self) -> Vec<ToolSchema> {
        cost_analysis::tool_catalog().schemas()
    }

    async fn execute(&self, call: &ToolCall) -> ProxyResult<Value> {
        call.validate().map_err(ProxyError::InvalidParameters)?;
        let value = match call.operation.as_str() {
            "get_pricing" => serde_json::to_value(self.pricing(call)?),
            "generate_cost_report" => serde_json::to_value(self.cost_report(call)?),
            "get_pricing_service_codes" => Ok(json!({ "serviceCodes": self.service_codes() })),
            "get_pricing_service_attributes" => Ok(json!({
                "service": call.service,
                "attributes": self.service_attributes(call)?,
            })),
            "get_pricing_attribute_values" => Ok(json!({
                "service": call.service,
                "values": self.attribute_values(call)?,
            })),
            other => return Err(ProxyError::UnknownOperation(other.to_string())),
        };
        value.map_err(|error| ProxyError::Internal(error.to_string()))
    }
}

fn filter_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn default_currency() -> String {
    "USD".to_string()
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;
    use waypoint_core::domain::tool::{ToolCall, ToolFilter};

    use super::PriceList;
    use crate::server::ToolBackend;
    use crate::ProxyError;

    fn t3_small() -> ToolCall {
        ToolCall::new("AmazonEC2", "get_pricing")
            .in_region("us-east-1")
            .filter(ToolFilter::equals("instanceType", "t3.small"))
            .filter(ToolFilter::equals("operatingSystem", "Linux"))
    }

    #[test]
    fn equals_filters_narrow_to_one_product() {
        let payload = PriceList::builtin().pricing(&t3_small()).expect("pricing");
        assert_eq!(payload.products.len(), 1);
        assert_eq!(payload.products[0].unit_price, Decimal::new(208, 4));
        assert_eq!(payload.currency, "USD");
    }

    #[test]
    fn contains_is_case_insensitive_and_any_of_is_a_set() {
        let list = PriceList::builtin();
        let contains = ToolCall::new("AmazonEC2", "get_pricing")
            .in_region("us-east-1")
            .filter(ToolFilter::contains("instanceType", "T3."));
        assert_eq!(list.pricing(&contains).expect("pricing").products.len(), 4);

        let any_of = ToolCall::new("AmazonEC2", "get_pricing")
            .filter(ToolFilter::any_of("instanceType", ["t3.micro", "m5.large"]));
        assert_eq!(list.pricing(&any_of).expect("pricing").products.len(), 2);
    }

    #[test]
    fn region_code_is_filterable() {
        let call = ToolCall::new("AmazonEC2", "get_pricing")
            .filter(ToolFilter::equals("regionCode", "eu-west-1"));
        let payload = PriceList::builtin().pricing(&call).expect("pricing");
        assert_eq!(payload.products.len(), 1);
        assert_eq!(payload.products[0].unit_price, Decimal::new(228, 4));
    }

    #[test]
    fn unknown_service_is_invalid() {
        let error = PriceList::builtin()
            .pricing(&ToolCall::new("AmazonNope", "get_pricing"))
            .expect_err("unknown service");
        assert!(matches!(error, ProxyError::InvalidParameters(_)));
    }

    #[test]
    fn loads_prices_from_toml() {
        let list = PriceList::from_toml_str(
            r#"
            [[prices]]
            service = "AmazonRDS"
            region = "us-east-1"
            sku = "RDS-DB-T3-MICRO"
            unit_price = "0.017"
            unit = "Hrs"
            attributes = { instanceType = "db.t3.micro", databaseEngine = "PostgreSQL" }
            "#,
        )
        .expect("parse");
        assert_eq!(list.len(), 1);
        assert_eq!(list.service_codes(), vec!["AmazonRDS".to_string()]);

        let call = ToolCall::new("AmazonRDS", "get_pricing_service_attributes");
        assert_eq!(
            list.service_attributes(&call).expect("attributes"),
            vec!["databaseEngine", "instanceType", "regionCode"]
        );
    }

    #[test]
    fn cost_report_totals_the_matching_products() {
        let call = ToolCall::new("AmazonEC2", "generate_cost_report")
            .in_region("us-east-1")
            .filter(ToolFilter::equals("operatingSystem", "Linux"));
        let report = PriceList::builtin().cost_report(&call).expect("report");

        assert_eq!(report.breakdown.line_items.len(), 4);
        // (0.0104 + 0.0208 + 0.0416 + 0.096) * 730
        assert_eq!(report.breakdown.monthly_total, Decimal::new(1232240, 4));
        assert!(report.unpriced_skus.is_empty());
        assert!(report.summary.starts_with("AmazonEC2 in us-east-1: 4 priced products"));
    }

    #[test]
    fn cost_report_rejects_totals_that_overflow() {
        let list = PriceList::from_toml_str(
            r#"
            [[prices]]
            service = "AmazonEC2"
            region = "us-east-1"
            sku = "HUGE"
            unit_price = "79228162514264337593543950335"
            unit = "GB-Mo"

            [[prices]]
            service = "AmazonEC2"
            region = "us-east-1"
            sku = "SMALL"
            unit_price = "0.0208"
            unit = "Hrs"
            "#,
        )
        .expect("parse");
        let error = list
            .cost_report(&ToolCall::new("AmazonEC2", "generate_cost_report"))
            .expect_err("overflow");
        assert!(matches!(error, ProxyError::InvalidParameters(_)));
    }

    #[test]
    fn malformed_toml_is_a_price_list_error() {
        let error = PriceList::from_toml_str("[[prices]]\nservice = 1").expect_err("bad file");
        assert!(matches!(error, ProxyError::PriceList(_)));
    }

    #[tokio::test]
    async fn backend_dispatches_by_operation() {
        let list = PriceList::builtin();

        let codes = list
            .execute(&ToolCall::new("", "get_pricing_service_codes"))
            .await
            .expect("codes");
        assert_eq!(codes, json!({"serviceCodes": ["AWSLambda", "AmazonEC2", "AmazonS3"]}));

        let values = list
            .execute(
                &ToolCall::new("AmazonEC2", "get_pricing_attribute_values")
                    .filter(ToolFilter::equals("operatingSystem", "")),
            )
            .await
            .expect("values");
        assert_eq!(values["values"]["operatingSystem"], json!(["Linux", "Windows"]));

        let unknown = list.execute(&ToolCall::new("AmazonEC2", "delete_everything")).await;
        assert!(matches!(unknown, Err(ProxyError::UnknownOperation(_))));
        assert_eq!(list.operations().len(), 5);
    }
}
