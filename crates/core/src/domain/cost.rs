use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Billing convention for always-on resources.
pub const HOURS_PER_MONTH: u32 = 730;
pub const MONTHS_PER_YEAR: u32 = 12;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceUnit {
    Hourly,
    Monthly,
    PerRequest,
    Other,
}

impl PriceUnit {
    /// Maps the unit labels price lists commonly use.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "hrs" | "hr" | "hour" | "hours" | "hourly" => Self::Hourly,
            "gb-mo" | "month" | "monthly" | "mo" | "gb-month" => Self::Monthly,
            "requests" | "request" | "req" => Self::PerRequest,
            _ => Self::Other,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CostLineItem {
    pub service: String,
    pub description: String,
    pub region: Option<String>,
    pub unit: PriceUnit,
    pub unit_price: Decimal,
    pub monthly_quantity: Decimal,
    pub monthly_cost: Decimal,
}

impl CostLineItem {
    /// `None` when the monthly cost does not fit in a `Decimal`.
    pub fn hourly(
        service: impl Into<String>,
        description: impl Into<String>,
        region: Option<String>,
        unit_price: Decimal,
    ) -> Option<Self> {
        let monthly_quantity = Decimal::from(HOURS_PER_MONTH);
        let monthly_cost = unit_price.checked_mul(monthly_quantity)?;
        Some(Self {
            service: service.into(),
            description: description.into(),
            region,
            unit: PriceUnit::Hourly,
            unit_price,
            monthly_quantity,
            monthly_cost,
        })
    }

    pub fn monthly(
        service: impl Into<String>,
        description: impl Into<String>,
        region: Option<String>,
        unit_price: Decimal,
    ) -> Self {
        Self {
            service: service.into(),
            description: description.into(),
            region,
            unit: PriceUnit::Monthly,
            unit_price,
            monthly_quantity: Decimal::ONE,
            monthly_cost: unit_price,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub currency: String,
    pub line_items: Vec<CostLineItem>,
    pub monthly_total: Decimal,
    pub annual_total: Decimal,
    pub usage_hours_per_month: u32,
}

impl CostBreakdown {
    /// `None` when the totals overflow a `Decimal`.
    pub fn from_line_items(
        currency: impl Into<String>,
        line_items: Vec<CostLineItem>,
    ) -> Option<Self> {
        let monthly_total = line_items
            .iter()
            .try_fold(Decimal::ZERO, |total, item| total.checked_add(item.monthly_cost))?;
        let annual_total = monthly_total.checked_mul(Decimal::from(MONTHS_PER_YEAR))?;
        Some(Self {
            currency: currency.into(),
            line_items,
            monthly_total,
            annual_total,
            usage_hours_per_month: HOURS_PER_MONTH,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.line_items.is_empty()
    }
}

/// Figures scraped from free text. Display-only; never used for decisions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedCosts {
    pub monthly_total: Option<Decimal>,
    pub annual_total: Option<Decimal>,
    pub hourly_rates: Vec<Decimal>,
    pub service_breakdown: BTreeMap<String, Decimal>,
    pub currency: String,
}

impl ExtractedCosts {
    pub fn is_empty(&self) -> bool {
        self.monthly_total.is_none()
            && self.annual_total.is_none()
            && self.hourly_rates.is_empty()
            && self.service_breakdown.is_empty()
    }
}

/// Success payload of the `get_pricing` tool operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingPayload {
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub products: Vec<PricedProduct>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedProduct {
    pub sku: String,
    #[serde(default)]
    pub description: String,
    pub unit_price: Decimal,
    pub unit: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl PricingPayload {
    /// Prices every product with a monthly usage assumption. `None` when the
    /// totals overflow.
    pub fn cost_report(&self) -> Option<CostReport> {
        let mut line_items = Vec::new();
        let mut unpriced_skus = Vec::new();
        for product in &self.products {
            match product.line_item(&self.service, self.region.clone()) {
                Some(item) => line_items.push(item),
                None => unpriced_skus.push(product.sku.clone()),
            }
        }
        let breakdown = CostBreakdown::from_line_items(self.currency.clone(), line_items)?;
        let region = self.region.as_deref().unwrap_or("all regions");
        let summary = if breakdown.is_empty() {
            format!("{} in {region}: no product has an hourly or monthly price", self.service)
        } else {
            format!(
                "{} in {region}: {} priced products, {} {currency}/month, {} {currency}/year \
                 at {HOURS_PER_MONTH} hours per month",
                self.service,
                breakdown.line_items.len(),
                breakdown.monthly_total,
                breakdown.annual_total,
                currency = breakdown.currency,
            )
        };
        Some(CostReport {
            service: self.service.clone(),
            region: self.region.clone(),
            breakdown,
            unpriced_skus,
            summary,
        })
    }
}

/// Success payload of the `generate_cost_report` tool operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostReport {
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub breakdown: CostBreakdown,
    /// Products billed per request or in units with no usage assumption.
    #[serde(default)]
    pub unpriced_skus: Vec<String>,
    pub summary: String,
}

impl PricedProduct {
    /// Hourly and monthly prices become a line item; other units have no
    /// usage assumption to price against. An hourly price too large to
    /// extend to a month yields `None` as well.
    pub fn line_item(&self, service: &str, region: Option<String>) -> Option<CostLineItem> {
        let description = if self.description.is_empty() {
            self.attributes.get("instanceType").cloned().unwrap_or_else(|| self.sku.clone())
        } else {
            self.description.clone()
        };
        match PriceUnit::parse(&self.unit) {
            PriceUnit::Hourly => {
                CostLineItem::hourly(service, description, region, self.unit_price)
            }
            PriceUnit::Monthly => {
                Some(CostLineItem::monthly(service, description, region, self.unit_price))
            }
            PriceUnit::PerRequest | PriceUnit::Other => None,
        }
    }
}

fn default_currency() -> String {
    "USD".to_string()
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{CostBreakdown, CostLineItem, PriceUnit, PricingPayload, HOURS_PER_MONTH};

    fn mixed_payload() -> PricingPayload {
        serde_json::from_value(serde_json::json!({
            "service": "AmazonEC2",
            "region": "us-east-1",
            "products": [
                {"sku": "SKU1", "unitPrice": "0.0208", "unit": "Hrs"},
                {"sku": "SKU2", "unitPrice": "0.0000002", "unit": "Requests"},
                {"sku": "SKU3", "unitPrice": "2.30", "unit": "GB-Mo"}
            ]
        }))
        .expect("deserialize")
    }

    #[test]
    fn hourly_line_uses_documented_usage_hours() {
        let price = Decimal::new(208, 4);
        let item = CostLineItem::hourly("AmazonEC2", "t3.small", Some("us-east-1".into()), price)
            .expect("priced");
        assert_eq!(item.monthly_cost, price * Decimal::from(HOURS_PER_MONTH));
        assert_eq!(item.monthly_cost, Decimal::new(15184, 3));
    }

    #[test]
    fn breakdown_sums_lines_and_annualizes() {
        let breakdown = CostBreakdown::from_line_items(
            "USD",
            vec![
                CostLineItem::hourly("AmazonEC2", "t3.small", None, Decimal::new(208, 4))
                    .expect("priced"),
                CostLineItem::monthly("AmazonS3", "100 GB", None, Decimal::new(230, 2)),
            ],
        )
        .expect("totals fit");
        assert_eq!(breakdown.monthly_total, Decimal::new(17484, 3));
        assert_eq!(breakdown.annual_total, Decimal::new(209808, 3));
        assert!(!breakdown.is_empty());
    }

    #[test]
    fn oversized_prices_do_not_overflow() {
        assert!(CostLineItem::hourly("AmazonEC2", "huge", None, Decimal::MAX).is_none());

        let big = CostLineItem::monthly("AmazonS3", "huge", None, Decimal::MAX);
        assert!(CostBreakdown::from_line_items("USD", vec![big.clone(), big.clone()]).is_none());
        // Fits per month but not per year.
        assert!(CostBreakdown::from_line_items("USD", vec![big]).is_none());
    }

    #[test]
    fn cost_report_prices_every_billable_product() {
        let report = mixed_payload().cost_report().expect("report");
        assert_eq!(report.breakdown.line_items.len(), 2);
        assert_eq!(report.breakdown.monthly_total, Decimal::new(17484, 3));
        assert_eq!(report.unpriced_skus, vec!["SKU2".to_string()]);
        assert!(report.summary.starts_with("AmazonEC2 in us-east-1: 2 priced products"));
    }

    #[test]
    fn cost_report_overflow_is_none() {
        let mut payload = mixed_payload();
        payload.products[2].unit_price = Decimal::MAX;
        assert!(payload.cost_report().is_none());
    }

    #[test]
    fn price_unit_labels_are_recognized() {
        assert_eq!(PriceUnit::parse("Hrs"), PriceUnit::Hourly);
        assert_eq!(PriceUnit::parse("GB-Mo"), PriceUnit::Monthly);
        assert_eq!(PriceUnit::parse("Requests"), PriceUnit::PerRequest);
        assert_eq!(PriceUnit::parse("IOPS"), PriceUnit::Other);
    }

    #[test]
    fn pricing_payload_reads_string_prices() {
        let payload: PricingPayload = serde_json::from_value(serde_json::json!({
            "service": "AmazonEC2",
            "region": "us-east-1",
            "products": [
                {"sku": "SKU1", "unitPrice": "0.0208", "unit": "Hrs",
                 "attributes": {"instanceType": "t3.small"}},
                {"sku": "SKU2", "unitPrice": "0.0000002", "unit": "Requests"}
            ]
        }))
        .expect("deserialize");
        assert_eq!(payload.currency, "USD");

        let hourly = payload.products[0]
            .line_item(&payload.service, payload.region.clone())
            .expect("hourly price");
        assert_eq!(hourly.description, "t3.small");
        assert_eq!(hourly.monthly_cost, Decimal::new(15184, 3));
        assert!(payload.products[1].line_item(&payload.service, None).is_none());
    }
}
