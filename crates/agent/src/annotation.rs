//! Best-effort scraping of cost figures out of free-text answers.
//!
//! Output only enriches display metadata. A miss here never changes routing,
//! status or data source.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use rust_decimal::Decimal;
use tracing::warn;
use waypoint_core::domain::cost::ExtractedCosts;

const AMOUNT: &str = r"\$\s?([0-9][0-9,]*(?:\.[0-9]+)?)";

const KNOWN_SERVICES: &[&str] = &[
    "EC2",
    "RDS",
    "S3",
    "Lambda",
    "ELB",
    "ALB",
    "NLB",
    "EBS",
    "DynamoDB",
    "CloudFront",
    "ECS",
    "EKS",
    "Fargate",
    "ElastiCache",
    "NAT Gateway",
];

struct CostPatterns {
    monthly_after: Regex,
    monthly_label: Regex,
    annual_after: Regex,
    annual_label: Regex,
    hourly: Regex,
    service: Regex,
}

impl CostPatterns {
    fn compile() -> Result<Self, regex::Error> {
        let services = KNOWN_SERVICES
            .iter()
            .map(|service| regex::escape(service))
            .collect::<Vec<_>>()
            .join("|");
        Ok(Self {
            monthly_after: Regex::new(&format!(r"(?i){AMOUNT}\s*(?:/\s*|per\s+|a\s+|each\s+)?(?:month|mo\b)"))?,
            monthly_label: Regex::new(&format!(r"(?i)\bmonthly\b[^$\n]{{0,40}}{AMOUNT}"))?,
            annual_after: Regex::new(&format!(r"(?i){AMOUNT}\s*(?:/\s*|per\s+|a\s+|each\s+)?(?:year|yr\b|annual)"))?,
            annual_label: Regex::new(&format!(r"(?i)\b(?:annual|annually|yearly)\b[^$\n]{{0,40}}{AMOUNT}"))?,
            hourly: Regex::new(&format!(r"(?i){AMOUNT}\s*(?:/\s*|per\s+|an\s+|each\s+)?(?:hour|hr\b)"))?,
            service: Regex::new(&format!(r"(?i)\b({services})\b[^$\n]{{0,60}}?{AMOUNT}"))?,
        })
    }
}

fn patterns() -> Option<&'static CostPatterns> {
    static PATTERNS: OnceLock<Option<CostPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| match CostPatterns::compile() {
            Ok(patterns) => Some(patterns),
            Err(error) => {
                warn!(
                    event_name = "annotation.patterns.invalid",
                    error = %error,
                    "cost annotation disabled"
                );
                None
            }
        })
        .as_ref()
}

/// Returns `None` when nothing recognizable was found.
pub fn annotate_costs(text: &str) -> Option<ExtractedCosts> {
    let costs = extract_costs(text);
    (!costs.is_empty()).then_some(costs)
}

pub fn extract_costs(text: &str) -> ExtractedCosts {
    let mut costs = ExtractedCosts {
        monthly_total: None,
        annual_total: None,
        hourly_rates: Vec::new(),
        service_breakdown: BTreeMap::new(),
        currency: "USD".to_string(),
    };
    let Some(patterns) = patterns() else {
        return costs;
    };
    let plain = strip_markdown(text);

    costs.monthly_total = last_amount(&patterns.monthly_after, &plain)
        .or_else(|| last_amount(&patterns.monthly_label, &plain));
    costs.annual_total = last_amount(&patterns.annual_after, &plain)
        .or_else(|| last_amount(&patterns.annual_label, &plain));
    costs.hourly_rates =
        patterns.hourly.captures_iter(&plain).filter_map(|captures| amount(&captures, 1)).collect();

    for captures in patterns.service.captures_iter(&plain) {
        let (Some(name), Some(value)) = (captures.get(1), amount(&captures, 2)) else {
            continue;
        };
        let canonical = KNOWN_SERVICES
            .iter()
            .find(|service| service.eq_ignore_ascii_case(name.as_str()))
            .map(|service| service.to_string())
            .unwrap_or_else(|| name.as_str().to_string());
        costs.service_breakdown.entry(canonical).or_insert(value);
    }

    costs
}

/// Drops bold, underline-bold and code wrappers so `**$12.34**` reads as
/// `$12.34`.
fn strip_markdown(text: &str) -> String {
    text.replace("**", "").replace("__", "").replace('`', "")
}

fn last_amount(pattern: &Regex, text: &str) -> Option<Decimal> {
    pattern.captures_iter(text).filter_map(|captures| amount(&captures, 1)).last()
}

fn amount(captures: &Captures<'_>, group: usize) -> Option<Decimal> {
    let raw = captures.get(group)?.as_str().replace(',', "");
    Decimal::from_str(&raw).ok()
}
