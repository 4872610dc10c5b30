use analysis_core::{ExtractedFields, MarketSnapshot, MetricSet, MetricValue};
use chrono::Utc;
use std::collections::BTreeMap;

pub const METRIC_ROE: &str = "roe";
pub const METRIC_ROIC: &str = "roic";
pub const METRIC_OPERATING_MARGIN: &str = "operating_margin";
pub const METRIC_NET_MARGIN: &str = "net_margin";
pub const METRIC_REVENUE_GROWTH: &str = "revenue_growth";
pub const METRIC_DEBT_TO_EQUITY: &str = "debt_to_equity";
pub const METRIC_CASH_TO_MARKET_CAP: &str = "cash_to_market_cap";

/// Pure ratio computation over extracted fields and a market snapshot.
///
/// Every ratio is present in the output map. A missing input or a zero
/// denominator yields a null value with a reason — never a zero, never a
/// dropped entry, never a panic.
pub struct MetricEngine;

impl MetricEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn compute(&self, fields: &ExtractedFields, snapshot: &MarketSnapshot) -> MetricSet {
        let net_income = fields.net_income.value;
        let equity = fields.shareholders_equity.value;
        let revenue = fields.revenue_current.value;
        let revenue_prior = fields.revenue_prior.value;
        let operating_income = fields.operating_income.value;
        let liabilities = fields.total_liabilities.value;
        let debt = fields.total_debt.value;
        let cash = fields.cash_equivalents.value;
        let market_cap = snapshot.market_cap;

        let mut metrics = BTreeMap::new();

        metrics.insert(
            METRIC_ROE.to_string(),
            div(("net_income", net_income), ("shareholders_equity", equity), 100.0),
        );

        // ROIC approximated as net income over invested capital (equity + debt).
        metrics.insert(
            METRIC_ROIC.to_string(),
            div(
                ("net_income", net_income),
                ("invested_capital", sum2(equity, debt)),
                100.0,
            )
            .with_extra_inputs(&[("shareholders_equity", equity), ("total_debt", debt)]),
        );

        metrics.insert(
            METRIC_OPERATING_MARGIN.to_string(),
            div(("operating_income", operating_income), ("revenue_current", revenue), 100.0),
        );

        metrics.insert(
            METRIC_NET_MARGIN.to_string(),
            div(("net_income", net_income), ("revenue_current", revenue), 100.0),
        );

        metrics.insert(
            METRIC_REVENUE_GROWTH.to_string(),
            div(
                ("revenue_delta", diff(revenue, revenue_prior)),
                ("revenue_prior", revenue_prior),
                100.0,
            )
            .with_extra_inputs(&[("revenue_current", revenue)]),
        );

        metrics.insert(
            METRIC_DEBT_TO_EQUITY.to_string(),
            div(("total_liabilities", liabilities), ("shareholders_equity", equity), 1.0),
        );

        metrics.insert(
            METRIC_CASH_TO_MARKET_CAP.to_string(),
            div(("cash_equivalents", cash), ("market_cap", market_cap), 100.0),
        );

        MetricSet {
            ticker: snapshot.ticker.clone(),
            computed_at: Utc::now(),
            metrics,
        }
    }
}

impl Default for MetricEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn sum2(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    Some(a? + b?)
}

fn diff(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    Some(a? - b?)
}

/// Numerator over denominator with explicit null propagation.
fn div(numer: (&str, Option<f64>), denom: (&str, Option<f64>), scale: f64) -> MetricValue {
    let mut inputs = BTreeMap::new();
    inputs.insert(numer.0.to_string(), numer.1);
    inputs.insert(denom.0.to_string(), denom.1);

    let (value, reason) = match (numer.1, denom.1) {
        (None, _) => (None, Some(format!("missing input: {}", numer.0))),
        (_, None) => (None, Some(format!("missing input: {}", denom.0))),
        (_, Some(d)) if d == 0.0 => (None, Some(format!("zero denominator: {}", denom.0))),
        (Some(n), Some(d)) => (Some(n / d * scale), None),
    };

    MetricValue { value, inputs, reason }
}

trait WithExtraInputs {
    fn with_extra_inputs(self, extra: &[(&str, Option<f64>)]) -> Self;
}

impl WithExtraInputs for MetricValue {
    fn with_extra_inputs(mut self, extra: &[(&str, Option<f64>)]) -> Self {
        for (name, value) in extra {
            self.inputs.insert((*name).to_string(), *value);
        }
        self
    }
}
