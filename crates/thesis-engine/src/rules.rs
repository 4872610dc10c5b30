use analysis_core::{
    AnalysisError, MetricStanding, RedFlag, Thesis, ThesisContext, ThesisGenerator,
    ThesisGeneratorKind,
};
use async_trait::async_trait;
use std::fmt::Write as _;

// Thresholds for the activist playbook. Fixed — the rule-based path must be
// reproducible run to run.
const EXCESS_CASH_PCT_OF_MARKET_CAP: f64 = 10.0;
const OUTSIZED_COMP_PCT_OF_NET_INCOME: f64 = 0.5;
const WEAK_SAY_ON_PAY_PCT: f64 = 70.0;
const MIN_BOARD_INDEPENDENCE: f64 = 0.5;
const STALE_BOARD_TENURE_YEARS: f64 = 10.0;

/// Governance and capital-allocation red flags, derived from extracted
/// fields and computed metrics. Shared by both thesis generators so the
/// report shows the same catalysts either way.
pub fn detect_red_flags(context: &ThesisContext) -> Vec<RedFlag> {
    let mut flags = Vec::new();
    let fields = &context.fields;

    if let Some(cash_pct) = context.metrics.value("cash_to_market_cap") {
        if cash_pct > EXCESS_CASH_PCT_OF_MARKET_CAP {
            flags.push(RedFlag {
                name: "excess_cash".to_string(),
                detail: format!(
                    "Cash equals {:.1}% of market cap; capital could be returned to shareholders",
                    cash_pct
                ),
            });
        }
    }

    if let (Some(comp), Some(net_income)) =
        (fields.ceo_total_comp.value, fields.net_income.value)
    {
        if net_income > 0.0 && comp / net_income * 100.0 > OUTSIZED_COMP_PCT_OF_NET_INCOME {
            flags.push(RedFlag {
                name: "outsized_ceo_pay".to_string(),
                detail: format!(
                    "CEO total compensation is {:.2}% of net income",
                    comp / net_income * 100.0
                ),
            });
        }
    }

    if let Some(approval) = fields.say_on_pay_approval_pct.value {
        if approval < WEAK_SAY_ON_PAY_PCT {
            flags.push(RedFlag {
                name: "weak_say_on_pay".to_string(),
                detail: format!("Say-on-pay approval at {:.1}% signals shareholder discontent", approval),
            });
        }
    }

    if let (Some(independent), Some(board)) =
        (fields.independent_directors.value, fields.board_size.value)
    {
        if board > 0.0 && independent / board < MIN_BOARD_INDEPENDENCE {
            flags.push(RedFlag {
                name: "low_board_independence".to_string(),
                detail: format!(
                    "Only {:.0} of {:.0} directors are independent",
                    independent, board
                ),
            });
        }
    }

    if let Some(tenure) = fields.average_director_tenure.value {
        if tenure > STALE_BOARD_TENURE_YEARS {
            flags.push(RedFlag {
                name: "stale_board".to_string(),
                detail: format!("Average director tenure of {:.1} years suggests entrenchment", tenure),
            });
        }
    }

    flags
}

/// Conviction tier from evidence density: how many ratios actually computed
/// and how many catalysts fired.
pub(crate) fn conviction_tier(context: &ThesisContext, flag_count: usize) -> &'static str {
    let computed = context
        .metrics
        .metrics
        .values()
        .filter(|m| m.value.is_some())
        .count();
    if flag_count >= 2 && computed >= 4 {
        "HIGH"
    } else if flag_count >= 1 || computed >= 4 {
        "MODERATE"
    } else {
        "LOW"
    }
}

fn roe_below_peer_median(context: &ThesisContext) -> Option<bool> {
    let comparison = context.peer_comparison.as_ref()?;
    match comparison.standings.get("roe")? {
        MetricStanding::Ranked { gap_to_median, .. } => Some(*gap_to_median < 0.0),
        MetricStanding::InsufficientPeerData { .. } => None,
    }
}

/// Deterministic thesis generator. Identical inputs produce identical output,
/// with no external calls — this is the path every run can count on.
pub struct RuleBasedThesis;

impl RuleBasedThesis {
    pub fn new() -> Self {
        Self
    }

    fn recommendation(context: &ThesisContext, flags: &[RedFlag]) -> String {
        let lagging_roe = roe_below_peer_median(context);
        let excess_cash = flags.iter().any(|f| f.name == "excess_cash");
        let governance_flags = flags
            .iter()
            .filter(|f| f.name != "excess_cash")
            .count();

        if lagging_roe == Some(true) && excess_cash {
            "Capital-return campaign: returns lag peers while excess cash sits idle; push for buybacks or a special dividend".to_string()
        } else if governance_flags >= 2 {
            "Governance engagement: multiple board and compensation red flags warrant a shareholder campaign".to_string()
        } else if lagging_roe == Some(false) && flags.is_empty() {
            "Constructive hold: returns lead peers with no activist catalysts identified".to_string()
        } else {
            "Monitor: insufficient catalysts for an activist position at this time".to_string()
        }
    }

    fn narrative(context: &ThesisContext, flags: &[RedFlag], recommendation: &str) -> String {
        let mut out = String::new();
        let name = context
            .company_name
            .as_deref()
            .unwrap_or(context.ticker.as_str());
        let _ = writeln!(out, "## Investment thesis: {} ({})", name, context.ticker);
        let _ = writeln!(out, "\n**Recommendation:** {}\n", recommendation);

        let _ = writeln!(out, "### Key metrics");
        for (metric, value) in &context.metrics.metrics {
            match value.value {
                Some(v) => {
                    let _ = writeln!(out, "- {}: {:.2}", metric, v);
                }
                None => {
                    let _ = writeln!(
                        out,
                        "- {}: n/a ({})",
                        metric,
                        value.reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
        }

        if let Some(comparison) = &context.peer_comparison {
            let _ = writeln!(out, "\n### Peer standing ({} peers)", comparison.peer_group.len());
            for (metric, standing) in &comparison.standings {
                match standing {
                    MetricStanding::Ranked { percentile, rank, peer_count, gap_to_median, .. } => {
                        let _ = writeln!(
                            out,
                            "- {}: rank {} of {} (p{:.0}, {:+.1} vs median)",
                            metric,
                            rank,
                            peer_count + 1,
                            percentile,
                            gap_to_median
                        );
                    }
                    MetricStanding::InsufficientPeerData { peer_count } => {
                        let _ = writeln!(out, "- {}: insufficient peer data ({} comparable)", metric, peer_count);
                    }
                }
            }
        }

        if flags.is_empty() {
            let _ = writeln!(out, "\nNo governance or capital-allocation red flags detected.");
        } else {
            let _ = writeln!(out, "\n### Red flags");
            for flag in flags {
                let _ = writeln!(out, "- {}", flag.detail);
            }
        }

        out
    }
}

impl Default for RuleBasedThesis {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ThesisGenerator for RuleBasedThesis {
    async fn generate(&self, context: &ThesisContext) -> Result<Thesis, AnalysisError> {
        let red_flags = detect_red_flags(context);
        let recommendation = Self::recommendation(context, &red_flags);
        let narrative = Self::narrative(context, &red_flags, &recommendation);
        let conviction = conviction_tier(context, red_flags.len()).to_string();

        Ok(Thesis {
            recommendation,
            conviction,
            narrative,
            red_flags,
            generator: ThesisGeneratorKind::RuleBased,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{
        ExtractedFields, FieldValue, MarketSnapshot, MetricSet, MetricValue, PeerComparison,
    };
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn metric(value: Option<f64>) -> MetricValue {
        MetricValue {
            value,
            inputs: BTreeMap::new(),
            reason: value.is_none().then(|| "missing input: test".to_string()),
        }
    }

    fn context(roe_gap: f64, cash_pct: f64) -> ThesisContext {
        let mut metrics = BTreeMap::new();
        metrics.insert("roe".to_string(), metric(Some(12.0)));
        metrics.insert("cash_to_market_cap".to_string(), metric(Some(cash_pct)));
        metrics.insert("operating_margin".to_string(), metric(Some(22.0)));
        metrics.insert("net_margin".to_string(), metric(Some(18.0)));

        let mut standings = BTreeMap::new();
        standings.insert(
            "roe".to_string(),
            MetricStanding::Ranked {
                subject: 12.0,
                peer_min: 8.0,
                peer_median: 12.0 - roe_gap,
                peer_max: 38.0,
                percentile: 25.0,
                rank: 3,
                peer_count: 3,
                gap_to_median: roe_gap,
            },
        );

        let computed_at = Utc.with_ymd_and_hms(2024, 11, 1, 0, 0, 0).unwrap();
        ThesisContext {
            ticker: "AAPL".to_string(),
            company_name: Some("Apple Inc.".to_string()),
            fields: ExtractedFields::default(),
            snapshot: MarketSnapshot::estimated("AAPL"),
            metrics: MetricSet {
                ticker: "AAPL".to_string(),
                computed_at,
                metrics,
            },
            peer_comparison: Some(PeerComparison {
                ticker: "AAPL".to_string(),
                peer_group: vec!["MSFT".into(), "GOOGL".into(), "AMZN".into()],
                standings,
                valuation_gap: None,
            }),
        }
    }

    #[tokio::test]
    async fn lagging_roe_plus_excess_cash_means_capital_return() {
        let thesis = RuleBasedThesis::new()
            .generate(&context(-5.0, 15.0))
            .await
            .unwrap();
        assert!(thesis.recommendation.starts_with("Capital-return campaign"));
        assert!(thesis.red_flags.iter().any(|f| f.name == "excess_cash"));
        assert_eq!(thesis.generator, ThesisGeneratorKind::RuleBased);
    }

    #[tokio::test]
    async fn leading_roe_with_no_flags_is_a_hold() {
        let thesis = RuleBasedThesis::new()
            .generate(&context(5.0, 2.0))
            .await
            .unwrap();
        assert!(thesis.recommendation.starts_with("Constructive hold"));
        assert!(thesis.red_flags.is_empty());
    }

    #[tokio::test]
    async fn governance_flags_trigger_engagement() {
        let mut ctx = context(5.0, 2.0);
        let mut fields = ExtractedFields::default();
        fields.say_on_pay_approval_pct = FieldValue::extracted(55.0);
        fields.board_size = FieldValue::extracted(10.0);
        fields.independent_directors = FieldValue::extracted(3.0);
        ctx.fields = fields;

        let thesis = RuleBasedThesis::new().generate(&ctx).await.unwrap();
        assert!(thesis.recommendation.starts_with("Governance engagement"));
        assert_eq!(thesis.red_flags.len(), 2);
        assert_eq!(thesis.conviction, "HIGH");
    }

    #[tokio::test]
    async fn identical_input_produces_identical_thesis() {
        let ctx = context(-5.0, 15.0);
        let engine = RuleBasedThesis::new();
        let a = engine.generate(&ctx).await.unwrap();
        let b = engine.generate(&ctx).await.unwrap();
        assert_eq!(a.recommendation, b.recommendation);
        assert_eq!(a.narrative, b.narrative);
        assert_eq!(a.conviction, b.conviction);
        assert_eq!(a.red_flags.len(), b.red_flags.len());
    }

    #[tokio::test]
    async fn narrative_reports_null_metrics_with_reasons() {
        let mut ctx = context(5.0, 2.0);
        ctx.metrics
            .metrics
            .insert("roic".to_string(), metric(None));

        let thesis = RuleBasedThesis::new().generate(&ctx).await.unwrap();
        assert!(thesis.narrative.contains("roic: n/a (missing input: test)"));
    }
}
