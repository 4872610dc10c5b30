//! Markdown rendering of a completed analysis record. Every value carries its
//! provenance label, nulls print as `n/a` with the reason, and the status log
//! at the bottom shows how degraded the run was.

use analysis_core::{
    AnalysisRecord, FieldValue, MetricStanding, Provenance, StageOutcome, ThesisGeneratorKind,
};
use std::fmt::Write as _;

pub fn render(record: &AnalysisRecord) -> String {
    let mut out = String::new();
    let name = record
        .company_name
        .as_deref()
        .unwrap_or(record.ticker.as_str());

    let _ = writeln!(out, "# Catalyst report: {} ({})", name, record.ticker);
    let _ = writeln!(
        out,
        "\nGenerated {}\n",
        record.generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(out, "**Recommendation:** {}", record.thesis.recommendation);
    let _ = writeln!(out, "**Conviction:** {}", record.thesis.conviction);
    let generator = match record.thesis.generator {
        ThesisGeneratorKind::LanguageModel => "language model",
        ThesisGeneratorKind::RuleBased => "rule-based",
    };
    let _ = writeln!(out, "**Thesis generator:** {}\n", generator);

    snapshot_section(&mut out, record);
    documents_section(&mut out, record);
    fields_section(&mut out, record);
    metrics_section(&mut out, record);
    peers_section(&mut out, record);
    red_flags_section(&mut out, record);

    let _ = writeln!(out, "## Thesis\n");
    let _ = writeln!(out, "{}", record.thesis.narrative.trim_end());

    status_section(&mut out, record);
    out
}

fn provenance_label(p: Provenance) -> &'static str {
    match p {
        Provenance::Extracted => "extracted",
        Provenance::Live => "live",
        Provenance::Estimated => "estimated",
    }
}

fn opt(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}", v),
        None => "n/a".to_string(),
    }
}

fn snapshot_section(out: &mut String, record: &AnalysisRecord) {
    let snap = &record.snapshot;
    let _ = writeln!(
        out,
        "\n## Market snapshot [{}]\n",
        provenance_label(snap.provenance)
    );
    let _ = writeln!(out, "| Metric | Value |");
    let _ = writeln!(out, "|---|---|");
    let _ = writeln!(out, "| Price | {} |", opt(snap.price));
    let _ = writeln!(out, "| Market cap | {} |", opt(snap.market_cap));
    let _ = writeln!(out, "| P/E ratio | {} |", opt(snap.pe_ratio));
    let _ = writeln!(out, "| 52-week high | {} |", opt(snap.fifty_two_week_high));
    let _ = writeln!(out, "| 52-week low | {} |", opt(snap.fifty_two_week_low));
    let _ = writeln!(out, "| As of | {} |", snap.as_of.format("%Y-%m-%d %H:%M UTC"));
}

fn documents_section(out: &mut String, record: &AnalysisRecord) {
    let _ = writeln!(out, "\n## Source documents\n");
    if record.documents.is_empty() {
        let _ = writeln!(out, "None retrieved.");
        return;
    }
    for doc in &record.documents {
        let _ = writeln!(
            out,
            "- {} filed {} ({})",
            doc.kind.form_name(),
            doc.filed_on,
            doc.source_url
        );
    }
}

fn fields_section(out: &mut String, record: &AnalysisRecord) {
    let f = &record.fields;
    let rows: [(&str, &FieldValue); 16] = [
        ("Revenue (current year)", &f.revenue_current),
        ("Revenue (prior year)", &f.revenue_prior),
        ("Operating income", &f.operating_income),
        ("Net income", &f.net_income),
        ("Total assets", &f.total_assets),
        ("Total liabilities", &f.total_liabilities),
        ("Shareholders' equity", &f.shareholders_equity),
        ("Cash and equivalents", &f.cash_equivalents),
        ("Total debt", &f.total_debt),
        ("Shares outstanding", &f.shares_outstanding),
        ("CEO total compensation", &f.ceo_total_comp),
        ("CEO base salary", &f.ceo_base_salary),
        ("Say-on-pay approval %", &f.say_on_pay_approval_pct),
        ("Board size", &f.board_size),
        ("Independent directors", &f.independent_directors),
        ("Average director tenure", &f.average_director_tenure),
    ];

    let _ = writeln!(
        out,
        "\n## Extracted fields ({} of {} present)\n",
        f.present_count(),
        rows.len()
    );
    let _ = writeln!(out, "| Field | Value | Provenance |");
    let _ = writeln!(out, "|---|---|---|");
    for (label, field) in rows {
        let _ = writeln!(
            out,
            "| {} | {} | {} |",
            label,
            opt(field.value),
            provenance_label(field.provenance)
        );
    }
}

fn metrics_section(out: &mut String, record: &AnalysisRecord) {
    let _ = writeln!(out, "\n## Derived metrics\n");
    for (name, metric) in &record.metrics.metrics {
        match metric.value {
            Some(v) => {
                let _ = writeln!(out, "- {}: {:.2}", name, v);
            }
            None => {
                let _ = writeln!(
                    out,
                    "- {}: n/a ({})",
                    name,
                    metric.reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }
}

fn peers_section(out: &mut String, record: &AnalysisRecord) {
    let Some(comparison) = &record.peer_comparison else {
        return;
    };
    let _ = writeln!(
        out,
        "\n## Peer benchmark vs {}\n",
        comparison.peer_group.join(", ")
    );
    for (name, standing) in &comparison.standings {
        match standing {
            MetricStanding::Ranked {
                subject,
                peer_median,
                percentile,
                rank,
                peer_count,
                ..
            } => {
                let _ = writeln!(
                    out,
                    "- {}: {:.2} vs median {:.2} (rank {} of {}, p{:.0})",
                    name,
                    subject,
                    peer_median,
                    rank,
                    peer_count + 1,
                    percentile
                );
            }
            MetricStanding::InsufficientPeerData { peer_count } => {
                let _ = writeln!(
                    out,
                    "- {}: insufficient peer data ({} comparable)",
                    name, peer_count
                );
            }
        }
    }

    if let Some(gap) = &comparison.valuation_gap {
        let _ = writeln!(
            out,
            "\nValuation gap: {:+.1}% vs peer median",
            gap.upside_to_peer_median_pct
        );
        if let Some(implied) = gap.implied_market_cap {
            let _ = writeln!(out, "Implied market cap at peer median: {:.0}", implied);
        }
    }
}

fn red_flags_section(out: &mut String, record: &AnalysisRecord) {
    if record.thesis.red_flags.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n## Red flags\n");
    for flag in &record.thesis.red_flags {
        let _ = writeln!(out, "- **{}**: {}", flag.name, flag.detail);
    }
}

fn status_section(out: &mut String, record: &AnalysisRecord) {
    let _ = writeln!(out, "\n## Pipeline status\n");
    let _ = writeln!(out, "| Stage | Outcome | Detail |");
    let _ = writeln!(out, "|---|---|---|");
    for status in &record.status_log {
        let (label, detail) = match &status.outcome {
            StageOutcome::Success => ("success", String::new()),
            StageOutcome::Fallback { reason } => ("fallback", reason.clone()),
            StageOutcome::Failed { reason } => ("failed", reason.clone()),
            StageOutcome::Skipped { reason } => ("skipped", reason.clone()),
        };
        let _ = writeln!(out, "| {} | {} | {} |", status.stage.as_str(), label, detail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{
        ExtractedFields, MarketSnapshot, MetricSet, MetricValue, PeerComparison, RedFlag, Stage,
        StageStatus, Thesis, ValuationGap,
    };
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn record() -> AnalysisRecord {
        let mut metrics = BTreeMap::new();
        metrics.insert(
            "roe".to_string(),
            MetricValue {
                value: Some(42.5),
                inputs: BTreeMap::new(),
                reason: None,
            },
        );
        metrics.insert(
            "roic".to_string(),
            MetricValue {
                value: None,
                inputs: BTreeMap::new(),
                reason: Some("missing input: total_debt".to_string()),
            },
        );

        let mut fields = ExtractedFields::default();
        fields.net_income = analysis_core::FieldValue::extracted(97_000_000_000.0);

        AnalysisRecord {
            ticker: "AAPL".to_string(),
            company_name: Some("Apple Inc.".to_string()),
            generated_at: Utc::now(),
            documents: Vec::new(),
            fields,
            snapshot: MarketSnapshot::estimated("AAPL"),
            metrics: MetricSet {
                ticker: "AAPL".to_string(),
                computed_at: Utc::now(),
                metrics,
            },
            peer_comparison: None,
            thesis: Thesis {
                recommendation: "Monitor: insufficient catalysts".to_string(),
                conviction: "LOW".to_string(),
                narrative: "## Investment thesis\n\nDetails here.".to_string(),
                red_flags: vec![RedFlag {
                    name: "excess_cash".to_string(),
                    detail: "Cash equals 12.0% of market cap".to_string(),
                }],
                generator: ThesisGeneratorKind::RuleBased,
            },
            status_log: vec![
                StageStatus {
                    stage: Stage::ResolveIdentifier,
                    outcome: StageOutcome::Success,
                    at: Utc::now(),
                },
                StageStatus {
                    stage: Stage::MarketQuote,
                    outcome: StageOutcome::Fallback {
                        reason: "live quote unavailable; estimated snapshot".to_string(),
                    },
                    at: Utc::now(),
                },
            ],
        }
    }

    #[test]
    fn nulls_render_as_na_with_reason() {
        let report = render(&record());
        assert!(report.contains("- roe: 42.50"));
        assert!(report.contains("- roic: n/a (missing input: total_debt)"));
        assert!(report.contains("| Price | n/a |"));
    }

    #[test]
    fn provenance_labels_are_visible() {
        let report = render(&record());
        assert!(report.contains("## Market snapshot [estimated]"));
        assert!(report.contains("| Net income | 97000000000.00 | extracted |"));
        assert!(report.contains("| Total debt | n/a | estimated |"));
    }

    #[test]
    fn status_log_and_red_flags_appear() {
        let report = render(&record());
        assert!(report.contains("| resolve_identifier | success |"));
        assert!(report.contains("| market_quote | fallback | live quote unavailable"));
        assert!(report.contains("**excess_cash**: Cash equals 12.0% of market cap"));
    }

    #[test]
    fn valuation_gap_renders_with_implied_market_cap() {
        let mut r = record();
        let mut standings = BTreeMap::new();
        standings.insert(
            "roe".to_string(),
            MetricStanding::Ranked {
                subject: 30.0,
                peer_min: 12.0,
                peer_median: 20.0,
                peer_max: 38.0,
                percentile: 66.7,
                rank: 2,
                peer_count: 3,
                gap_to_median: 10.0,
            },
        );
        r.peer_comparison = Some(PeerComparison {
            ticker: "AAPL".to_string(),
            peer_group: vec!["MSFT".into(), "GOOGL".into(), "AMZN".into()],
            standings,
            valuation_gap: Some(ValuationGap {
                upside_to_peer_median_pct: 25.0,
                implied_market_cap: Some(1250.0),
            }),
        });

        let report = render(&r);
        assert!(report.contains("Valuation gap: +25.0% vs peer median"));
        assert!(report.contains("Implied market cap at peer median: 1250"));
    }

    #[test]
    fn missing_company_name_falls_back_to_ticker() {
        let mut r = record();
        r.company_name = None;
        let report = render(&r);
        assert!(report.starts_with("# Catalyst report: AAPL (AAPL)"));
    }
}
