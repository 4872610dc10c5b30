use analysis_core::{MetricSet, MetricStanding, PeerComparison, ValuationGap};
use std::collections::BTreeMap;

/// Fewer comparable peers than this and a percentile would be a
/// single-point guess; the standing is reported as insufficient instead.
const MIN_COMPARABLE_PEERS: usize = 2;

// Performance-score weights and upside mapping. ROE carries the most
// weight; the neutral band collapses to a flat small upside.
const ROE_WEIGHT: f64 = 0.4;
const ROIC_WEIGHT: f64 = 0.3;
const MARGIN_WEIGHT: f64 = 0.3;
const OUTPERFORM_THRESHOLD: f64 = 1.1;
const UNDERPERFORM_THRESHOLD: f64 = 0.9;
const UPSIDE_PCT_PER_SCORE_UNIT: f64 = 50.0;
const DOWNSIDE_PCT_PER_SCORE_UNIT: f64 = 30.0;
const NEUTRAL_UPSIDE_PCT: f64 = 5.0;

/// Relative positioning of one company's metrics against a peer set.
pub struct PeerBenchmarkEngine;

impl PeerBenchmarkEngine {
    pub fn new() -> Self {
        Self
    }

    /// Rank every non-null subject metric against the peers that also have
    /// that metric non-null. Peers with the metric missing simply do not
    /// count toward that metric's comparison. `subject_market_cap` feeds the
    /// implied-valuation estimate; it contributes nothing to the rankings.
    pub fn compare(
        &self,
        subject: &MetricSet,
        subject_market_cap: Option<f64>,
        peers: &[MetricSet],
    ) -> PeerComparison {
        let mut standings = BTreeMap::new();

        for (name, metric) in &subject.metrics {
            let Some(subject_value) = metric.value else {
                // A null subject metric has nothing to rank.
                continue;
            };

            let peer_values: Vec<f64> = peers.iter().filter_map(|p| p.value(name)).collect();
            if peer_values.len() < MIN_COMPARABLE_PEERS {
                standings.insert(
                    name.clone(),
                    MetricStanding::InsufficientPeerData {
                        peer_count: peer_values.len(),
                    },
                );
                continue;
            }

            let mut sorted = peer_values.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

            let below = sorted.iter().filter(|&&v| v < subject_value).count();
            let above = sorted.iter().filter(|&&v| v > subject_value).count();
            let percentile = below as f64 / sorted.len() as f64 * 100.0;
            let peer_median = median(&sorted);

            standings.insert(
                name.clone(),
                MetricStanding::Ranked {
                    subject: subject_value,
                    peer_min: sorted[0],
                    peer_median,
                    peer_max: sorted[sorted.len() - 1],
                    percentile,
                    // Rank 1 = highest value; ties share the better rank.
                    rank: above + 1,
                    peer_count: sorted.len(),
                    gap_to_median: subject_value - peer_median,
                },
            );
        }

        let valuation_gap = valuation_gap(&standings, subject_market_cap);

        PeerComparison {
            ticker: subject.ticker.clone(),
            peer_group: peers.iter().map(|p| p.ticker.clone()).collect(),
            standings,
            valuation_gap,
        }
    }
}

/// Weighted subject-to-median performance score over the three return
/// metrics, mapped to a re-rating estimate. All three must have ranked
/// standings; a partial score would overstate whatever happens to be
/// present.
fn valuation_gap(
    standings: &BTreeMap<String, MetricStanding>,
    market_cap: Option<f64>,
) -> Option<ValuationGap> {
    let ratio = |name: &str| match standings.get(name)? {
        // Medians near zero would blow the ratio up; clamp the denominator.
        MetricStanding::Ranked { subject, peer_median, .. } => {
            Some(subject / peer_median.max(1.0))
        }
        MetricStanding::InsufficientPeerData { .. } => None,
    };

    let score = ratio("roe")? * ROE_WEIGHT
        + ratio("roic")? * ROIC_WEIGHT
        + ratio("operating_margin")? * MARGIN_WEIGHT;

    let upside = if score > OUTPERFORM_THRESHOLD {
        (score - 1.0) * UPSIDE_PCT_PER_SCORE_UNIT
    } else if score < UNDERPERFORM_THRESHOLD {
        (score - 1.0) * DOWNSIDE_PCT_PER_SCORE_UNIT
    } else {
        NEUTRAL_UPSIDE_PCT
    };

    Some(ValuationGap {
        upside_to_peer_median_pct: upside,
        implied_market_cap: market_cap.map(|mc| mc * (1.0 + upside / 100.0)),
    })
}

impl Default for PeerBenchmarkEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::MetricValue;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn metric_set(ticker: &str, values: &[(&str, Option<f64>)]) -> MetricSet {
        let mut metrics = BTreeMap::new();
        for (name, value) in values {
            metrics.insert(
                name.to_string(),
                MetricValue {
                    value: *value,
                    inputs: BTreeMap::new(),
                    reason: value.is_none().then(|| "missing input: test".to_string()),
                },
            );
        }
        MetricSet {
            ticker: ticker.to_string(),
            computed_at: Utc::now(),
            metrics,
        }
    }

    #[test]
    fn fewer_than_two_peers_is_insufficient() {
        let engine = PeerBenchmarkEngine::new();
        let subject = metric_set("AAPL", &[("roe", Some(30.0))]);
        let peers = vec![metric_set("MSFT", &[("roe", Some(38.0))])];

        let cmp = engine.compare(&subject, None, &peers);
        assert!(matches!(
            cmp.standings.get("roe"),
            Some(MetricStanding::InsufficientPeerData { peer_count: 1 })
        ));
    }

    #[test]
    fn rank_and_percentile_follow_sorted_peer_values() {
        let engine = PeerBenchmarkEngine::new();
        let subject = metric_set("AAPL", &[("roe", Some(30.0))]);
        let peers = vec![
            metric_set("MSFT", &[("roe", Some(38.0))]),
            metric_set("GOOGL", &[("roe", Some(26.0))]),
            metric_set("AMZN", &[("roe", Some(12.0))]),
        ];

        let cmp = engine.compare(&subject, None, &peers);
        match cmp.standings.get("roe").unwrap() {
            MetricStanding::Ranked {
                percentile,
                rank,
                peer_median,
                peer_min,
                peer_max,
                gap_to_median,
                ..
            } => {
                // Two of three peers are below 30.0.
                assert!((percentile - 200.0 / 3.0).abs() < 1e-9);
                assert_eq!(*rank, 2);
                assert_eq!(*peer_median, 26.0);
                assert_eq!(*peer_min, 12.0);
                assert_eq!(*peer_max, 38.0);
                assert_eq!(*gap_to_median, 4.0);
            }
            other => panic!("expected ranked standing, got {:?}", other),
        }
    }

    #[test]
    fn ties_share_the_better_rank() {
        let engine = PeerBenchmarkEngine::new();
        let subject = metric_set("AAPL", &[("roe", Some(26.0))]);
        let peers = vec![
            metric_set("MSFT", &[("roe", Some(26.0))]),
            metric_set("GOOGL", &[("roe", Some(26.0))]),
            metric_set("AMZN", &[("roe", Some(12.0))]),
        ];

        let cmp = engine.compare(&subject, None, &peers);
        match cmp.standings.get("roe").unwrap() {
            MetricStanding::Ranked { rank, percentile, .. } => {
                // No peer is strictly above; equals are not discarded.
                assert_eq!(*rank, 1);
                assert!((percentile - 100.0 / 3.0).abs() < 1e-9);
            }
            other => panic!("expected ranked standing, got {:?}", other),
        }
    }

    #[test]
    fn peers_missing_the_metric_do_not_count() {
        let engine = PeerBenchmarkEngine::new();
        let subject = metric_set("AAPL", &[("roe", Some(30.0))]);
        let peers = vec![
            metric_set("MSFT", &[("roe", Some(38.0))]),
            metric_set("GOOGL", &[("roe", None)]),
            metric_set("AMZN", &[]),
        ];

        let cmp = engine.compare(&subject, None, &peers);
        assert!(matches!(
            cmp.standings.get("roe"),
            Some(MetricStanding::InsufficientPeerData { peer_count: 1 })
        ));
        // The peer group still records everyone who was analyzed.
        assert_eq!(cmp.peer_group.len(), 3);
    }

    #[test]
    fn null_subject_metrics_are_not_ranked() {
        let engine = PeerBenchmarkEngine::new();
        let subject = metric_set("AAPL", &[("roe", None)]);
        let peers = vec![
            metric_set("MSFT", &[("roe", Some(38.0))]),
            metric_set("GOOGL", &[("roe", Some(26.0))]),
        ];

        let cmp = engine.compare(&subject, None, &peers);
        assert!(cmp.standings.is_empty());
    }

    fn return_metrics(roe: f64, roic: f64, margin: f64) -> Vec<(&'static str, Option<f64>)> {
        vec![
            ("roe", Some(roe)),
            ("roic", Some(roic)),
            ("operating_margin", Some(margin)),
        ]
    }

    #[test]
    fn outperformer_gets_upside_and_implied_market_cap() {
        let engine = PeerBenchmarkEngine::new();
        let subject = metric_set("AAPL", &return_metrics(30.0, 21.0, 27.0));
        let peers = vec![
            metric_set("MSFT", &return_metrics(20.0, 14.0, 18.0)),
            metric_set("GOOGL", &return_metrics(20.0, 14.0, 18.0)),
        ];

        let cmp = engine.compare(&subject, Some(1000.0), &peers);
        let gap = cmp.valuation_gap.unwrap();
        // Subject runs 1.5x every peer median, so the score is 1.5 and the
        // upside is (1.5 - 1) * 50 = 25%.
        assert!((gap.upside_to_peer_median_pct - 25.0).abs() < 1e-9);
        assert!((gap.implied_market_cap.unwrap() - 1250.0).abs() < 1e-9);
    }

    #[test]
    fn underperformer_gets_a_downside_estimate() {
        let engine = PeerBenchmarkEngine::new();
        let subject = metric_set("AAPL", &return_metrics(10.0, 7.0, 9.0));
        let peers = vec![
            metric_set("MSFT", &return_metrics(20.0, 14.0, 18.0)),
            metric_set("GOOGL", &return_metrics(20.0, 14.0, 18.0)),
        ];

        let cmp = engine.compare(&subject, None, &peers);
        let gap = cmp.valuation_gap.unwrap();
        // Score 0.5 across the board: (0.5 - 1) * 30 = -15%.
        assert!((gap.upside_to_peer_median_pct + 15.0).abs() < 1e-9);
        assert!(gap.implied_market_cap.is_none());
    }

    #[test]
    fn near_median_performance_is_neutral() {
        let engine = PeerBenchmarkEngine::new();
        let subject = metric_set("AAPL", &return_metrics(20.0, 14.0, 18.0));
        let peers = vec![
            metric_set("MSFT", &return_metrics(20.0, 14.0, 18.0)),
            metric_set("GOOGL", &return_metrics(20.0, 14.0, 18.0)),
        ];

        let cmp = engine.compare(&subject, Some(1000.0), &peers);
        let gap = cmp.valuation_gap.unwrap();
        assert_eq!(gap.upside_to_peer_median_pct, NEUTRAL_UPSIDE_PCT);
        assert!((gap.implied_market_cap.unwrap() - 1050.0).abs() < 1e-9);
    }

    #[test]
    fn missing_return_metric_means_no_valuation_gap() {
        let engine = PeerBenchmarkEngine::new();
        // No ROIC anywhere; a two-metric score would be misleading.
        let subject = metric_set(
            "AAPL",
            &[("roe", Some(30.0)), ("operating_margin", Some(27.0))],
        );
        let peers = vec![
            metric_set("MSFT", &[("roe", Some(20.0)), ("operating_margin", Some(18.0))]),
            metric_set("GOOGL", &[("roe", Some(20.0)), ("operating_margin", Some(18.0))]),
        ];

        let cmp = engine.compare(&subject, Some(1000.0), &peers);
        assert!(cmp.valuation_gap.is_none());
    }

    #[test]
    fn even_peer_count_uses_midpoint_median() {
        let engine = PeerBenchmarkEngine::new();
        let subject = metric_set("AAPL", &[("roe", Some(50.0))]);
        let peers = vec![
            metric_set("MSFT", &[("roe", Some(10.0))]),
            metric_set("GOOGL", &[("roe", Some(20.0))]),
            metric_set("AMZN", &[("roe", Some(30.0))]),
            metric_set("META", &[("roe", Some(40.0))]),
        ];

        let cmp = engine.compare(&subject, None, &peers);
        match cmp.standings.get("roe").unwrap() {
            MetricStanding::Ranked { peer_median, percentile, rank, .. } => {
                assert_eq!(*peer_median, 25.0);
                assert_eq!(*percentile, 100.0);
                assert_eq!(*rank, 1);
            }
            other => panic!("expected ranked standing, got {:?}", other),
        }
    }
}
