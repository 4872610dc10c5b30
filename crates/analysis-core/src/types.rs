use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Regulatory filing categories the pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilingKind {
    /// 10-K — annual report with audited financial statements.
    AnnualReport,
    /// DEF 14A — proxy statement with governance and compensation data.
    Proxy,
    /// 8-K — current report announcing material events.
    CurrentReport,
}

impl FilingKind {
    /// EDGAR form name for this kind.
    pub fn form_name(&self) -> &'static str {
        match self {
            FilingKind::AnnualReport => "10-K",
            FilingKind::Proxy => "DEF 14A",
            FilingKind::CurrentReport => "8-K",
        }
    }
}

/// One retrieved regulatory document. Owned by the filing source; passed by
/// reference into extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilingDocument {
    pub ticker: String,
    pub kind: FilingKind,
    /// Filing date as reported by the registry (YYYY-MM-DD).
    pub filed_on: String,
    pub accession: String,
    pub source_url: String,
    pub retrieved_at: DateTime<Utc>,
    pub text: String,
}

impl FilingDocument {
    /// Lightweight reference kept on the final record instead of the full text.
    pub fn reference(&self) -> DocumentRef {
        DocumentRef {
            kind: self.kind,
            filed_on: self.filed_on.clone(),
            accession: self.accession.clone(),
            source_url: self.source_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRef {
    pub kind: FilingKind,
    pub filed_on: String,
    pub accession: String,
    pub source_url: String,
}

/// A registrant resolved from an identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registrant {
    pub cik: String,
    pub name: String,
}

/// Where a value came from. Every present value carries exactly one tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Pulled out of an actual filing by the extraction service or the
    /// pattern extractor.
    Extracted,
    /// Fetched from a live market feed.
    Live,
    /// Fallback, cached, or demo value — not to be trusted as current.
    Estimated,
}

/// A single extracted field: an explicit null when absent, never a silent zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldValue {
    pub value: Option<f64>,
    pub provenance: Provenance,
}

impl FieldValue {
    pub fn extracted(value: f64) -> Self {
        Self { value: Some(value), provenance: Provenance::Extracted }
    }

    pub fn estimated(value: f64) -> Self {
        Self { value: Some(value), provenance: Provenance::Estimated }
    }

    /// Field not found — explicit null, tagged estimated.
    pub fn missing() -> Self {
        Self { value: None, provenance: Provenance::Estimated }
    }

    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }
}

impl Default for FieldValue {
    fn default() -> Self {
        Self::missing()
    }
}

/// Structured fields pulled from filings: financials from the annual report,
/// governance from the proxy statement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedFields {
    // Income statement / balance sheet (10-K)
    pub revenue_current: FieldValue,
    pub revenue_prior: FieldValue,
    pub operating_income: FieldValue,
    pub net_income: FieldValue,
    pub total_assets: FieldValue,
    pub total_liabilities: FieldValue,
    pub shareholders_equity: FieldValue,
    pub cash_equivalents: FieldValue,
    pub total_debt: FieldValue,
    pub shares_outstanding: FieldValue,
    // Governance (DEF 14A)
    pub ceo_total_comp: FieldValue,
    pub ceo_base_salary: FieldValue,
    pub say_on_pay_approval_pct: FieldValue,
    pub board_size: FieldValue,
    pub independent_directors: FieldValue,
    pub average_director_tenure: FieldValue,
}

impl ExtractedFields {
    /// Merge fields extracted from another document into this set. A field
    /// already present wins; absent fields take the other side's value.
    /// This is how per-document extractions (10-K, proxy) become one record.
    pub fn merge(&mut self, other: ExtractedFields) {
        fn take(slot: &mut FieldValue, candidate: FieldValue) {
            if !slot.is_present() && candidate.is_present() {
                *slot = candidate;
            }
        }
        take(&mut self.revenue_current, other.revenue_current);
        take(&mut self.revenue_prior, other.revenue_prior);
        take(&mut self.operating_income, other.operating_income);
        take(&mut self.net_income, other.net_income);
        take(&mut self.total_assets, other.total_assets);
        take(&mut self.total_liabilities, other.total_liabilities);
        take(&mut self.shareholders_equity, other.shareholders_equity);
        take(&mut self.cash_equivalents, other.cash_equivalents);
        take(&mut self.total_debt, other.total_debt);
        take(&mut self.shares_outstanding, other.shares_outstanding);
        take(&mut self.ceo_total_comp, other.ceo_total_comp);
        take(&mut self.ceo_base_salary, other.ceo_base_salary);
        take(&mut self.say_on_pay_approval_pct, other.say_on_pay_approval_pct);
        take(&mut self.board_size, other.board_size);
        take(&mut self.independent_directors, other.independent_directors);
        take(&mut self.average_director_tenure, other.average_director_tenure);
    }

    /// How many fields carry a value.
    pub fn present_count(&self) -> usize {
        [
            &self.revenue_current,
            &self.revenue_prior,
            &self.operating_income,
            &self.net_income,
            &self.total_assets,
            &self.total_liabilities,
            &self.shareholders_equity,
            &self.cash_equivalents,
            &self.total_debt,
            &self.shares_outstanding,
            &self.ceo_total_comp,
            &self.ceo_base_salary,
            &self.say_on_pay_approval_pct,
            &self.board_size,
            &self.independent_directors,
            &self.average_director_tenure,
        ]
        .iter()
        .filter(|f| f.is_present())
        .count()
    }
}

/// Live price and valuation metrics for one identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub ticker: String,
    pub price: Option<f64>,
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub fifty_two_week_high: Option<f64>,
    pub fifty_two_week_low: Option<f64>,
    /// Staleness marker — when this data was actually observed.
    pub as_of: DateTime<Utc>,
    pub provenance: Provenance,
}

impl MarketSnapshot {
    /// Empty snapshot used when no quote could be obtained. All fields are
    /// explicit nulls so downstream ratios propagate null instead of zero.
    pub fn estimated(ticker: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            price: None,
            market_cap: None,
            pe_ratio: None,
            fifty_two_week_high: None,
            fifty_two_week_low: None,
            as_of: Utc::now(),
            provenance: Provenance::Estimated,
        }
    }
}

/// One computed ratio with the formula inputs that produced it. A null value
/// always comes with a reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricValue {
    pub value: Option<f64>,
    /// Named inputs the formula consumed, for report transparency.
    pub inputs: BTreeMap<String, Option<f64>>,
    /// Why the value is null (missing input, zero denominator). None when present.
    pub reason: Option<String>,
}

/// Derived ratios for one identifier. Keys are stable metric names; a ratio
/// whose inputs were incomplete is present with a null value, never dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSet {
    pub ticker: String,
    pub computed_at: DateTime<Utc>,
    pub metrics: BTreeMap<String, MetricValue>,
}

impl MetricSet {
    pub fn value(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).and_then(|m| m.value)
    }
}

/// Relative standing of one metric against the peer set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricStanding {
    Ranked {
        subject: f64,
        peer_min: f64,
        peer_median: f64,
        peer_max: f64,
        /// Share of comparable peers strictly below the subject, 0–100.
        percentile: f64,
        /// 1 = best among subject + comparable peers.
        rank: usize,
        peer_count: usize,
        gap_to_median: f64,
    },
    /// Fewer than two peers had this metric non-null; a single-point
    /// percentile would be misleading.
    InsufficientPeerData { peer_count: usize },
}

/// Valuation upside implied by relative performance: a company out-earning
/// its peer medians while valued like them has room to re-rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationGap {
    /// Estimated re-rating potential vs the peer median, in percent.
    /// Positive means upside.
    pub upside_to_peer_median_pct: f64,
    /// Subject market cap scaled by the upside. None when no market cap
    /// was available.
    pub implied_market_cap: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerComparison {
    pub ticker: String,
    /// Peers that survived retrieval and contributed metrics.
    pub peer_group: Vec<String>,
    pub standings: BTreeMap<String, MetricStanding>,
    /// Present only when ROE, ROIC, and operating margin all ranked.
    pub valuation_gap: Option<ValuationGap>,
}

/// Which generator produced the thesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThesisGeneratorKind {
    LanguageModel,
    RuleBased,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedFlag {
    pub name: String,
    pub detail: String,
}

/// The synthesized investment recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thesis {
    pub recommendation: String,
    /// HIGH / MODERATE / LOW conviction tier.
    pub conviction: String,
    pub narrative: String,
    pub red_flags: Vec<RedFlag>,
    pub generator: ThesisGeneratorKind,
}

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ResolveIdentifier,
    FetchFilings,
    ExtractFields,
    MarketQuote,
    ComputeMetrics,
    PeerBenchmark,
    GenerateThesis,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ResolveIdentifier => "resolve_identifier",
            Stage::FetchFilings => "fetch_filings",
            Stage::ExtractFields => "extract_fields",
            Stage::MarketQuote => "market_quote",
            Stage::ComputeMetrics => "compute_metrics",
            Stage::PeerBenchmark => "peer_benchmark",
            Stage::GenerateThesis => "generate_thesis",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StageOutcome {
    /// Stage ran against live data.
    Success,
    /// Stage produced output from a degraded path (cache, demo, rule-based).
    Fallback { reason: String },
    /// Stage produced nothing useful; the pipeline continued with substitutes.
    Failed { reason: String },
    /// Stage did not run at all (e.g. no peers survived retrieval).
    Skipped { reason: String },
}

/// One status-log entry. The orchestrator writes exactly one per stage
/// attempted, in execution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageStatus {
    pub stage: Stage,
    pub outcome: StageOutcome,
    pub at: DateTime<Utc>,
}

/// Terminal aggregate for one analysis run. Built once by the orchestrator
/// and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub ticker: String,
    pub company_name: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub documents: Vec<DocumentRef>,
    pub fields: ExtractedFields,
    pub snapshot: MarketSnapshot,
    pub metrics: MetricSet,
    pub peer_comparison: Option<PeerComparison>,
    pub thesis: Thesis,
    pub status_log: Vec<StageStatus>,
}
