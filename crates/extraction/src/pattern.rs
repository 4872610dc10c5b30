use analysis_core::{
    AnalysisError, ExtractedFields, FieldExtractor, FieldValue, FilingDocument, FilingKind,
};
use async_trait::async_trait;

use crate::Field;

/// Line-item labels recognized in annual and current reports. First match
/// per field wins; everything else stays null.
const FINANCIAL_LABELS: &[(&str, Field)] = &[
    ("total net sales", Field::RevenueCurrent),
    ("total revenue", Field::RevenueCurrent),
    ("net revenue", Field::RevenueCurrent),
    ("prior year revenue", Field::RevenuePrior),
    ("operating income", Field::OperatingIncome),
    ("net income", Field::NetIncome),
    ("total assets", Field::TotalAssets),
    ("total liabilities", Field::TotalLiabilities),
    ("total shareholders' equity", Field::ShareholdersEquity),
    ("total stockholders' equity", Field::ShareholdersEquity),
    ("shareholders' equity", Field::ShareholdersEquity),
    ("cash and cash equivalents", Field::CashEquivalents),
    ("total debt", Field::TotalDebt),
    ("shares outstanding", Field::SharesOutstanding),
];

/// Labels recognized in proxy statements.
const GOVERNANCE_LABELS: &[(&str, Field)] = &[
    ("total compensation", Field::CeoTotalComp),
    ("base salary", Field::CeoBaseSalary),
    ("say-on-pay", Field::SayOnPayApprovalPct),
    ("board of directors consists of", Field::BoardSize),
    ("independent directors", Field::IndependentDirectors),
    ("average tenure", Field::AverageDirectorTenure),
];

/// Deterministic rule-based fallback extractor. Scans document text for a
/// fixed set of line-item labels and reads the first amount after each.
/// Fields it cannot find are left null and tagged estimated; it never errors
/// for "not found", only for unreadable input.
pub struct PatternExtractor;

impl PatternExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FieldExtractor for PatternExtractor {
    async fn extract(&self, document: &FilingDocument) -> Result<ExtractedFields, AnalysisError> {
        if document.text.trim().is_empty() {
            return Err(AnalysisError::MalformedInput(format!(
                "empty {} document for {}",
                document.kind.form_name(),
                document.ticker
            )));
        }

        let labels = match document.kind {
            FilingKind::Proxy => GOVERNANCE_LABELS,
            FilingKind::AnnualReport | FilingKind::CurrentReport => FINANCIAL_LABELS,
        };

        let text = strip_markup(&document.text).to_lowercase();
        let mut fields = ExtractedFields::default();

        for line in text.lines() {
            for (label, field) in labels {
                let slot = field.slot(&mut fields);
                if slot.is_present() {
                    continue;
                }
                if let Some(idx) = line.find(label) {
                    if let Some(value) = first_amount(&line[idx + label.len()..]) {
                        *slot = FieldValue::extracted(value);
                    }
                }
            }
        }

        tracing::debug!(
            "pattern extractor found {} fields in {} {}",
            fields.present_count(),
            document.ticker,
            document.kind.form_name()
        );
        Ok(fields)
    }
}

/// Drop `<...>` spans so labels split across HTML tags still line up.
fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// First monetary/numeric token after a label. Handles `$`, thousands
/// separators, parenthesized negatives, percent signs, and a following
/// thousand/million/billion scale word.
fn first_amount(text: &str) -> Option<f64> {
    let mut tokens = text.split_whitespace().peekable();
    while let Some(token) = tokens.next() {
        if let Some(value) = parse_token(token) {
            let scale = match tokens.peek() {
                Some(next) if next.starts_with("billion") => 1e9,
                Some(next) if next.starts_with("million") => 1e6,
                Some(next) if next.starts_with("thousand") => 1e3,
                _ => 1.0,
            };
            return Some(value * scale);
        }
    }
    None
}

fn parse_token(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let negative = trimmed.starts_with('(') && trimmed.ends_with(')');
    let inner = trimmed.trim_matches(|c| c == '(' || c == ')');
    let inner = inner.strip_prefix('$').unwrap_or(inner);

    let cleaned: String = inner.chars().filter(|&c| c != ',').collect();
    let cleaned = cleaned.trim_end_matches(|c| c == '.' || c == '%' || c == ';' || c == ':');
    if cleaned.is_empty() || !cleaned.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return None;
    }

    cleaned
        .parse::<f64>()
        .ok()
        .map(|v| if negative { -v } else { v })
}
