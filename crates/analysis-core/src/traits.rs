use async_trait::async_trait;
use crate::{
    AnalysisError, ExtractedFields, FilingDocument, MarketSnapshot, MetricSet, PeerComparison,
    Registrant, Thesis,
};

/// Capability: retrieve regulatory filings for an identifier.
#[async_trait]
pub trait FilingSource: Send + Sync {
    /// Resolve an identifier to a known registrant, or `NotFound`.
    async fn resolve(&self, ticker: &str) -> Result<Registrant, AnalysisError>;

    /// Fetch recent filings, most recent first.
    async fn fetch(&self, ticker: &str) -> Result<Vec<FilingDocument>, AnalysisError>;
}

/// Capability: turn one filing document into structured fields.
///
/// "Field not found" is a null field, never an error. Implementations raise
/// only for unrecoverable input (empty/unreadable document).
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    async fn extract(&self, document: &FilingDocument) -> Result<ExtractedFields, AnalysisError>;
}

/// Capability: fetch live market metrics for an identifier.
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn quote(&self, ticker: &str) -> Result<MarketSnapshot, AnalysisError>;
}

/// Everything assembled before the thesis stage runs.
#[derive(Debug, Clone)]
pub struct ThesisContext {
    pub ticker: String,
    pub company_name: Option<String>,
    pub fields: ExtractedFields,
    pub snapshot: MarketSnapshot,
    pub metrics: MetricSet,
    pub peer_comparison: Option<PeerComparison>,
}

/// Capability: synthesize findings into a recommendation.
#[async_trait]
pub trait ThesisGenerator: Send + Sync {
    async fn generate(&self, context: &ThesisContext) -> Result<Thesis, AnalysisError>;
}
