use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The identifier does not resolve to any known registrant. Fatal for
    /// the whole run and never retried.
    #[error("identifier not found: {0}")]
    NotFound(String),

    /// Network failure, timeout, or upstream outage. Retryable.
    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    /// A single document or payload cannot be processed. The instance is
    /// skipped with a logged reason; the run continues.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The optional service behind a stage has no credentials configured.
    /// Not a failure — it selects the fallback path for that stage.
    #[error("service not configured: {0}")]
    Unconfigured(String),

    /// The upstream responded but with a non-success status or unusable body.
    #[error("api error: {0}")]
    Api(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl AnalysisError {
    /// Only transient upstream outages are worth retrying. A `NotFound`
    /// stays not-found, and a malformed document stays malformed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AnalysisError::Unavailable(_))
    }
}
