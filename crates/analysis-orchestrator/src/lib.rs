//! Runs the full analysis pipeline for one identifier: resolve the company,
//! pull its filings, extract fields and quote the market concurrently, derive
//! metrics, benchmark against peers, and synthesize a thesis.
//!
//! Every stage after resolution degrades instead of aborting. The only error
//! that escapes [`AnalysisOrchestrator::analyze`] is `NotFound` for an unknown
//! identifier; everything else is absorbed into the record's status log.

use std::sync::Arc;

use analysis_core::{
    AnalysisError, AnalysisRecord, ExtractedFields, FieldExtractor, FilingDocument, FilingSource,
    MarketData, MarketSnapshot, MetricSet, PeerComparison, Provenance, RetryPolicy, Stage,
    StageOutcome, StageStatus, Thesis, ThesisContext, ThesisGenerator, ThesisGeneratorKind,
};
use chrono::Utc;
use metric_engine::MetricEngine;
use peer_benchmark::PeerBenchmarkEngine;
use tokio::sync::Semaphore;

const DEFAULT_PEER_CONCURRENCY: usize = 4;

pub struct AnalysisOrchestrator {
    filings: Arc<dyn FilingSource>,
    /// Extraction service client, present only when credentials are configured.
    live_extractor: Option<Arc<dyn FieldExtractor>>,
    fallback_extractor: Arc<dyn FieldExtractor>,
    market: Arc<dyn MarketData>,
    /// Language-model generator, present only when credentials are configured.
    llm_thesis: Option<Arc<dyn ThesisGenerator>>,
    fallback_thesis: Arc<dyn ThesisGenerator>,
    retry: RetryPolicy,
    peer_concurrency: usize,
}

impl AnalysisOrchestrator {
    pub fn new(
        filings: Arc<dyn FilingSource>,
        fallback_extractor: Arc<dyn FieldExtractor>,
        market: Arc<dyn MarketData>,
        fallback_thesis: Arc<dyn ThesisGenerator>,
    ) -> Self {
        Self {
            filings,
            live_extractor: None,
            fallback_extractor,
            market,
            llm_thesis: None,
            fallback_thesis,
            retry: RetryPolicy::default(),
            peer_concurrency: DEFAULT_PEER_CONCURRENCY,
        }
    }

    pub fn with_live_extractor(mut self, extractor: Arc<dyn FieldExtractor>) -> Self {
        self.live_extractor = Some(extractor);
        self
    }

    pub fn with_llm_thesis(mut self, generator: Arc<dyn ThesisGenerator>) -> Self {
        self.llm_thesis = Some(generator);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_peer_concurrency(mut self, limit: usize) -> Self {
        self.peer_concurrency = limit.max(1);
        self
    }

    /// Run every stage for `ticker`, benchmarking against `peers`.
    ///
    /// Returns `Err` only when the identifier itself is unknown. Any other
    /// upstream failure lands in the record's status log and the pipeline
    /// continues with fallbacks.
    pub async fn analyze(
        &self,
        ticker: &str,
        peers: &[String],
    ) -> Result<AnalysisRecord, AnalysisError> {
        let ticker = ticker.trim().to_uppercase();
        let mut log: Vec<StageStatus> = Vec::new();
        tracing::info!("starting analysis for {} with {} peers", ticker, peers.len());

        // Stage 1: resolve the identifier. Unknown tickers are fatal.
        let company_name = match self
            .retry
            .run("identifier resolution", || self.filings.resolve(&ticker))
            .await
        {
            Ok(registrant) => {
                push(&mut log, Stage::ResolveIdentifier, StageOutcome::Success);
                Some(registrant.name)
            }
            Err(AnalysisError::NotFound(id)) => {
                tracing::error!("unknown identifier {}", id);
                return Err(AnalysisError::NotFound(id));
            }
            Err(e) => {
                tracing::warn!("resolution degraded for {}: {}", ticker, e);
                push(
                    &mut log,
                    Stage::ResolveIdentifier,
                    StageOutcome::Failed { reason: e.to_string() },
                );
                None
            }
        };

        // Stage 2: fetch filings. A failure here leaves the extraction stage
        // with nothing to read, but market data and the thesis still run.
        let documents = match self
            .retry
            .run("filing retrieval", || self.filings.fetch(&ticker))
            .await
        {
            Ok(documents) => {
                push(&mut log, Stage::FetchFilings, StageOutcome::Success);
                documents
            }
            Err(e) => {
                tracing::warn!("filing retrieval failed for {}: {}", ticker, e);
                push(
                    &mut log,
                    Stage::FetchFilings,
                    StageOutcome::Failed { reason: e.to_string() },
                );
                Vec::new()
            }
        };

        // Stages 3 and 4 have no data dependency on each other, so the
        // extraction chain and the market quote run concurrently.
        let ((fields, extract_outcome), (snapshot, market_outcome)) = tokio::join!(
            extract_fields(
                self.live_extractor.as_ref(),
                &self.fallback_extractor,
                &self.retry,
                &documents,
            ),
            self.market_stage(&ticker),
        );
        push(&mut log, Stage::ExtractFields, extract_outcome);
        push(&mut log, Stage::MarketQuote, market_outcome);

        // Stage 5: derive ratios. Pure computation, cannot fail; incomplete
        // inputs surface as null metrics with reasons.
        let metrics = MetricEngine::new().compute(&fields, &snapshot);
        push(&mut log, Stage::ComputeMetrics, StageOutcome::Success);

        // Stage 6: peer benchmarking. Peers that fail retrieval are dropped;
        // the comparison proceeds with whoever survived.
        let (peer_comparison, peer_outcome) = self
            .benchmark_stage(&metrics, snapshot.market_cap, peers)
            .await;
        push(&mut log, Stage::PeerBenchmark, peer_outcome);

        // Stage 7: thesis. The rule-based generator backs up the language
        // model, so this stage always produces something.
        let context = ThesisContext {
            ticker: ticker.clone(),
            company_name: company_name.clone(),
            fields: fields.clone(),
            snapshot: snapshot.clone(),
            metrics: metrics.clone(),
            peer_comparison: peer_comparison.clone(),
        };
        let (thesis, thesis_outcome) = self.thesis_stage(&context).await;
        push(&mut log, Stage::GenerateThesis, thesis_outcome);

        Ok(AnalysisRecord {
            ticker,
            company_name,
            generated_at: Utc::now(),
            documents: documents.iter().map(FilingDocument::reference).collect(),
            fields,
            snapshot,
            metrics,
            peer_comparison,
            thesis,
            status_log: log,
        })
    }

    async fn market_stage(&self, ticker: &str) -> (MarketSnapshot, StageOutcome) {
        match self.market.quote(ticker).await {
            Ok(snapshot) => {
                let outcome = match snapshot.provenance {
                    Provenance::Live => StageOutcome::Success,
                    _ => StageOutcome::Fallback {
                        reason: "live quote unavailable; estimated snapshot".to_string(),
                    },
                };
                (snapshot, outcome)
            }
            Err(e) => {
                tracing::warn!("market quote failed for {}: {}", ticker, e);
                (
                    MarketSnapshot::estimated(ticker),
                    StageOutcome::Failed { reason: e.to_string() },
                )
            }
        }
    }

    async fn benchmark_stage(
        &self,
        subject: &MetricSet,
        subject_market_cap: Option<f64>,
        peers: &[String],
    ) -> (Option<PeerComparison>, StageOutcome) {
        if peers.is_empty() {
            return (
                None,
                StageOutcome::Skipped { reason: "no peer identifiers provided".to_string() },
            );
        }

        let (peer_sets, dropped) = self.peer_metric_sets(peers).await;
        if peer_sets.is_empty() {
            let reason = format!(
                "all {} peers failed retrieval: {}",
                peers.len(),
                describe_drops(&dropped)
            );
            return (None, StageOutcome::Skipped { reason });
        }

        let comparison =
            PeerBenchmarkEngine::new().compare(subject, subject_market_cap, &peer_sets);
        let outcome = if dropped.is_empty() {
            StageOutcome::Success
        } else {
            StageOutcome::Fallback {
                reason: format!("dropped peers: {}", describe_drops(&dropped)),
            }
        };
        (Some(comparison), outcome)
    }

    /// Fan out the per-peer pipeline (filings, extraction, quote, metrics)
    /// under a concurrency cap. Returns the surviving metric sets in the
    /// caller's peer order, plus the peers that were dropped and why.
    async fn peer_metric_sets(
        &self,
        peers: &[String],
    ) -> (Vec<MetricSet>, Vec<(String, String)>) {
        let semaphore = Arc::new(Semaphore::new(self.peer_concurrency));
        let mut handles = Vec::with_capacity(peers.len());

        for peer in peers {
            let peer = peer.trim().to_uppercase();
            let semaphore = semaphore.clone();
            let worker = PeerWorker {
                filings: self.filings.clone(),
                live_extractor: self.live_extractor.clone(),
                fallback_extractor: self.fallback_extractor.clone(),
                market: self.market.clone(),
                retry: self.retry,
            };
            handles.push((
                peer.clone(),
                tokio::spawn(async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            return Err(AnalysisError::Unavailable(
                                "peer worker pool closed".to_string(),
                            ))
                        }
                    };
                    worker.metric_set(&peer).await
                }),
            ));
        }

        let mut sets = Vec::new();
        let mut dropped = Vec::new();
        for (peer, handle) in handles {
            match handle.await {
                Ok(Ok(set)) => sets.push(set),
                Ok(Err(e)) => {
                    tracing::warn!("dropping peer {}: {}", peer, e);
                    dropped.push((peer, e.to_string()));
                }
                Err(e) => {
                    tracing::warn!("peer task for {} panicked: {}", peer, e);
                    dropped.push((peer, format!("worker failed: {}", e)));
                }
            }
        }
        (sets, dropped)
    }

    async fn thesis_stage(&self, context: &ThesisContext) -> (Thesis, StageOutcome) {
        if let Some(llm) = &self.llm_thesis {
            match self
                .retry
                .run("thesis generation", || llm.generate(context))
                .await
            {
                Ok(thesis) => return (thesis, StageOutcome::Success),
                Err(e) => {
                    tracing::warn!("language-model thesis failed for {}: {}", context.ticker, e);
                    let reason =
                        format!("language model failed: {}; rule-based thesis used", e);
                    return self.fallback_thesis_with(context, reason).await;
                }
            }
        }
        let reason = "language model not configured; rule-based thesis used".to_string();
        self.fallback_thesis_with(context, reason).await
    }

    async fn fallback_thesis_with(
        &self,
        context: &ThesisContext,
        reason: String,
    ) -> (Thesis, StageOutcome) {
        match self.fallback_thesis.generate(context).await {
            Ok(thesis) => (thesis, StageOutcome::Fallback { reason }),
            Err(e) => {
                // The rule-based path has no external dependencies; reaching
                // this branch means a bug, but the record still needs a thesis.
                tracing::error!("fallback thesis failed for {}: {}", context.ticker, e);
                (
                    Thesis {
                        recommendation: "Thesis unavailable".to_string(),
                        conviction: "LOW".to_string(),
                        narrative: format!("Thesis generation failed: {}", e),
                        red_flags: Vec::new(),
                        generator: ThesisGeneratorKind::RuleBased,
                    },
                    StageOutcome::Failed { reason: e.to_string() },
                )
            }
        }
    }
}

fn push(log: &mut Vec<StageStatus>, stage: Stage, outcome: StageOutcome) {
    log.push(StageStatus { stage, outcome, at: Utc::now() });
}

fn describe_drops(dropped: &[(String, String)]) -> String {
    dropped
        .iter()
        .map(|(peer, reason)| format!("{} ({})", peer, reason))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Per-document extraction with the service-then-pattern fallback chain.
/// Documents that neither extractor can read are skipped, not fatal.
async fn extract_fields(
    live: Option<&Arc<dyn FieldExtractor>>,
    fallback: &Arc<dyn FieldExtractor>,
    retry: &RetryPolicy,
    documents: &[FilingDocument],
) -> (ExtractedFields, StageOutcome) {
    if documents.is_empty() {
        return (
            ExtractedFields::default(),
            StageOutcome::Fallback {
                reason: "no documents available; all fields left null".to_string(),
            },
        );
    }

    let mut merged = ExtractedFields::default();
    let mut used_fallback = false;
    let mut skipped: Vec<String> = Vec::new();
    let mut processed = 0usize;

    for document in documents {
        let label = format!("{} {}", document.kind.form_name(), document.filed_on);
        let extracted = match live {
            Some(live) => match retry
                .run("field extraction", || live.extract(document))
                .await
            {
                Ok(fields) => Some(fields),
                Err(AnalysisError::MalformedInput(reason)) => {
                    // Unreadable for the service means unreadable for the
                    // pattern extractor too; skip the document.
                    tracing::warn!("skipping {}: {}", label, reason);
                    skipped.push(format!("{}: {}", label, reason));
                    None
                }
                Err(e) => {
                    tracing::warn!(
                        "extraction service failed for {}, using pattern extractor: {}",
                        label,
                        e
                    );
                    used_fallback = true;
                    run_fallback(fallback, document, &label, &mut skipped).await
                }
            },
            None => {
                used_fallback = true;
                run_fallback(fallback, document, &label, &mut skipped).await
            }
        };

        if let Some(fields) = extracted {
            merged.merge(fields);
            processed += 1;
        }
    }

    let outcome = if processed == 0 {
        StageOutcome::Failed {
            reason: format!("no document could be processed: {}", skipped.join("; ")),
        }
    } else if used_fallback || !skipped.is_empty() {
        let mut reason = if live.is_none() {
            "extraction service not configured; pattern extractor used".to_string()
        } else {
            "extraction service degraded; pattern extractor used".to_string()
        };
        if !skipped.is_empty() {
            reason.push_str(&format!("; skipped: {}", skipped.join("; ")));
        }
        StageOutcome::Fallback { reason }
    } else {
        StageOutcome::Success
    };

    (merged, outcome)
}

async fn run_fallback(
    fallback: &Arc<dyn FieldExtractor>,
    document: &FilingDocument,
    label: &str,
    skipped: &mut Vec<String>,
) -> Option<ExtractedFields> {
    match fallback.extract(document).await {
        Ok(fields) => Some(fields),
        Err(e) => {
            tracing::warn!("skipping {}: {}", label, e);
            skipped.push(format!("{}: {}", label, e));
            None
        }
    }
}

/// The clones a spawned peer task needs. The primary and peer pipelines share
/// the same adapters, so caches and rate limits apply across both.
struct PeerWorker {
    filings: Arc<dyn FilingSource>,
    live_extractor: Option<Arc<dyn FieldExtractor>>,
    fallback_extractor: Arc<dyn FieldExtractor>,
    market: Arc<dyn MarketData>,
    retry: RetryPolicy,
}

impl PeerWorker {
    /// Abbreviated pipeline for one peer. Unlike the primary path, a filing
    /// or market failure here is an error: a peer with no data cannot be
    /// compared and is dropped by the caller.
    async fn metric_set(&self, ticker: &str) -> Result<MetricSet, AnalysisError> {
        let documents = self
            .retry
            .run("peer filing retrieval", || self.filings.fetch(ticker))
            .await?;
        let (fields, _) = extract_fields(
            self.live_extractor.as_ref(),
            &self.fallback_extractor,
            &self.retry,
            &documents,
        )
        .await;
        let snapshot = self.market.quote(ticker).await?;
        Ok(MetricEngine::new().compute(&fields, &snapshot))
    }
}
