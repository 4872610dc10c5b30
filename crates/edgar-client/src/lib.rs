use analysis_core::{AnalysisError, FilingDocument, FilingKind, FilingSource, Registrant};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const TICKER_INDEX_URL: &str = "https://www.sec.gov/files/company_tickers.json";
const SUBMISSIONS_URL: &str = "https://data.sec.gov/submissions";
const ARCHIVES_URL: &str = "https://www.sec.gov/Archives/edgar/data";

/// How many current reports (8-K) to pull per run. Annual report and proxy
/// are fetched newest-only.
const CURRENT_REPORT_LIMIT: usize = 3;

/// Sliding-window rate limiter: at most `max_requests` per `window`.
/// EDGAR fair-use guidance is 10 req/sec; we default well under it.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<std::collections::VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(std::collections::VecDeque::new())),
            max_requests,
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            let wait_until = ts.front().copied().unwrap_or(now) + self.window;
            let sleep_dur = wait_until.saturating_duration_since(now) + Duration::from_millis(50);
            drop(ts);
            tracing::debug!("EDGAR rate limiter: waiting {:.1}s", sleep_dur.as_secs_f64());
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TickerEntry {
    cik_str: u64,
    ticker: String,
    title: String,
}

#[derive(Debug, Deserialize)]
struct Submissions {
    #[serde(default)]
    name: Option<String>,
    filings: SubmissionFilings,
}

#[derive(Debug, Deserialize)]
struct SubmissionFilings {
    recent: RecentFilings,
}

/// EDGAR's column-oriented recent-filings table: parallel arrays, one row
/// per filing, newest first.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecentFilings {
    accession_number: Vec<String>,
    form: Vec<String>,
    filing_date: Vec<String>,
    primary_document: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct FilingPlan {
    kind: FilingKind,
    accession: String,
    filed_on: String,
    primary_document: String,
}

/// Pick which rows of the recent-filings table to download: the newest
/// annual report, the newest proxy, and the newest few current reports.
/// EDGAR already orders rows newest-first; we preserve that order.
fn plan_downloads(recent: &RecentFilings) -> Vec<FilingPlan> {
    let mut plans = Vec::new();
    let mut have_annual = false;
    let mut have_proxy = false;
    let mut current_reports = 0usize;

    let rows = recent
        .form
        .len()
        .min(recent.accession_number.len())
        .min(recent.filing_date.len())
        .min(recent.primary_document.len());

    for i in 0..rows {
        let kind = match recent.form[i].as_str() {
            "10-K" if !have_annual => {
                have_annual = true;
                FilingKind::AnnualReport
            }
            "DEF 14A" if !have_proxy => {
                have_proxy = true;
                FilingKind::Proxy
            }
            "8-K" if current_reports < CURRENT_REPORT_LIMIT => {
                current_reports += 1;
                FilingKind::CurrentReport
            }
            _ => continue,
        };
        plans.push(FilingPlan {
            kind,
            accession: recent.accession_number[i].clone(),
            filed_on: recent.filing_date[i].clone(),
            primary_document: recent.primary_document[i].clone(),
        });
    }

    plans
}

/// Filing Source Adapter backed by the SEC EDGAR registry.
#[derive(Clone)]
pub struct EdgarClient {
    client: Client,
    rate_limiter: RateLimiter,
    /// Resolved registrants, so `resolve` followed by `fetch` hits the
    /// ticker index once.
    registrants: Arc<DashMap<String, Registrant>>,
}

impl EdgarClient {
    /// `user_agent` must carry contact info — the SEC rejects anonymous
    /// clients.
    pub fn new(user_agent: &str) -> Self {
        let rate_limit: usize = std::env::var("EDGAR_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8);

        let client = Client::builder()
            .user_agent(user_agent.to_string())
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            rate_limiter: RateLimiter::new(rate_limit, Duration::from_secs(1)),
            registrants: Arc::new(DashMap::new()),
        }
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, AnalysisError> {
        self.rate_limiter.acquire().await;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AnalysisError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(AnalysisError::Unavailable(format!("HTTP {} from {}", status, url)));
        }
        Err(AnalysisError::Api(format!("HTTP {} from {}", status, url)))
    }

    async fn download_document(
        &self,
        ticker: &str,
        cik: &str,
        plan: &FilingPlan,
    ) -> Result<FilingDocument, AnalysisError> {
        let cik_no_pad = cik.trim_start_matches('0');
        let cik_no_pad = if cik_no_pad.is_empty() { "0" } else { cik_no_pad };
        let accession_no_dash = plan.accession.replace('-', "");
        let url = format!(
            "{}/{}/{}/{}",
            ARCHIVES_URL, cik_no_pad, accession_no_dash, plan.primary_document
        );

        tracing::debug!("downloading {} {} from {}", plan.filed_on, plan.kind.form_name(), url);
        let response = self.get(&url).await?;
        let text = response
            .text()
            .await
            .map_err(|e| AnalysisError::Unavailable(e.to_string()))?;

        Ok(FilingDocument {
            ticker: ticker.to_string(),
            kind: plan.kind,
            filed_on: plan.filed_on.clone(),
            accession: plan.accession.clone(),
            source_url: url,
            retrieved_at: Utc::now(),
            text,
        })
    }
}

#[async_trait]
impl FilingSource for EdgarClient {
    async fn resolve(&self, ticker: &str) -> Result<Registrant, AnalysisError> {
        let key = ticker.to_uppercase();
        if let Some(cached) = self.registrants.get(&key) {
            return Ok(cached.clone());
        }

        tracing::debug!("resolving CIK for {}", key);
        let response = self.get(TICKER_INDEX_URL).await?;
        let index: HashMap<String, TickerEntry> = response
            .json()
            .await
            .map_err(|e| AnalysisError::Parse(e.to_string()))?;

        let entry = index
            .values()
            .find(|e| e.ticker.eq_ignore_ascii_case(&key))
            .ok_or_else(|| AnalysisError::NotFound(key.clone()))?;

        let registrant = Registrant {
            cik: format!("{:0>10}", entry.cik_str),
            name: entry.title.clone(),
        };
        self.registrants.insert(key, registrant.clone());
        Ok(registrant)
    }

    async fn fetch(&self, ticker: &str) -> Result<Vec<FilingDocument>, AnalysisError> {
        let registrant = self.resolve(ticker).await?;

        let url = format!("{}/CIK{}.json", SUBMISSIONS_URL, registrant.cik);
        let response = self.get(&url).await?;
        let submissions: Submissions = response
            .json()
            .await
            .map_err(|e| AnalysisError::Parse(e.to_string()))?;

        let plans = plan_downloads(&submissions.filings.recent);
        if plans.is_empty() {
            tracing::warn!(
                "no recent 10-K / DEF 14A / 8-K filings for {} ({})",
                ticker,
                submissions.name.as_deref().unwrap_or("unknown registrant"),
            );
        }

        let mut documents = Vec::with_capacity(plans.len());
        for plan in &plans {
            match self.download_document(ticker, &registrant.cik, plan).await {
                Ok(doc) => documents.push(doc),
                // A single bad document is dropped, not fatal to the fetch.
                Err(e) => tracing::warn!(
                    "skipping {} {} for {}: {}",
                    plan.filed_on,
                    plan.kind.form_name(),
                    ticker,
                    e
                ),
            }
        }
        Ok(documents)
    }
}
