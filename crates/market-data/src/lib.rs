use analysis_core::{AnalysisError, MarketData, MarketSnapshot, Provenance, RetryPolicy};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const CACHE_TTL_SECS: i64 = 300; // 5 minutes

#[derive(Debug, Deserialize)]
struct QuoteResponseBody {
    #[serde(rename = "quoteResponse")]
    quote_response: QuoteResponseInner,
}

#[derive(Debug, Deserialize)]
struct QuoteResponseInner {
    result: Vec<QuoteResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResult {
    regular_market_price: Option<f64>,
    market_cap: Option<f64>,
    #[serde(rename = "trailingPE")]
    trailing_pe: Option<f64>,
    fifty_two_week_high: Option<f64>,
    fifty_two_week_low: Option<f64>,
}

/// Raw quote endpoint client. Errors here are absorbed by the adapter.
#[derive(Clone)]
pub struct QuoteClient {
    client: reqwest::Client,
    base_url: String,
}

impl QuoteClient {
    pub fn new() -> Self {
        let base_url = std::env::var("MARKET_DATA_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, base_url }
    }

    pub async fn fetch(&self, ticker: &str) -> Result<MarketSnapshot, AnalysisError> {
        let url = format!("{}/v8/finance/quote", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("symbols", ticker)])
            .send()
            .await
            .map_err(|e| AnalysisError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            if status.as_u16() == 429 || status.is_server_error() {
                return Err(AnalysisError::Unavailable(format!("quote endpoint HTTP {}", status)));
            }
            return Err(AnalysisError::Api(format!("quote endpoint HTTP {}", status)));
        }

        let body: QuoteResponseBody = response
            .json()
            .await
            .map_err(|e| AnalysisError::Parse(e.to_string()))?;

        let result = body
            .quote_response
            .result
            .into_iter()
            .next()
            .ok_or_else(|| AnalysisError::Api(format!("no quote returned for {}", ticker)))?;

        Ok(MarketSnapshot {
            ticker: ticker.to_uppercase(),
            price: result.regular_market_price,
            market_cap: result.market_cap,
            pe_ratio: result.trailing_pe,
            fifty_two_week_high: result.fifty_two_week_high,
            fifty_two_week_low: result.fifty_two_week_low,
            as_of: Utc::now(),
            provenance: Provenance::Live,
        })
    }
}

impl Default for QuoteClient {
    fn default() -> Self {
        Self::new()
    }
}

struct CacheEntry {
    snapshot: MarketSnapshot,
    cached_at: DateTime<Utc>,
}

/// Degrading quote source: live feed, then cached snapshot, then an
/// all-null estimate. Never fails and never blocks the pipeline on a
/// dead quote feed.
pub struct MarketDataAdapter {
    client: Option<QuoteClient>,
    cache: DashMap<String, CacheEntry>,
    retry: RetryPolicy,
}

impl MarketDataAdapter {
    pub fn new(client: Option<QuoteClient>, retry: RetryPolicy) -> Self {
        Self {
            client,
            cache: DashMap::new(),
            retry,
        }
    }

    async fn live(&self, key: &str) -> Result<MarketSnapshot, AnalysisError> {
        let Some(client) = &self.client else {
            return Err(AnalysisError::Unconfigured("market data feed".to_string()));
        };
        self.retry.run("market quote", || client.fetch(key)).await
    }

    fn cached(&self, key: &str, max_age_secs: Option<i64>) -> Option<MarketSnapshot> {
        let entry = self.cache.get(key)?;
        if let Some(max_age) = max_age_secs {
            let age = (Utc::now() - entry.cached_at).num_seconds();
            if age >= max_age {
                return None;
            }
        }
        Some(entry.snapshot.clone())
    }
}

#[async_trait]
impl MarketData for MarketDataAdapter {
    async fn quote(&self, ticker: &str) -> Result<MarketSnapshot, AnalysisError> {
        let key = ticker.to_uppercase();

        if let Some(fresh) = self.cached(&key, Some(CACHE_TTL_SECS)) {
            return Ok(fresh);
        }

        match self.live(&key).await {
            Ok(snapshot) => {
                self.cache.insert(
                    key,
                    CacheEntry {
                        snapshot: snapshot.clone(),
                        cached_at: Utc::now(),
                    },
                );
                Ok(snapshot)
            }
            Err(AnalysisError::Unconfigured(what)) => {
                tracing::debug!("{} not configured; estimated snapshot for {}", what, key);
                Ok(MarketSnapshot::estimated(&key))
            }
            Err(e) => {
                // Stale cache beats nothing; mark it estimated so the report
                // does not pass it off as live.
                if let Some(mut stale) = self.cached(&key, None) {
                    tracing::warn!("live quote failed for {}, serving stale cache: {}", key, e);
                    stale.provenance = Provenance::Estimated;
                    return Ok(stale);
                }
                tracing::warn!("live quote failed for {}, no cache, estimating: {}", key, e);
                Ok(MarketSnapshot::estimated(&key))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_adapter_yields_estimated_snapshot() {
        let adapter = MarketDataAdapter::new(None, RetryPolicy::default());
        let snap = adapter.quote("AAPL").await.unwrap();
        assert_eq!(snap.provenance, Provenance::Estimated);
        assert!(snap.price.is_none());
        assert_eq!(snap.ticker, "AAPL");
    }

    #[tokio::test]
    async fn fresh_cache_is_served_without_a_client() {
        let adapter = MarketDataAdapter::new(None, RetryPolicy::default());
        adapter.cache.insert(
            "AAPL".to_string(),
            CacheEntry {
                snapshot: MarketSnapshot {
                    ticker: "AAPL".to_string(),
                    price: Some(190.0),
                    market_cap: Some(2.9e12),
                    pe_ratio: Some(31.0),
                    fifty_two_week_high: Some(199.6),
                    fifty_two_week_low: Some(164.1),
                    as_of: Utc::now(),
                    provenance: Provenance::Live,
                },
                cached_at: Utc::now(),
            },
        );

        let snap = adapter.quote("aapl").await.unwrap();
        assert_eq!(snap.price, Some(190.0));
        assert_eq!(snap.provenance, Provenance::Live);
    }
}
