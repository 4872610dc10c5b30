use anyhow::{Context, Result};
use std::env;

/// Runtime configuration, loaded once at startup. Missing API keys are not
/// errors; they select the fallback paths instead.
#[derive(Debug, Clone)]
pub struct Config {
    /// Contact-bearing user agent for EDGAR requests. Required.
    pub sec_user_agent: String,
    /// Key for the document-extraction service; pattern extractor when absent.
    pub extraction_api_key: Option<String>,
    /// Key for the language-model thesis service; rule-based when absent.
    pub thesis_api_key: Option<String>,
    pub market_data_enabled: bool,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub peer_concurrency: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            sec_user_agent: env::var("SEC_USER_AGENT").context(
                "SEC_USER_AGENT must be set (e.g. \"CatalystResearch admin@example.com\"); \
                 EDGAR rejects anonymous clients",
            )?,
            extraction_api_key: env::var("EXTRACTION_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            thesis_api_key: env::var("THESIS_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            market_data_enabled: env::var("MARKET_DATA_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .context("MARKET_DATA_ENABLED must be true or false")?,
            retry_max_attempts: env::var("RETRY_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .context("RETRY_MAX_ATTEMPTS must be an integer")?,
            retry_base_delay_ms: env::var("RETRY_BASE_DELAY_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .context("RETRY_BASE_DELAY_MS must be an integer")?,
            peer_concurrency: env::var("PEER_CONCURRENCY")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .context("PEER_CONCURRENCY must be an integer")?,
        };

        if config.retry_max_attempts == 0 {
            anyhow::bail!("RETRY_MAX_ATTEMPTS must be at least 1");
        }
        if config.peer_concurrency == 0 {
            anyhow::bail!("PEER_CONCURRENCY must be at least 1");
        }
        Ok(config)
    }
}
