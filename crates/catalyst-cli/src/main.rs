//! catalyst-cli: run the full analysis pipeline for one company and render a
//! markdown report.
//!
//! Usage:
//!   cargo run -p catalyst-cli -- analyze AAPL
//!   cargo run -p catalyst-cli -- analyze AAPL --peers MSFT,GOOGL,AMZN
//!   cargo run -p catalyst-cli -- analyze AAPL --out report.md
//!   cargo run -p catalyst-cli -- analyze AAPL --json

use std::sync::Arc;
use std::time::Duration;

use analysis_core::{AnalysisError, RetryPolicy};
use analysis_orchestrator::AnalysisOrchestrator;
use anyhow::{Context, Result};
use edgar_client::EdgarClient;
use extraction::{AdeClient, PatternExtractor};
use market_data::{MarketDataAdapter, QuoteClient};
use thesis_engine::{LlmThesisClient, RuleBasedThesis};

mod config;
mod report;

use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    // Panic hook: log panic info before crashing
    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(String::as_str) != Some("analyze") {
        usage();
        std::process::exit(1);
    }
    let ticker = match args.get(2) {
        Some(t) if !t.starts_with("--") => t.clone(),
        _ => {
            usage();
            std::process::exit(1);
        }
    };

    let peers: Vec<String> = match flag_value(&args, "--peers") {
        Ok(value) => value
            .map(|list| {
                list.split(',')
                    .map(|p| p.trim().to_uppercase())
                    .filter(|p| !p.is_empty())
                    .collect()
            })
            .unwrap_or_default(),
        Err(message) => {
            eprintln!("{}", message);
            usage();
            std::process::exit(1);
        }
    };

    let out_path = match flag_value(&args, "--out") {
        Ok(value) => value.map(str::to_string),
        Err(message) => {
            eprintln!("{}", message);
            usage();
            std::process::exit(1);
        }
    };
    let as_json = args.iter().any(|a| a == "--json");

    let config = Config::from_env()?;
    let retry = RetryPolicy::new(
        config.retry_max_attempts,
        Duration::from_millis(config.retry_base_delay_ms),
    );

    let edgar = Arc::new(EdgarClient::new(&config.sec_user_agent));
    let quote_client = config.market_data_enabled.then(QuoteClient::new);
    if quote_client.is_none() {
        tracing::info!("market data disabled; snapshots will be estimated");
    }
    let market = Arc::new(MarketDataAdapter::new(quote_client, retry));

    let mut orchestrator = AnalysisOrchestrator::new(
        edgar,
        Arc::new(PatternExtractor::new()),
        market,
        Arc::new(RuleBasedThesis::new()),
    )
    .with_retry_policy(retry)
    .with_peer_concurrency(config.peer_concurrency);

    match config.extraction_api_key.clone() {
        Some(key) => {
            orchestrator = orchestrator.with_live_extractor(Arc::new(AdeClient::new(key)));
        }
        None => tracing::info!("EXTRACTION_API_KEY not set; pattern extractor only"),
    }
    match config.thesis_api_key.clone() {
        Some(key) => {
            orchestrator = orchestrator.with_llm_thesis(Arc::new(LlmThesisClient::new(key)));
        }
        None => tracing::info!("THESIS_API_KEY not set; rule-based thesis only"),
    }

    tracing::info!("analyzing {} against {} peers", ticker, peers.len());
    let record = match orchestrator.analyze(&ticker, &peers).await {
        Ok(record) => record,
        Err(AnalysisError::NotFound(id)) => {
            tracing::error!("no registrant found for identifier {}", id);
            std::process::exit(2);
        }
        Err(e) => return Err(e).context("analysis failed"),
    };

    let output = if as_json {
        serde_json::to_string_pretty(&record)?
    } else {
        report::render(&record)
    };

    match out_path {
        Some(path) => {
            std::fs::write(&path, output).with_context(|| format!("writing {}", path))?;
            tracing::info!("report written to {}", path);
        }
        None => println!("{}", output),
    }
    Ok(())
}

/// Value of `flag`, if given. A following token that is itself a flag does
/// not count as a value.
fn flag_value<'a>(args: &'a [String], flag: &str) -> Result<Option<&'a str>, String> {
    match args.iter().position(|a| a == flag) {
        None => Ok(None),
        Some(i) => match args.get(i + 1) {
            Some(v) if !v.starts_with("--") => Ok(Some(v)),
            _ => Err(format!("{} requires a value", flag)),
        },
    }
}

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter()).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter()).init();
    }
}

fn usage() {
    eprintln!("Usage:");
    eprintln!("  catalyst-cli analyze TICKER                  Analyze one company");
    eprintln!("  catalyst-cli analyze TICKER --peers A,B,C    Benchmark against peers");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --out PATH    Write the report to PATH instead of stdout");
    eprintln!("  --json        Emit the raw record as JSON");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  SEC_USER_AGENT        required; contact info for EDGAR requests");
    eprintln!("  EXTRACTION_API_KEY    optional; enables the extraction service");
    eprintln!("  THESIS_API_KEY        optional; enables the language-model thesis");
    eprintln!("  MARKET_DATA_ENABLED   optional; set false to skip live quotes");
}
