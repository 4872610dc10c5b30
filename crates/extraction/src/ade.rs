use analysis_core::{
    AnalysisError, ExtractedFields, FieldExtractor, FieldValue, FilingDocument,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::Field;

const DEFAULT_BASE_URL: &str = "https://api.landing.ai/v1/ade";

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    document: &'a str,
    fields: Vec<&'static str>,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    /// Field name → value. Fields the service could not find come back as
    /// explicit nulls.
    fields: HashMap<String, Option<f64>>,
}

/// Live document-extraction service client. Selected when an API key is
/// configured; callers fall back to the pattern extractor when this fails.
#[derive(Clone)]
pub struct AdeClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AdeClient {
    pub fn new(api_key: String) -> Self {
        let base_url = std::env::var("EXTRACTION_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::with_base_url(api_key, base_url)
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, base_url, api_key }
    }
}

#[async_trait]
impl FieldExtractor for AdeClient {
    async fn extract(&self, document: &FilingDocument) -> Result<ExtractedFields, AnalysisError> {
        if document.text.trim().is_empty() {
            return Err(AnalysisError::MalformedInput(format!(
                "empty {} document for {}",
                document.kind.form_name(),
                document.ticker
            )));
        }

        let request = ExtractRequest {
            document: &document.text,
            fields: Field::ALL.iter().map(|f| f.name()).collect(),
        };

        let response = self
            .client
            .post(format!("{}/extract", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AnalysisError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            if status.as_u16() == 429 || status.is_server_error() {
                return Err(AnalysisError::Unavailable(format!(
                    "extraction service HTTP {}",
                    status
                )));
            }
            return Err(AnalysisError::Api(format!("extraction service HTTP {}", status)));
        }

        let parsed: ExtractResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::Parse(e.to_string()))?;

        let mut fields = ExtractedFields::default();
        for (name, value) in parsed.fields {
            let Some(field) = Field::from_name(&name) else {
                tracing::debug!("extraction service returned unknown field {}", name);
                continue;
            };
            if let Some(v) = value {
                *field.slot(&mut fields) = FieldValue::extracted(v);
            }
        }

        tracing::info!(
            "extraction service returned {} fields for {} {}",
            fields.present_count(),
            document.ticker,
            document.kind.form_name()
        );
        Ok(fields)
    }
}
