use analysis_core::{AnalysisError, Thesis, ThesisContext, ThesisGenerator, ThesisGeneratorKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::rules::{conviction_tier, detect_red_flags};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Language-model-backed thesis generator. Used when `THESIS_API_KEY` is
/// configured; any failure here sends the orchestrator to the rule-based
/// fallback.
#[derive(Clone)]
pub struct LlmThesisClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl LlmThesisClient {
    pub fn new(api_key: String) -> Self {
        let base_url =
            std::env::var("THESIS_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("THESIS_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, base_url, api_key, model }
    }

    fn prompt(context: &ThesisContext) -> String {
        let mut prompt = format!(
            "You are an activist-investor analyst. Write a concise investment thesis for {} ({}).\n\nComputed metrics:\n",
            context.company_name.as_deref().unwrap_or("the company"),
            context.ticker
        );
        for (name, value) in &context.metrics.metrics {
            match value.value {
                Some(v) => prompt.push_str(&format!("- {}: {:.2}\n", name, v)),
                None => prompt.push_str(&format!("- {}: unavailable\n", name)),
            }
        }
        if let Some(comparison) = &context.peer_comparison {
            prompt.push_str(&format!(
                "\nPeer group: {}\n",
                comparison.peer_group.join(", ")
            ));
        }
        prompt.push_str(
            "\nLead with a one-line recommendation, then supporting analysis. \
             Flag capital-allocation and governance concerns explicitly.",
        );
        prompt
    }
}

#[async_trait]
impl ThesisGenerator for LlmThesisClient {
    async fn generate(&self, context: &ThesisContext) -> Result<Thesis, AnalysisError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: Self::prompt(context),
            }],
            temperature: 0.2,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AnalysisError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            if status.as_u16() == 429 || status.is_server_error() {
                return Err(AnalysisError::Unavailable(format!("thesis service HTTP {}", status)));
            }
            return Err(AnalysisError::Api(format!("thesis service HTTP {}", status)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::Parse(e.to_string()))?;

        let narrative = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AnalysisError::Api("thesis service returned no content".to_string()))?;

        // The model writes the narrative; flags and conviction stay rule-derived
        // so the report is comparable across generator paths.
        let red_flags = detect_red_flags(context);
        let conviction = conviction_tier(context, red_flags.len()).to_string();
        let recommendation = narrative
            .lines()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("See narrative")
            .trim()
            .to_string();

        tracing::info!("language-model thesis generated for {}", context.ticker);
        Ok(Thesis {
            recommendation,
            conviction,
            narrative,
            red_flags,
            generator: ThesisGeneratorKind::LanguageModel,
        })
    }
}
