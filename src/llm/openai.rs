//! OpenAI-compatible chat completions backend

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::llm::ReportGenerator;
use crate::models::ReportContext;

/// Chat completions endpoint
const API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Token cap for the generated report
const MAX_TOKENS: u32 = 900;

pub struct OpenAiClient {
    http_client: Client,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            api_key,
            model,
        }
    }
}

#[async_trait]
impl ReportGenerator for OpenAiClient {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn generate_report(&self, context: &ReportContext) -> Result<String> {
        debug!(model = %self.model, "Requesting chat completion");

        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": context.prompt()}],
            "max_tokens": MAX_TOKENS,
        });

        let response = self
            .http_client
            .post(API_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("OpenAI request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "OpenAI returned error {}: {}",
                status, body
            )));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("Failed to parse OpenAI response: {}", e)))?;

        let text = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(Error::Provider(
                "OpenAI response contained no message content".to_string(),
            ));
        }

        Ok(text.trim().to_string())
    }
}

// ============================================================================
// OpenAI API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}
