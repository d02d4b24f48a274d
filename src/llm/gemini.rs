//! Google Gemini generateContent backend

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::llm::ReportGenerator;
use crate::models::ReportContext;

/// Generative Language API base
const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiClient {
    http_client: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
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
impl ReportGenerator for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn generate_report(&self, context: &ReportContext) -> Result<String> {
        debug!(model = %self.model, "Requesting content generation");

        let url = format!("{}/models/{}:generateContent", API_BASE, self.model);
        let body = json!({
            "contents": [{"parts": [{"text": context.prompt()}]}],
        });

        let response = self
            .http_client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Gemini request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "Gemini returned error {}: {}",
                status, body
            )));
        }

        let generated: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("Failed to parse Gemini response: {}", e)))?;

        let text = generated
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(Error::Provider(
                "Gemini response contained no text part".to_string(),
            ));
        }

        Ok(text.trim().to_string())
    }
}

// ============================================================================
// Gemini API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: String,
}
