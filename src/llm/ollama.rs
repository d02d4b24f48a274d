//! Local Ollama server backend

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::llm::ReportGenerator;
use crate::models::ReportContext;

pub struct OllamaClient {
    http_client: Client,
    host: String,
    model: String,
}

impl OllamaClient {
    pub fn new(host: String, model: String, timeout: Duration) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            host: host.trim_end_matches('/').to_string(),
            model,
        }
    }
}

#[async_trait]
impl ReportGenerator for OllamaClient {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn generate_report(&self, context: &ReportContext) -> Result<String> {
        debug!(host = %self.host, model = %self.model, "Requesting local generation");

        let url = format!("{}/api/generate", self.host);
        let body = json!({
            "model": self.model,
            "prompt": context.prompt(),
            "stream": false,
        });

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Ollama request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "Ollama returned error {}: {}",
                status, body
            )));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("Failed to parse Ollama response: {}", e)))?;

        if generated.response.trim().is_empty() {
            return Err(Error::Provider(
                "Ollama response was empty".to_string(),
            ));
        }

        Ok(generated.response.trim().to_string())
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}
