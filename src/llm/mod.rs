//! LLM client abstraction
//!
//! One capability, `generate_report`, polymorphic over four backends:
//! OpenAI-compatible HTTP, Gemini HTTP, a local Ollama server, and a
//! deterministic non-network fallback. The backend is selected once at
//! startup from configuration; provider failures at generation time are
//! handled by the flow, which degrades to the fallback renderer so a session
//! can always terminate with a usable report.

pub mod fallback;
pub mod gemini;
pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::config::{Config, LlmProvider};
use crate::error::Result;
use crate::models::ReportContext;

pub use fallback::FallbackRenderer;
pub use gemini::GeminiClient;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

/// Report generation capability
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Generate a narrative report from structured context
    async fn generate_report(&self, context: &ReportContext) -> Result<String>;
}

/// Build the configured backend
pub fn init_generator(config: &Config) -> Arc<dyn ReportGenerator> {
    let generator: Arc<dyn ReportGenerator> = match &config.llm {
        LlmProvider::OpenAi { api_key, model } => Arc::new(OpenAiClient::new(
            api_key.clone(),
            model.clone(),
            config.request_timeout,
        )),
        LlmProvider::Gemini { api_key, model } => Arc::new(GeminiClient::new(
            api_key.clone(),
            model.clone(),
            config.request_timeout,
        )),
        LlmProvider::Ollama { host, model } => Arc::new(OllamaClient::new(
            host.clone(),
            model.clone(),
            config.request_timeout,
        )),
        LlmProvider::None => Arc::new(FallbackRenderer),
    };

    info!("Report generator initialized: {}", generator.name());
    generator
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TomlConfig;

    #[test]
    fn no_provider_selects_the_fallback() {
        let config = Config::resolve(TomlConfig::default()).unwrap();
        let generator = init_generator(&config);
        assert_eq!(generator.name(), "fallback");
    }

    #[test]
    fn ollama_config_selects_ollama() {
        let toml = TomlConfig {
            llm_provider: Some("ollama".to_string()),
            ollama_model: Some("llama3".to_string()),
            ..TomlConfig::default()
        };
        let config = Config::resolve(toml).unwrap();
        assert_eq!(init_generator(&config).name(), "ollama");
    }
}
