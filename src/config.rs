//! Configuration resolution
//!
//! Explicit configuration struct constructed once at process start and passed
//! into the flow and adapters. Values resolve with ENV over TOML priority:
//! every `PERSONFINDER_*` environment variable overrides the corresponding
//! key in the optional TOML file.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 5740;

/// Default per-call timeout for remote requests (search, title fetch, LLM)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default cap on candidates kept from a search round
pub const DEFAULT_SEARCH_MAX_RESULTS: usize = 10;

/// LLM backend selection, resolved once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmProvider {
    /// OpenAI-compatible chat completions endpoint
    OpenAi { api_key: String, model: String },
    /// Google Gemini generateContent endpoint
    Gemini { api_key: String, model: String },
    /// Local Ollama server
    Ollama { host: String, model: String },
    /// Deterministic fallback renderer, no network
    None,
}

impl LlmProvider {
    pub fn name(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi { .. } => "openai",
            LlmProvider::Gemini { .. } => "gemini",
            LlmProvider::Ollama { .. } => "ollama",
            LlmProvider::None => "none",
        }
    }
}

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address for the HTTP listener
    pub bind_address: String,
    /// HTTP port
    pub port: u16,
    /// SQLite database file path
    pub database_path: PathBuf,
    /// Directory for uploaded photos
    pub photo_dir: PathBuf,
    /// SearXNG-compatible search endpoint (`?q=...&format=json`)
    pub search_endpoint: String,
    /// Maximum candidates retained from a search round
    pub search_max_results: usize,
    /// Per-call timeout for all remote requests
    pub request_timeout: Duration,
    /// Selected LLM backend
    pub llm: LlmProvider,
}

/// On-disk TOML shape; all keys optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub database_path: Option<String>,
    pub photo_dir: Option<String>,
    pub search_endpoint: Option<String>,
    pub search_max_results: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub llm_provider: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_model: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: Option<String>,
    pub ollama_host: Option<String>,
    pub ollama_model: Option<String>,
}

impl Config {
    /// Load configuration: ENV over the TOML file at `toml_path` (if present)
    pub fn load(toml_path: Option<&Path>) -> Result<Self> {
        let toml_config = match toml_path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path)
                    .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
                let parsed: TomlConfig = toml::from_str(&content)
                    .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
                info!("Configuration loaded from {}", path.display());
                parsed
            }
            Some(path) => {
                warn!(
                    "Config file not found: {} (using ENV and defaults)",
                    path.display()
                );
                TomlConfig::default()
            }
            None => TomlConfig::default(),
        };

        Self::resolve(toml_config)
    }

    /// Merge ENV values over the TOML layer and apply defaults
    pub fn resolve(toml: TomlConfig) -> Result<Self> {
        // Provider resolution borrows the TOML layer; run it before the
        // field moves below
        let llm = resolve_llm_provider(&toml)?;

        let bind_address = env_or("PERSONFINDER_BIND_ADDRESS", toml.bind_address)
            .unwrap_or_else(|| "127.0.0.1".to_string());

        let port = match env_or("PERSONFINDER_PORT", toml.port.map(|p| p.to_string())) {
            Some(s) => s
                .parse::<u16>()
                .map_err(|e| Error::Config(format!("Invalid port '{}': {}", s, e)))?,
            None => DEFAULT_PORT,
        };

        let database_path = env_or("PERSONFINDER_DATABASE_PATH", toml.database_path)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data/personfinder.db"));

        let photo_dir = env_or("PERSONFINDER_PHOTO_DIR", toml.photo_dir)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data/photos"));

        let search_endpoint = env_or("PERSONFINDER_SEARCH_ENDPOINT", toml.search_endpoint)
            .unwrap_or_else(|| "http://127.0.0.1:8888/search".to_string());

        let search_max_results = match env_or(
            "PERSONFINDER_SEARCH_MAX_RESULTS",
            toml.search_max_results.map(|n| n.to_string()),
        ) {
            Some(s) => s
                .parse::<usize>()
                .map_err(|e| Error::Config(format!("Invalid search_max_results '{}': {}", s, e)))?,
            None => DEFAULT_SEARCH_MAX_RESULTS,
        };

        let request_timeout_secs = match env_or(
            "PERSONFINDER_REQUEST_TIMEOUT_SECS",
            toml.request_timeout_secs.map(|n| n.to_string()),
        ) {
            Some(s) => s
                .parse::<u64>()
                .map_err(|e| Error::Config(format!("Invalid request_timeout_secs '{}': {}", s, e)))?,
            None => DEFAULT_REQUEST_TIMEOUT_SECS,
        };

        Ok(Config {
            bind_address,
            port,
            database_path,
            photo_dir,
            search_endpoint,
            search_max_results,
            request_timeout: Duration::from_secs(request_timeout_secs),
            llm,
        })
    }
}

/// Resolve the LLM backend selection
///
/// An explicit `llm_provider` key wins; otherwise the first provider with
/// complete credentials is selected (openai, then gemini, then ollama).
/// Nothing configured selects the fallback renderer.
fn resolve_llm_provider(toml: &TomlConfig) -> Result<LlmProvider> {
    let openai_key = env_or("PERSONFINDER_OPENAI_API_KEY", toml.openai_api_key.clone())
        .filter(|k| !k.trim().is_empty());
    let openai_model = env_or("PERSONFINDER_OPENAI_MODEL", toml.openai_model.clone())
        .unwrap_or_else(|| "gpt-4o-mini".to_string());
    let gemini_key = env_or("PERSONFINDER_GEMINI_API_KEY", toml.gemini_api_key.clone())
        .filter(|k| !k.trim().is_empty());
    let gemini_model = env_or("PERSONFINDER_GEMINI_MODEL", toml.gemini_model.clone())
        .unwrap_or_else(|| "gemini-1.5-flash".to_string());
    let ollama_host = env_or("PERSONFINDER_OLLAMA_HOST", toml.ollama_host.clone())
        .unwrap_or_else(|| "http://localhost:11434".to_string());
    let ollama_model = env_or("PERSONFINDER_OLLAMA_MODEL", toml.ollama_model.clone())
        .filter(|m| !m.trim().is_empty());

    let explicit = env_or("PERSONFINDER_LLM_PROVIDER", toml.llm_provider.clone());

    let provider = match explicit.as_deref() {
        Some("openai") => {
            let api_key = openai_key.ok_or_else(|| {
                Error::Config("llm_provider=openai but no OpenAI API key configured".to_string())
            })?;
            LlmProvider::OpenAi {
                api_key,
                model: openai_model,
            }
        }
        Some("gemini") => {
            let api_key = gemini_key.ok_or_else(|| {
                Error::Config("llm_provider=gemini but no Gemini API key configured".to_string())
            })?;
            LlmProvider::Gemini {
                api_key,
                model: gemini_model,
            }
        }
        Some("ollama") => {
            let model = ollama_model.ok_or_else(|| {
                Error::Config("llm_provider=ollama but no Ollama model configured".to_string())
            })?;
            LlmProvider::Ollama {
                host: ollama_host,
                model,
            }
        }
        Some("none") => LlmProvider::None,
        Some(other) => {
            return Err(Error::Config(format!(
                "Unknown llm_provider '{}' (expected openai, gemini, ollama, or none)",
                other
            )))
        }
        // No explicit selection: first provider with credentials wins
        None => {
            if let Some(api_key) = openai_key {
                LlmProvider::OpenAi {
                    api_key,
                    model: openai_model,
                }
            } else if let Some(api_key) = gemini_key {
                LlmProvider::Gemini {
                    api_key,
                    model: gemini_model,
                }
            } else if let Some(model) = ollama_model {
                LlmProvider::Ollama {
                    host: ollama_host,
                    model,
                }
            } else {
                LlmProvider::None
            }
        }
    };

    info!("LLM provider: {}", provider.name());
    Ok(provider)
}

/// ENV value if set and non-empty, otherwise the TOML layer's value
fn env_or(env_var: &str, toml_value: Option<String>) -> Option<String> {
    match std::env::var(env_var) {
        Ok(v) if !v.is_empty() => Some(v),
        _ => toml_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_toml() -> TomlConfig {
        TomlConfig::default()
    }

    #[test]
    fn defaults_apply_when_nothing_configured() {
        let config = Config::resolve(empty_toml()).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.search_max_results, DEFAULT_SEARCH_MAX_RESULTS);
        assert_eq!(
            config.request_timeout,
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)
        );
        assert_eq!(config.llm, LlmProvider::None);
    }

    #[test]
    fn toml_values_are_picked_up() {
        let toml: TomlConfig = toml::from_str(
            r#"
            port = 9001
            search_endpoint = "http://searx.local/search"
            llm_provider = "ollama"
            ollama_model = "llama3"
            "#,
        )
        .unwrap();
        let config = Config::resolve(toml).unwrap();
        assert_eq!(config.port, 9001);
        assert_eq!(config.search_endpoint, "http://searx.local/search");
        assert_eq!(
            config.llm,
            LlmProvider::Ollama {
                host: "http://localhost:11434".to_string(),
                model: "llama3".to_string(),
            }
        );
    }

    #[test]
    fn provider_resolution_coexists_with_path_fields() {
        // Path-valued keys and provider credentials resolve from one layer
        let toml = TomlConfig {
            bind_address: Some("0.0.0.0".to_string()),
            database_path: Some("/tmp/pf/pf.db".to_string()),
            photo_dir: Some("/tmp/pf/photos".to_string()),
            search_endpoint: Some("http://searx.local/search".to_string()),
            llm_provider: Some("ollama".to_string()),
            ollama_model: Some("llama3".to_string()),
            ..TomlConfig::default()
        };
        let config = Config::resolve(toml).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.database_path, PathBuf::from("/tmp/pf/pf.db"));
        assert_eq!(config.photo_dir, PathBuf::from("/tmp/pf/photos"));
        assert_eq!(config.search_endpoint, "http://searx.local/search");
        assert_eq!(config.llm.name(), "ollama");
    }

    #[test]
    fn implicit_provider_selection_prefers_openai() {
        let toml = TomlConfig {
            openai_api_key: Some("sk-test".to_string()),
            gemini_api_key: Some("g-test".to_string()),
            ..TomlConfig::default()
        };
        let config = Config::resolve(toml).unwrap();
        assert_eq!(config.llm.name(), "openai");
    }

    #[test]
    fn explicit_provider_without_credentials_is_an_error() {
        let toml = TomlConfig {
            llm_provider: Some("openai".to_string()),
            ..TomlConfig::default()
        };
        assert!(Config::resolve(toml).is_err());
    }

    #[test]
    fn unknown_provider_is_an_error() {
        let toml = TomlConfig {
            llm_provider: Some("claude".to_string()),
            ..TomlConfig::default()
        };
        assert!(Config::resolve(toml).is_err());
    }
}
