//! Ollama HTTP generator.
//!
//! Talks to a local or remote Ollama server through its non-streaming
//! `/api/generate` endpoint.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use hdleval_core::{Generation, Generator, GeneratorError};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const BASE_URL_ENV: &str = "OLLAMA_BASE_URL";

/// Ollama connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    /// Upper bound on generated tokens.
    pub num_predict: u32,
    pub request_timeout_secs: u64,
}

impl OllamaConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            num_predict: 2048,
            request_timeout_secs: 300,
        }
    }

    /// Settings for `model` with the base URL taken from `OLLAMA_BASE_URL`.
    pub fn from_env(model: impl Into<String>) -> Self {
        let mut config = Self::new(model);
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                config.base_url = url;
            }
        }
        config
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

pub struct OllamaGenerator {
    config: OllamaConfig,
    http_client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: OllamaConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("hdleval/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            config,
            http_client,
        }
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn generate(
        &self,
        prompt: &str,
        temperature: Option<f32>,
    ) -> Result<Generation, GeneratorError> {
        let body = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature,
                num_predict: self.config.num_predict,
            },
        };

        let start = Instant::now();
        let response = self
            .http_client
            .post(self.config.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| GeneratorError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if temperature.is_some() && text.to_lowercase().contains("temperature") {
                return Err(GeneratorError::TemperatureUnsupported);
            }
            return Err(GeneratorError::Request(format!("HTTP {status}: {}", text.trim())));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GeneratorError::Malformed(e.to_string()))?;
        let elapsed_secs = start.elapsed().as_secs_f64();
        debug!(model = %self.config.model, elapsed_secs, "generation received");

        Ok(Generation {
            code: parsed.response,
            elapsed_secs,
        })
    }
}
