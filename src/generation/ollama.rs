//! Local generation through an Ollama server.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::RwLock;
use std::time::Duration;

use folio_core::models::Link;

use super::{build_prompt, truncate_context, Generator};
use crate::config::GenerationConfig;

const DEFAULT_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.2";

/// Generator backed by `POST {url}/api/generate` with streaming off.
pub struct OllamaGenerator {
    url: String,
    /// Replaced by the untagged name after a successful 404 retry.
    model: RwLock<String>,
    timeout_secs: u64,
    max_context_chars: usize,
    client: reqwest::Client,
}

enum Outcome {
    Answer(String),
    Empty,
    Status(u16),
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let url = config.url.clone().unwrap_or_else(|| DEFAULT_URL.to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            model: RwLock::new(
                config
                    .model
                    .clone()
                    .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            ),
            timeout_secs: config.timeout_secs,
            max_context_chars: config.max_context_chars,
            client,
        })
    }

    fn model(&self) -> String {
        self.model
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn generate(&self, model: &str, prompt: &str) -> reqwest::Result<Outcome> {
        let body = serde_json::json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": 0.3,
                "num_predict": 300,
                "top_k": 40,
                "top_p": 0.9,
            }
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Ok(Outcome::Status(status.as_u16()));
        }

        let json: serde_json::Value = response.json().await?;
        let text = json
            .get("response")
            .and_then(|r| r.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        Ok(if text.is_empty() {
            Outcome::Empty
        } else {
            Outcome::Answer(text)
        })
    }

    async fn try_answer(&self, prompt: &str) -> reqwest::Result<String> {
        let model = self.model();
        match self.generate(&model, prompt).await? {
            Outcome::Answer(text) => Ok(text),
            Outcome::Empty => Ok("I received an empty response. Please try again.".to_string()),
            Outcome::Status(404) if model.contains(':') => {
                let base = untagged(&model).to_string();
                tracing::info!(model = %model, retry = %base, "ollama model not found, retrying without tag");
                match self.generate(&base, prompt).await? {
                    Outcome::Answer(text) => {
                        *self.model.write().unwrap_or_else(|e| e.into_inner()) = base;
                        Ok(text)
                    }
                    Outcome::Empty => Ok("I received an empty response. Please try again.".to_string()),
                    Outcome::Status(code) => Ok(status_message(code)),
                }
            }
            Outcome::Status(code) => Ok(status_message(code)),
        }
    }
}

fn untagged(model: &str) -> &str {
    model.split(':').next().unwrap_or(model)
}

fn status_message(code: u16) -> String {
    format!("⚠️ Ollama error (status {})", code)
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn answer(&self, question: &str, context: &str) -> (String, Vec<Link>) {
        let context = truncate_context(context, self.max_context_chars);
        let prompt = build_prompt(question, &context);

        match self.try_answer(&prompt).await {
            Ok(text) => (text, Vec::new()),
            Err(e) if e.is_connect() => {
                tracing::warn!(url = %self.url, "cannot connect to ollama");
                (
                    format!(
                        "⚠️ Cannot connect to Ollama. Make sure it's running:\n\
                         1. Run: ollama serve\n\
                         2. Check: curl {}/api/tags",
                        self.url
                    ),
                    Vec::new(),
                )
            }
            Err(e) if e.is_timeout() => {
                tracing::warn!(timeout_secs = self.timeout_secs, "ollama request timed out");
                (
                    format!(
                        "⚠️ Request timed out after {}s. The first request can be slow while the model loads; \
                         try again, raise generation.timeout_secs, or use a smaller model.",
                        self.timeout_secs
                    ),
                    Vec::new(),
                )
            }
            Err(e) => {
                tracing::warn!(error = %e, "ollama request failed");
                (format!("⚠️ Error: {}", e), Vec::new())
            }
        }
    }
}
