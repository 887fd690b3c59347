//! Remote generation through the OpenAI chat completions API.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use folio_core::models::Link;

use super::Generator;
use crate::config::GenerationConfig;

const DEFAULT_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

const SYSTEM_PROMPT: &str = "You are a helpful AI assistant answering questions about a candidate's portfolio. \
     Use ONLY the information provided in the context. \
     Be concise, professional, and specific. \
     If the context doesn't contain relevant information, politely say so.";

/// Generator backed by `POST {url}/chat/completions`. Needs `OPENAI_API_KEY`.
pub struct OpenAIGenerator {
    url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Self::with_key(config, api_key)
    }

    fn with_key(config: &GenerationConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_key,
            client,
        })
    }

    fn request_body(&self, question: &str, context: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "temperature": 0.2,
            "max_tokens": 400,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": format!("Context:\n{}\n\nQuestion: {}", context, question) },
            ]
        })
    }
}

fn status_message(code: u16) -> String {
    match code {
        401 => "⚠️ Invalid OpenAI API key. Please check your OPENAI_API_KEY.".to_string(),
        429 => "⚠️ OpenAI rate limit exceeded. Please try again later.".to_string(),
        other => format!("⚠️ OpenAI API error: {}", other),
    }
}

fn parse_completion(json: &serde_json::Value) -> Option<String> {
    json.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(|s| s.trim().to_string())
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn answer(&self, question: &str, context: &str) -> (String, Vec<Link>) {
        let result = self
            .client
            .post(format!("{}/chat/completions", self.url))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(question, context))
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "openai request failed");
                return (format!("⚠️ Error connecting to OpenAI: {}", e), Vec::new());
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "openai returned an error status");
            return (status_message(status.as_u16()), Vec::new());
        }

        match response.json::<serde_json::Value>().await {
            Ok(json) => match parse_completion(&json) {
                Some(text) => (text, Vec::new()),
                None => (
                    "⚠️ Error connecting to OpenAI: unexpected response format".to_string(),
                    Vec::new(),
                ),
            },
            Err(e) => (format!("⚠️ Error connecting to OpenAI: {}", e), Vec::new()),
        }
    }
}
