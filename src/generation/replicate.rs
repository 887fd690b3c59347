//! Remote generation through Replicate predictions (large hosted models).

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use folio_core::models::Link;

use super::{build_prompt, Generator};
use crate::config::GenerationConfig;

const DEFAULT_URL: &str = "https://api.replicate.com/v1";
const DEFAULT_MODEL: &str = "meta/meta-llama-3.1-70b-instruct";
const POLL_INTERVAL: Duration = Duration::from_secs(2);
const MAX_POLLS: usize = 60;

/// Generator that starts a prediction and polls it until it settles.
/// Needs `REPLICATE_API_TOKEN`; the model comes from `[generation].model`,
/// then `REPLICATE_MODEL`.
pub struct ReplicateGenerator {
    url: String,
    model: String,
    token: String,
    poll_interval: Duration,
    max_polls: usize,
    client: reqwest::Client,
}

/// Outcome of one poll of a prediction.
#[derive(Debug, PartialEq)]
enum PollStatus {
    Succeeded(String),
    Failed(String),
    Pending,
}

impl ReplicateGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let token = std::env::var("REPLICATE_API_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| anyhow::anyhow!("REPLICATE_API_TOKEN environment variable not set"))?;
        Self::with_token(config, token)
    }

    fn with_token(config: &GenerationConfig, token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            url: config
                .url
                .as_deref()
                .unwrap_or(DEFAULT_URL)
                .trim_end_matches('/')
                .to_string(),
            model: config
                .model
                .clone()
                .or_else(|| std::env::var("REPLICATE_MODEL").ok())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            token,
            poll_interval: POLL_INTERVAL,
            max_polls: MAX_POLLS,
            client,
        })
    }

    async fn request(&self, builder: reqwest::RequestBuilder) -> Result<Value, String> {
        let response = builder
            .header("Authorization", format!("Token {}", self.token))
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "replicate request failed");
                format!("⚠️ Error connecting to Replicate: {}", e)
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "replicate returned an error status");
            return Err(status_message(status.as_u16()));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| format!("⚠️ Error connecting to Replicate: {}", e))
    }

    async fn run(&self, question: &str, context: &str) -> Result<String, String> {
        let body = serde_json::json!({
            "version": self.model,
            "input": {
                "prompt": build_prompt(question, context),
                "temperature": 0.2,
                "max_tokens": 400,
                "top_p": 0.9,
            }
        });

        let prediction = self
            .request(self.client.post(format!("{}/predictions", self.url)).json(&body))
            .await?;
        let poll_url = prediction
            .pointer("/urls/get")
            .and_then(Value::as_str)
            .ok_or_else(|| "⚠️ Error connecting to Replicate: missing prediction url".to_string())?
            .to_string();

        for _ in 0..self.max_polls {
            tokio::time::sleep(self.poll_interval).await;
            let result = self.request(self.client.get(&poll_url)).await?;
            match poll_status(&result) {
                PollStatus::Succeeded(text) => return Ok(text),
                PollStatus::Failed(error) => {
                    return Err(format!("⚠️ Replicate prediction failed: {}", error))
                }
                PollStatus::Pending => {}
            }
        }
        Err("⚠️ Request timed out waiting for Replicate response.".to_string())
    }
}

fn status_message(code: u16) -> String {
    match code {
        401 => "⚠️ Invalid Replicate API token. Please check your REPLICATE_API_TOKEN.".to_string(),
        429 => "⚠️ Rate limit exceeded. Please try again later.".to_string(),
        other => format!("⚠️ Replicate API error: {}", other),
    }
}

fn poll_status(prediction: &Value) -> PollStatus {
    match prediction.get("status").and_then(Value::as_str) {
        Some("succeeded") => {
            let text = match prediction.get("output") {
                Some(Value::Array(parts)) => parts
                    .iter()
                    .map(|p| p.as_str().map_or_else(|| p.to_string(), str::to_string))
                    .collect::<String>(),
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            PollStatus::Succeeded(text.trim().to_string())
        }
        Some("failed") | Some("canceled") | Some("cancelled") => PollStatus::Failed(
            prediction
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error")
                .to_string(),
        ),
        _ => PollStatus::Pending,
    }
}

#[async_trait]
impl Generator for ReplicateGenerator {
    fn name(&self) -> &str {
        "replicate"
    }

    async fn answer(&self, question: &str, context: &str) -> (String, Vec<Link>) {
        match self.run(question, context).await {
            Ok(text) => (text, Vec::new()),
            Err(message) => (message, Vec::new()),
        }
    }
}
