//! Remote generation through the Hugging Face serverless Inference API.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use folio_core::models::Link;

use super::Generator;
use crate::config::GenerationConfig;

const DEFAULT_URL: &str = "https://api-inference.huggingface.co";
const DEFAULT_MODEL: &str = "meta-llama/Llama-3.2-3B-Instruct";

/// Generator backed by `POST {url}/models/{model}`.
///
/// `HF_API_KEY` is optional (public models work without it). The model is
/// `[generation].model`, then `HF_MODEL`, then a Llama 3.2 instruct model.
pub struct HfInferenceGenerator {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HfInferenceGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("HF_API_KEY").ok().filter(|k| !k.is_empty());
        let model = config
            .model
            .clone()
            .or_else(|| std::env::var("HF_MODEL").ok())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Self::with_key(config, &model, api_key)
    }

    fn with_key(config: &GenerationConfig, model: &str, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let base = config.url.as_deref().unwrap_or(DEFAULT_URL).trim_end_matches('/');
        Ok(Self {
            endpoint: format!("{}/models/{}", base, model),
            api_key,
            client,
        })
    }
}

/// Llama 3 chat template; instruction-tuned models on the hub expect it.
fn hf_prompt(question: &str, context: &str) -> String {
    format!(
        "<|begin_of_text|><|start_header_id|>system<|end_header_id|>\n\n\
         You are a helpful AI assistant answering questions about a candidate's portfolio. \
         Use only the provided context. Be concise and professional.\
         <|eot_id|><|start_header_id|>user<|end_header_id|>\n\n\
         Context:\n{}\n\nQuestion: {}\
         <|eot_id|><|start_header_id|>assistant<|end_header_id|>\n\n",
        context, question
    )
}

fn status_message(code: u16) -> String {
    match code {
        503 => "⚠️ The model is loading. This can take 20-30 seconds on first request. \
                Please try again in a moment."
            .to_string(),
        401 => "⚠️ Invalid HuggingFace API key. Please check your HF_API_KEY.".to_string(),
        429 => "⚠️ Rate limit exceeded. Please try again later.".to_string(),
        other => format!("⚠️ HuggingFace API error: {}", other),
    }
}

/// Pulls `generated_text` out of either response shape (a list of
/// generations or a single object), dropping an echoed prompt.
fn parse_generation(json: &Value, prompt: &str) -> String {
    let first = match json {
        Value::Array(items) => items.first(),
        other => Some(other),
    };
    let text = match first {
        Some(value) => match value.get("generated_text").and_then(Value::as_str) {
            Some(text) => text.to_string(),
            None => value.to_string(),
        },
        None => String::new(),
    };
    let text = text.trim();
    text.strip_prefix(prompt).unwrap_or(text).trim().to_string()
}

#[async_trait]
impl Generator for HfInferenceGenerator {
    fn name(&self) -> &str {
        "hf_inference"
    }

    async fn answer(&self, question: &str, context: &str) -> (String, Vec<Link>) {
        let prompt = hf_prompt(question, context);
        let body = serde_json::json!({
            "inputs": prompt,
            "parameters": {
                "max_new_tokens": 400,
                "temperature": 0.3,
                "top_p": 0.9,
                "do_sample": true,
                "return_full_text": false,
            }
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return (
                    "⚠️ Request timed out. The model might be loading. Please try again in a moment."
                        .to_string(),
                    Vec::new(),
                )
            }
            Err(e) => {
                tracing::warn!(error = %e, "hf_inference request failed");
                return (format!("⚠️ Error connecting to HuggingFace: {}", e), Vec::new());
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "hf_inference returned an error status");
            return (status_message(status.as_u16()), Vec::new());
        }

        match response.json::<Value>().await {
            Ok(json) => {
                let text = parse_generation(&json, &prompt);
                if text.is_empty() {
                    ("I couldn't generate a response. Please try again.".to_string(), Vec::new())
                } else {
                    (text, Vec::new())
                }
            }
            Err(e) => (format!("⚠️ Error connecting to HuggingFace: {}", e), Vec::new()),
        }
    }
}
