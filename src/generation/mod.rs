//! Answer generation backends.
//!
//! A [`Generator`] turns a question plus the selected context into answer
//! text and optional reference links. Generators never fail: transport or
//! API errors come back as apologetic text so a chat request always has
//! something to show.
//!
//! | Provider | Network | Notes |
//! |----------|---------|-------|
//! | `rule_based` | none | templated answers from the parsed context |
//! | `ollama` | local | `POST {url}/api/generate` |
//! | `openai` | remote | chat completions, needs `OPENAI_API_KEY` |
//! | `hf_inference` | remote | Hugging Face Inference API, `HF_API_KEY` optional |
//! | `replicate` | remote | polled predictions, needs `REPLICATE_API_TOKEN` |

mod hf_inference;
mod ollama;
mod openai;
mod replicate;
mod rule_based;

pub use hf_inference::HfInferenceGenerator;
pub use ollama::OllamaGenerator;
pub use openai::OpenAIGenerator;
pub use replicate::ReplicateGenerator;
pub use rule_based::RuleBasedGenerator;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use folio_core::models::Link;

use crate::config::GenerationConfig;

/// A text generation backend.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Provider name as written in configuration.
    fn name(&self) -> &str;

    /// Answers `question` from `context`.
    async fn answer(&self, question: &str, context: &str) -> (String, Vec<Link>);
}

/// Prompt shared by the LLM backends.
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "You are a helpful AI assistant answering questions about a candidate's portfolio. \
         Use ONLY the information provided in the context below. \
         Be concise, professional, and include specific details from the context. \
         If the context doesn't contain relevant information, politely say so.\n\n\
         Context:\n{}\n\nQuestion: {}\n\nAnswer:",
        context, question
    )
}

/// Cuts `context` to at most `max_chars` characters, marking the cut with `...`.
pub fn truncate_context(context: &str, max_chars: usize) -> String {
    match context.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &context[..byte_idx]),
        None => context.to_string(),
    }
}

/// Builds the configured generator, falling back to `rule_based` when the
/// provider is unknown or cannot be constructed.
pub fn create_generator(config: &GenerationConfig) -> Arc<dyn Generator> {
    match try_create_generator(config) {
        Ok(generator) => {
            tracing::info!(provider = generator.name(), "generator ready");
            generator
        }
        Err(e) => {
            let error = format!("{:#}", e);
            tracing::warn!(
                provider = %config.provider,
                %error,
                "generator unavailable, falling back to rule_based"
            );
            Arc::new(RuleBasedGenerator)
        }
    }
}

fn try_create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "rule_based" => Ok(Arc::new(RuleBasedGenerator)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "hf_inference" => Ok(Arc::new(HfInferenceGenerator::new(config)?)),
        "replicate" => Ok(Arc::new(ReplicateGenerator::new(config)?)),
        other => anyhow::bail!("Unknown generation provider: {}", other),
    }
}
