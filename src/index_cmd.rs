//! `folio index build` and `folio index status`.

use anyhow::{bail, Context, Result};
use std::sync::Arc;

use folio_core::chunk::build_chunks;
use folio_core::index::DenseIndex;
use folio_core::models::{Chunk, Portfolio};

use crate::config::Config;
use crate::dense::{read_artifacts, write_artifacts, IndexPaths};
use crate::embedding::{self, Embedder};

/// Chunks the portfolio, embeds every chunk and writes both index artifacts.
///
/// Unlike the request path this is strict: an unreadable portfolio or a
/// failed embedding batch aborts the build and leaves existing artifacts
/// untouched.
pub async fn run_index_build(config: &Config, batch_size_override: Option<usize>) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let portfolio = read_portfolio(config)?;

    let embedding_config = config.embedding.clone();
    let embedder: Arc<dyn Embedder> =
        tokio::task::spawn_blocking(move || embedding::create_embedder(&embedding_config))
            .await
            .context("embedder construction panicked")??;

    let batch_size = batch_size_override.unwrap_or(config.embedding.batch_size).max(1);
    let (index, chunks) = build_index(&portfolio, embedder.as_ref(), batch_size).await?;

    let paths = IndexPaths::from_config(&config.retrieval);
    write_artifacts(&paths, &index, &chunks)?;

    tracing::info!(chunks = chunks.len(), model = %index.model, "dense index written");
    println!("index build");
    println!("  model: {}", index.model);
    println!("  dims: {}", index.dims);
    println!("  chunks: {}", chunks.len());
    println!("  index: {}", paths.index.display());
    println!("  meta: {}", paths.meta.display());
    Ok(())
}

/// Embeds the portfolio's chunks with `embedder`.
pub async fn build_index(
    portfolio: &Portfolio,
    embedder: &dyn Embedder,
    batch_size: usize,
) -> Result<(DenseIndex, Vec<Chunk>)> {
    let chunks = build_chunks(portfolio);
    if chunks.is_empty() {
        bail!("Portfolio has no content to index");
    }

    let mut vectors = Vec::with_capacity(chunks.len());
    for (n, batch) in chunks.chunks(batch_size.max(1)).enumerate() {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embedded = embedder
            .embed(&texts)
            .await
            .with_context(|| format!("Embedding batch {} failed", n + 1))?;
        if embedded.len() != texts.len() {
            bail!(
                "Embedding batch {} returned {} vectors for {} chunks",
                n + 1,
                embedded.len(),
                texts.len()
            );
        }
        vectors.extend(embedded);
    }

    let dims = match embedder.dims() {
        0 => vectors.first().map_or(0, Vec::len),
        d => d,
    };
    let index = DenseIndex::new(embedder.model_name(), dims, vectors)?;
    Ok((index, chunks))
}

/// Reports whether the artifacts exist, load, and match the configured model.
pub async fn run_index_status(config: &Config) -> Result<()> {
    let paths = IndexPaths::from_config(&config.retrieval);

    println!("index status");
    println!(
        "  dense retrieval: {}",
        if config.retrieval.enable_dense { "enabled" } else { "disabled" }
    );
    println!(
        "  index: {} ({})",
        paths.index.display(),
        if paths.index.exists() { "present" } else { "missing" }
    );
    println!(
        "  meta: {} ({})",
        paths.meta.display(),
        if paths.meta.exists() { "present" } else { "missing" }
    );

    if !paths.exist() {
        println!("  state: unbuilt (run `folio index build`)");
        return Ok(());
    }

    match read_artifacts(&paths).await {
        Ok((index, chunks)) => {
            println!("  model: {}", index.model);
            println!("  dims: {}", index.dims);
            println!("  chunks: {}", chunks.len());
            let configured = config.embedding.model_name();
            if index.model != configured {
                println!(
                    "  state: stale (built with {}, config uses {}; rebuild the index)",
                    index.model, configured
                );
            } else {
                println!("  state: ok");
            }
        }
        Err(e) => {
            println!("  state: unreadable ({:#})", e);
        }
    }
    Ok(())
}

fn read_portfolio(config: &Config) -> Result<Portfolio> {
    let path = &config.portfolio.path;
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read portfolio: {}", path.display()))?;
    Portfolio::from_json(&text).with_context(|| format!("Invalid portfolio JSON in {}", path.display()))
}
