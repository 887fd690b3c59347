//! Dense (semantic) retrieval over the prebuilt chunk index.
//!
//! The retriever starts out [`DenseState::Unbuilt`]. The first call to
//! [`DenseRetriever::available`] or [`DenseRetriever::search`] builds it:
//! both artifact files are read and validated against each other and the
//! embedding model is loaded. The result is either `Ready` or
//! `Unavailable`, and it never changes afterwards. Construction goes
//! through a `tokio::sync::OnceCell`, so concurrent first callers wait for
//! a single build instead of loading the model twice.
//!
//! Nothing here returns an error to the caller. An unavailable retriever
//! or a failed search both come back as `None`, and the context selector
//! falls back to keyword routing.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;

use folio_core::index::DenseIndex;
use folio_core::models::Chunk;

use crate::config::{EmbeddingConfig, RetrievalConfig};
use crate::embedding::{self, Embedder};

/// Locations of the two index artifacts.
#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub index: PathBuf,
    pub meta: PathBuf,
}

impl IndexPaths {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            index: config.index_path.clone(),
            meta: config.meta_path.clone(),
        }
    }

    pub fn exist(&self) -> bool {
        self.index.is_file() && self.meta.is_file()
    }
}

/// Lifecycle of the retriever, as reported by [`DenseRetriever::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenseState {
    Unbuilt,
    Unavailable,
    Ready,
}

impl DenseState {
    pub fn as_str(self) -> &'static str {
        match self {
            DenseState::Unbuilt => "unbuilt",
            DenseState::Unavailable => "unavailable",
            DenseState::Ready => "ready",
        }
    }
}

/// Loaded index, chunk texts and query embedder.
pub struct LoadedIndex {
    index: DenseIndex,
    chunks: Vec<Chunk>,
    embedder: Arc<dyn Embedder>,
}

impl LoadedIndex {
    /// Pairs an index with its chunks and checks they belong together.
    pub fn new(index: DenseIndex, chunks: Vec<Chunk>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        if index.len() != chunks.len() {
            bail!(
                "index has {} vectors but metadata has {} chunks",
                index.len(),
                chunks.len()
            );
        }
        if index.model != embedder.model_name() {
            bail!(
                "index was built with model '{}' but the configured model is '{}'",
                index.model,
                embedder.model_name()
            );
        }
        if embedder.dims() != 0 && embedder.dims() != index.dims {
            bail!(
                "index has {} dims but the embedder produces {}",
                index.dims,
                embedder.dims()
            );
        }
        Ok(Self {
            index,
            chunks,
            embedder,
        })
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Joins the text of the `top_k` closest chunks, best first.
    pub async fn search(&self, question: &str, top_k: usize) -> Result<String> {
        let query = embedding::embed_query(self.embedder.as_ref(), question).await?;
        if query.len() != self.index.dims {
            bail!(
                "query embedding has {} dims, index has {}",
                query.len(),
                self.index.dims
            );
        }

        let texts: Vec<&str> = self
            .index
            .top_k(&query, top_k)
            .into_iter()
            .filter_map(|(i, _)| self.chunks.get(i))
            .map(|c| c.text.as_str())
            .collect();
        Ok(texts.join("\n\n"))
    }
}

/// Where the query embedder comes from when the index is first built.
enum EmbedderSource {
    Config(EmbeddingConfig),
    Provided(Arc<dyn Embedder>),
}

/// Lazily built semantic retriever.
pub struct DenseRetriever {
    paths: IndexPaths,
    embedder: EmbedderSource,
    /// `Some` once built and usable, `None` once built and unavailable.
    cell: OnceCell<Option<Arc<LoadedIndex>>>,
}

impl DenseRetriever {
    /// Retriever that creates its embedder from configuration on first use.
    pub fn new(paths: IndexPaths, embedding: EmbeddingConfig) -> Self {
        Self {
            paths,
            embedder: EmbedderSource::Config(embedding),
            cell: OnceCell::new(),
        }
    }

    /// Retriever with an already constructed embedder.
    pub fn with_embedder(paths: IndexPaths, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            paths,
            embedder: EmbedderSource::Provided(embedder),
            cell: OnceCell::new(),
        }
    }

    pub fn state(&self) -> DenseState {
        match self.cell.get() {
            None => DenseState::Unbuilt,
            Some(None) => DenseState::Unavailable,
            Some(Some(_)) => DenseState::Ready,
        }
    }

    /// Builds the retriever if needed and reports whether it is usable.
    pub async fn available(&self) -> bool {
        self.loaded().await.is_some()
    }

    /// Semantic context for a question.
    ///
    /// `None` when the retriever is unavailable, the search fails, or no
    /// chunk text was found.
    pub async fn search(&self, question: &str, top_k: usize) -> Option<String> {
        let loaded = self.loaded().await?;
        match loaded.search(question, top_k).await {
            Ok(context) if !context.trim().is_empty() => Some(context),
            Ok(_) => None,
            Err(e) => {
                let error = format!("{:#}", e);
                tracing::warn!(%error, "dense search failed");
                None
            }
        }
    }

    async fn loaded(&self) -> Option<Arc<LoadedIndex>> {
        self.cell
            .get_or_init(|| async {
                match self.build().await {
                    Ok(loaded) => {
                        tracing::info!(
                            chunks = loaded.chunk_count(),
                            index = %self.paths.index.display(),
                            "dense retriever ready"
                        );
                        Some(Arc::new(loaded))
                    }
                    Err(e) => {
                        let error = format!("{:#}", e);
                        tracing::warn!(%error, "dense retriever unavailable");
                        None
                    }
                }
            })
            .await
            .clone()
    }

    async fn build(&self) -> Result<LoadedIndex> {
        if !self.paths.exist() {
            bail!(
                "index artifacts not found ({}, {})",
                self.paths.index.display(),
                self.paths.meta.display()
            );
        }

        let (index, chunks) = read_artifacts(&self.paths).await?;

        let embedder = match &self.embedder {
            EmbedderSource::Provided(embedder) => embedder.clone(),
            EmbedderSource::Config(config) => {
                let config = config.clone();
                tokio::task::spawn_blocking(move || embedding::create_embedder(&config))
                    .await
                    .context("embedder construction panicked")??
            }
        };

        LoadedIndex::new(index, chunks, embedder)
    }
}

/// Reads and parses both artifacts.
pub async fn read_artifacts(paths: &IndexPaths) -> Result<(DenseIndex, Vec<Chunk>)> {
    let index_bytes = tokio::fs::read(&paths.index)
        .await
        .with_context(|| format!("Failed to read {}", paths.index.display()))?;
    let index = DenseIndex::from_bytes(&index_bytes)
        .with_context(|| format!("Invalid index file {}", paths.index.display()))?;

    let meta = tokio::fs::read_to_string(&paths.meta)
        .await
        .with_context(|| format!("Failed to read {}", paths.meta.display()))?;
    let chunks: Vec<Chunk> = serde_json::from_str(&meta)
        .with_context(|| format!("Invalid metadata file {}", paths.meta.display()))?;

    Ok((index, chunks))
}

/// Writes both artifacts, creating parent directories as needed.
pub fn write_artifacts(paths: &IndexPaths, index: &DenseIndex, chunks: &[Chunk]) -> Result<()> {
    for path in [&paths.index, &paths.meta] {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    std::fs::write(&paths.index, index.to_bytes())
        .with_context(|| format!("Failed to write {}", paths.index.display()))?;
    std::fs::write(&paths.meta, serde_json::to_string_pretty(chunks)?)
        .with_context(|| format!("Failed to write {}", paths.meta.display()))?;
    Ok(())
}
