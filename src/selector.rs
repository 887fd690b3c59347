//! Context selection: the single entry point used by the request layer.
//!
//! Precedence, decided afresh on every call:
//!
//! 1. dense retrieval, when enabled in config, available, and non-empty;
//! 2. keyword routing over the current portfolio snapshot.
//!
//! Selection never fails. The worst case is the whole document.

use std::sync::Arc;

use folio_core::keyword;
use folio_core::links::{self, extract_links};
use folio_core::models::{Link, Portfolio};

use crate::config::Config;
use crate::dense::{DenseRetriever, IndexPaths};
use crate::store::PortfolioStore;

/// Which strategy produced a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Dense,
    Keyword,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Dense => "dense",
            Strategy::Keyword => "keyword",
        }
    }
}

/// Selected context together with its provenance.
#[derive(Debug, Clone)]
pub struct Selection {
    pub context: String,
    pub strategy: Strategy,
}

/// Owns the store and the dense retriever and arbitrates between them.
pub struct ContextSelector {
    store: Arc<PortfolioStore>,
    dense: Arc<DenseRetriever>,
    dense_enabled: bool,
    top_k: usize,
}

impl ContextSelector {
    pub fn new(
        store: Arc<PortfolioStore>,
        dense: Arc<DenseRetriever>,
        dense_enabled: bool,
        top_k: usize,
    ) -> Self {
        Self {
            store,
            dense,
            dense_enabled,
            top_k: top_k.max(1),
        }
    }

    /// Wires a selector from configuration: file-backed store and a dense
    /// retriever that loads its embedder on first use.
    pub fn from_config(config: &Config) -> Self {
        let store = Arc::new(PortfolioStore::from_path(config.portfolio.path.clone()));
        let dense = Arc::new(DenseRetriever::new(
            IndexPaths::from_config(&config.retrieval),
            config.embedding.clone(),
        ));
        Self::new(
            store,
            dense,
            config.retrieval.enable_dense,
            config.retrieval.top_k,
        )
    }

    pub fn store(&self) -> &Arc<PortfolioStore> {
        &self.store
    }

    pub fn dense(&self) -> &Arc<DenseRetriever> {
        &self.dense
    }

    pub fn dense_enabled(&self) -> bool {
        self.dense_enabled
    }

    /// Current portfolio snapshot.
    pub async fn load_portfolio(&self) -> Arc<Portfolio> {
        self.store.load_async().await
    }

    /// Invalidates the store cache and reloads the portfolio.
    pub async fn force_reload_portfolio(&self) -> Arc<Portfolio> {
        let store = self.store.clone();
        match tokio::task::spawn_blocking(move || store.force_reload()).await {
            Ok(doc) => doc,
            Err(_) => self.store.load_async().await,
        }
    }

    /// Context for a question and optional section hint.
    pub async fn select_context(&self, section: Option<&str>, question: &str) -> String {
        self.select(section, question).await.context
    }

    /// Like [`select_context`](Self::select_context), also reporting the strategy used.
    pub async fn select(&self, section: Option<&str>, question: &str) -> Selection {
        if self.dense_enabled {
            if let Some(context) = self.dense.search(question, self.top_k).await {
                tracing::debug!(strategy = "dense", "context selected");
                return Selection {
                    context,
                    strategy: Strategy::Dense,
                };
            }
        }

        let portfolio = self.store.load_async().await;
        let context = keyword::route(&portfolio, section, question);
        tracing::debug!(strategy = "keyword", section = ?section, "context selected");
        Selection {
            context,
            strategy: Strategy::Keyword,
        }
    }

    /// Reference links found in a selected context.
    pub fn extract_links(&self, context: &str) -> Vec<Link> {
        extract_links(context)
    }

    /// Backend links first, then context links; deduplicated and capped.
    pub fn merge_links(&self, backend: Vec<Link>, context: &str) -> Vec<Link> {
        links::merge_links(backend, extract_links(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dense::test_support::VocabEmbedder;
    use crate::dense::write_artifacts;
    use folio_core::chunk::build_chunks;
    use folio_core::index::DenseIndex;
    use tempfile::TempDir;

    const DOC: &str = r#"{
        "about": "Backend engineer who likes Rust.",
        "skills": [{"name": "Rust", "level": "Expert"}, {"name": "Python"}],
        "projects": [
            {"name": "Folio", "summary": "Portfolio Q&A in Rust", "repo": "https://github.com/me/folio", "demo": "https://folio.dev"},
            {"name": "Kube Tools", "summary": "Kubernetes helpers", "repo": "https://github.com/me/kube"}
        ],
        "experience": [{"company": "Acme", "role": "Engineer"}],
        "education": [{"degree": "BSc", "field": "CS", "institution": "Uni"}],
        "certifications": [{"name": "CKA", "url": "https://cert.example/cka"}]
    }"#;

    const VOCAB: [&str; 4] = ["rust", "python", "kubernetes", "engineer"];

    struct Fixture {
        _dir: TempDir,
        store: Arc<PortfolioStore>,
        paths: IndexPaths,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let doc_path = dir.path().join("portfolio.json");
        std::fs::write(&doc_path, DOC).unwrap();
        let paths = IndexPaths {
            index: dir.path().join("folio.index"),
            meta: dir.path().join("folio.meta.json"),
        };
        Fixture {
            store: Arc::new(PortfolioStore::from_path(doc_path)),
            paths,
            _dir: dir,
        }
    }

    fn build_index(fx: &Fixture) {
        let embedder = VocabEmbedder::new(&VOCAB);
        let chunks = build_chunks(&fx.store.load());
        let vectors = chunks.iter().map(|c| embedder.vector(&c.text)).collect();
        let index = DenseIndex::new("vocab-test", VOCAB.len(), vectors).unwrap();
        write_artifacts(&fx.paths, &index, &chunks).unwrap();
    }

    fn selector(fx: &Fixture, dense_enabled: bool) -> ContextSelector {
        let dense = DenseRetriever::with_embedder(
            fx.paths.clone(),
            Arc::new(VocabEmbedder::new(&VOCAB)),
        );
        ContextSelector::new(fx.store.clone(), Arc::new(dense), dense_enabled, 2)
    }

    #[tokio::test]
    async fn test_keyword_when_dense_disabled() {
        let fx = fixture();
        build_index(&fx);
        let sel = selector(&fx, false).select(None, "what rust projects").await;
        assert_eq!(sel.strategy, Strategy::Keyword);
        let parsed: serde_json::Value = serde_json::from_str(&sel.context).unwrap();
        assert_eq!(parsed[0]["name"], "Folio");
    }

    #[tokio::test]
    async fn test_dense_when_enabled_and_available() {
        let fx = fixture();
        build_index(&fx);
        let sel = selector(&fx, true).select(None, "kubernetes").await;
        assert_eq!(sel.strategy, Strategy::Dense);
        assert!(sel.context.starts_with("Project: Kube Tools"));
    }

    #[tokio::test]
    async fn test_missing_index_matches_disabled_output() {
        let fx = fixture();
        let questions = [
            (None, "what skills and projects have you built"),
            (Some("EDUCATION"), "which projects did you build"),
            (None, ""),
            (Some("Overview"), "hello there"),
        ];
        let enabled = selector(&fx, true);
        let disabled = selector(&fx, false);
        for (section, q) in questions {
            assert_eq!(
                enabled.select_context(section, q).await,
                disabled.select_context(section, q).await
            );
        }
    }

    #[tokio::test]
    async fn test_always_returns_parseable_context() {
        let fx = fixture();
        let sel = selector(&fx, false);
        for q in ["", "   ", "🦀🦀", "certs?", "where did you study", "zzz"] {
            let ctx = sel.select_context(None, q).await;
            assert!(serde_json::from_str::<serde_json::Value>(&ctx).is_ok(), "{}", q);
        }
    }

    #[tokio::test]
    async fn test_full_document_fallback_has_no_links() {
        let fx = fixture();
        let sel = selector(&fx, false);
        let ctx = sel.select_context(None, "hello").await;
        assert_eq!(ctx, fx.store.load().to_json());
        assert!(sel.extract_links(&ctx).is_empty());
    }

    #[tokio::test]
    async fn test_dense_context_has_no_structural_links() {
        let fx = fixture();
        build_index(&fx);
        let sel = selector(&fx, true);
        let ctx = sel.select_context(None, "rust engineer").await;
        assert!(sel.extract_links(&ctx).is_empty());
    }

    #[tokio::test]
    async fn test_merge_links_puts_backend_first() {
        let fx = fixture();
        let sel = selector(&fx, false);
        let ctx = sel.select_context(Some("projects"), "").await;
        let merged = sel.merge_links(
            vec![Link::new("Folio (from backend)", "https://github.com/me/folio")],
            &ctx,
        );
        assert_eq!(merged[0].label, "Folio (from backend)");
        assert_eq!(merged.len(), 3);
    }

    #[tokio::test]
    async fn test_sees_portfolio_edits() {
        let fx = fixture();
        let sel = selector(&fx, false);
        assert!(sel.select_context(Some("about"), "").await.contains("Backend engineer"));

        let path = fx._dir.path().join("portfolio.json");
        std::fs::write(&path, r#"{"about": "Now a data engineer."}"#).unwrap();
        let ctx = sel.force_reload_portfolio().await;
        assert_eq!(ctx.about.as_deref(), Some("Now a data engineer."));
        assert!(sel.select_context(Some("about"), "").await.contains("data engineer"));
    }
}
