//! # Folio
//!
//! A small backend that answers questions about a personal portfolio.
//!
//! Each question goes through context selection, then generation:
//!
//! ```text
//!                   ┌──────────────────┐
//!  question ──────▶ │ ContextSelector  │
//!  (+ section)      └───┬──────────┬───┘
//!                       │          │
//!            dense? ────┘          └──── keyword routing
//!        ┌──────────────┐          ┌──────────────────┐
//!        │DenseRetriever│          │  PortfolioStore   │
//!        │ index + meta │          │ portfolio.json    │
//!        └──────────────┘          │ (mtime reloaded)  │
//!                                  └──────────────────┘
//!                       │
//!                       ▼
//!               ┌──────────────┐     ┌────────────────┐
//!    context ──▶│  Generator   │──▶  │ answer + links │
//!               └──────────────┘     └────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! folio sections                          # check the document loads
//! folio ask "What projects have you built?"
//! folio index build                       # optional: dense retrieval
//! folio serve                             # HTTP API on :8000
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`store`] | Live-reloading portfolio cache |
//! | [`dense`] | Lazily built semantic retriever |
//! | [`selector`] | Dense-or-keyword context selection |
//! | [`embedding`] | Embedding backends |
//! | [`generation`] | Answer generation backends |
//! | [`index_cmd`] | Offline index build and status |
//! | [`server`] | HTTP API |
//!
//! The pure parts (data model, keyword routing, link extraction, chunking,
//! index format) live in the `folio-core` crate.

pub mod ask;
pub mod config;
pub mod dense;
pub mod embedding;
pub mod generation;
pub mod index_cmd;
pub mod sections;
pub mod selector;
pub mod server;
pub mod store;
