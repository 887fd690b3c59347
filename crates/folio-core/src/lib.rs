//! # Folio Core
//!
//! I/O-free building blocks for Folio: the typed portfolio model, keyword
//! routing, link extraction, chunking for the dense index, and the dense
//! index format with its similarity search.
//!
//! Nothing here touches the file system, the network or an async runtime;
//! the `folio` crate supplies those.

pub mod chunk;
pub mod index;
pub mod keyword;
pub mod links;
pub mod models;
