//! Reference-link extraction from selected context.
//!
//! Discovery is structural: the context is parsed as JSON and only a list
//! of records is inspected. Full-document context and dense-search text
//! never yield links here.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::models::Link;

/// Upper bound on links returned to a client.
pub const MAX_LINKS: usize = 4;

/// Extracts up to [`MAX_LINKS`] links from a context string.
///
/// For each record in a JSON array:
/// - `repo` yields `"<name> - GitHub"`;
/// - `demo` yields `"<name> - Live Demo"`;
/// - `url` together with `name` yields a link labelled `name`.
///
/// Only non-blank string values count; `name` defaults to `"Project"` for
/// the first two. Links are deduplicated by url, keeping the first
/// occurrence. Anything that does not parse as a
/// JSON array yields an empty list.
pub fn extract_links(context: &str) -> Vec<Link> {
    let records = match serde_json::from_str::<Value>(context) {
        Ok(Value::Array(items)) => items,
        _ => return Vec::new(),
    };

    let candidates = records
        .iter()
        .filter_map(Value::as_object)
        .flat_map(record_links);

    dedup_capped(candidates)
}

fn record_links(record: &Map<String, Value>) -> Vec<Link> {
    let text = |key: &str| {
        record
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    };
    let name = text("name");
    let label_base = name.unwrap_or("Project");

    let mut links = Vec::new();
    if let Some(repo) = text("repo") {
        links.push(Link::new(format!("{} - GitHub", label_base), repo));
    }
    if let Some(demo) = text("demo") {
        links.push(Link::new(format!("{} - Live Demo", label_base), demo));
    }
    if let (Some(url), Some(name)) = (text("url"), name) {
        links.push(Link::new(name, url));
    }
    links
}

/// Combines backend-supplied links with extracted ones.
///
/// Backend links come first; duplicates across both lists are dropped by
/// url and the result is capped at [`MAX_LINKS`].
pub fn merge_links(backend: Vec<Link>, extracted: Vec<Link>) -> Vec<Link> {
    dedup_capped(backend.into_iter().chain(extracted))
}

fn dedup_capped(links: impl IntoIterator<Item = Link>) -> Vec<Link> {
    let mut seen = HashSet::new();
    links
        .into_iter()
        .filter(|l| seen.insert(l.url.clone()))
        .take(MAX_LINKS)
        .collect()
}
