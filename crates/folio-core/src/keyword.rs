//! Keyword routing: the zero-setup retrieval strategy.
//!
//! A question is mapped to one section of the portfolio by scanning its
//! lowercased text for substrings from a fixed table. The table is ordered
//! and the first section with a matching keyword wins, so a question that
//! mentions both skills and projects routes to projects.
//!
//! An explicit section hint takes precedence over the scan. When neither a
//! hint nor a keyword applies, the whole document is returned.
//!
//! ```rust
//! use folio_core::keyword::{classify, route};
//! use folio_core::models::{Portfolio, Section};
//!
//! assert_eq!(
//!     classify(None, "what skills and projects have you built"),
//!     Some(Section::Projects)
//! );
//! let doc = Portfolio::from_json(r#"{"about": "hello"}"#).unwrap();
//! assert_eq!(route(&doc, None, "?"), doc.to_json());
//! ```

use crate::models::{Portfolio, Section};

/// Keywords per section in routing priority order.
pub const KEYWORD_TABLE: [(Section, &[&str]); 5] = [
    (Section::Projects, &["project", "built", "develop"]),
    (
        Section::Skills,
        &["stack", "skill", "tech", "language", "framework"],
    ),
    (
        Section::Experience,
        &["work", "job", "company", "experience", "role"],
    ),
    (
        Section::Education,
        &["degree", "university", "education", "study", "college"],
    ),
    (
        Section::Certifications,
        &["cert", "certification", "certified"],
    ),
];

/// Decides which section a question targets, if any.
///
/// A recognised `section` hint wins outright. Unrecognised hints (for
/// example `"Overview"`) are ignored and the question scan runs as usual.
pub fn classify(section: Option<&str>, question: &str) -> Option<Section> {
    if let Some(hinted) = section.and_then(Section::parse) {
        return Some(hinted);
    }

    let q = question.to_lowercase();
    KEYWORD_TABLE
        .iter()
        .find(|(_, words)| words.iter().any(|w| q.contains(w)))
        .map(|(s, _)| *s)
}

/// Builds the keyword-routed context for a question.
pub fn route(portfolio: &Portfolio, section: Option<&str>, question: &str) -> String {
    match classify(section, question) {
        Some(s) => portfolio.section_json(s),
        None => portfolio.to_json(),
    }
}
