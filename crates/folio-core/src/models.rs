//! Typed model of the portfolio document.
//!
//! The document is a JSON object whose top-level keys name sections. Every
//! record field is optional; scalars that arrive as numbers or booleans are
//! accepted and kept as text. Unknown keys, and values of an unexpected
//! shape, are preserved in `extra`. Section and document JSON is rendered
//! from the source object, so serializing back into context loses nothing.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// One top-level category of the portfolio document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    About,
    Skills,
    Projects,
    Experience,
    Education,
    Certifications,
}

impl Section {
    pub const ALL: [Section; 6] = [
        Section::About,
        Section::Skills,
        Section::Projects,
        Section::Experience,
        Section::Education,
        Section::Certifications,
    ];

    /// The JSON key of this section.
    pub fn key(self) -> &'static str {
        match self {
            Section::About => "about",
            Section::Skills => "skills",
            Section::Projects => "projects",
            Section::Experience => "experience",
            Section::Education => "education",
            Section::Certifications => "certifications",
        }
    }

    /// Parses a section hint such as `"PROJECTS"` or `" skills "`.
    pub fn parse(hint: &str) -> Option<Section> {
        let hint = hint.trim();
        Section::ALL
            .into_iter()
            .find(|s| s.key().eq_ignore_ascii_case(hint))
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    #[serde(default, deserialize_with = "opt_text", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "opt_text", skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(
        rename = "lastUsed",
        default,
        deserialize_with = "opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_used: Option<String>,
    #[serde(default, deserialize_with = "opt_text", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default, deserialize_with = "opt_text", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "opt_text", skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "text_list", skip_serializing_if = "Vec::is_empty")]
    pub stack: Vec<String>,
    #[serde(default, deserialize_with = "opt_text", skip_serializing_if = "Option::is_none")]
    pub impact: Option<String>,
    #[serde(default, deserialize_with = "text_list", skip_serializing_if = "Vec::is_empty")]
    pub highlights: Vec<String>,
    #[serde(default, deserialize_with = "opt_text", skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(default, deserialize_with = "opt_text", skip_serializing_if = "Option::is_none")]
    pub demo: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    #[serde(default, deserialize_with = "opt_text", skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, deserialize_with = "opt_text", skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "opt_text", skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, deserialize_with = "opt_text", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "text_list", skip_serializing_if = "Vec::is_empty")]
    pub achievements: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Education {
    #[serde(default, deserialize_with = "opt_text", skip_serializing_if = "Option::is_none")]
    pub degree: Option<String>,
    #[serde(default, deserialize_with = "opt_text", skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, deserialize_with = "opt_text", skip_serializing_if = "Option::is_none")]
    pub institution: Option<String>,
    #[serde(default, deserialize_with = "opt_text", skip_serializing_if = "Option::is_none")]
    pub graduation: Option<String>,
    #[serde(default, deserialize_with = "text_list", skip_serializing_if = "Vec::is_empty")]
    pub relevant_courses: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Certification {
    #[serde(default, deserialize_with = "opt_text", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "opt_text", skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default, deserialize_with = "opt_text", skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "opt_text", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The whole portfolio document.
///
/// The typed fields are a lenient view used for chunking and counting:
/// non-object list elements are skipped and a section that is not a list
/// stays `None`. Serialization always goes through the source object, so
/// the routed context mirrors the file exactly. The `Default` value is the
/// empty document returned when loading fails.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Portfolio {
    pub about: Option<String>,
    pub skills: Option<Vec<Skill>>,
    pub projects: Option<Vec<Project>>,
    pub experience: Option<Vec<Experience>>,
    pub education: Option<Vec<Education>>,
    pub certifications: Option<Vec<Certification>>,
    /// Top-level keys that are not known sections.
    pub extra: Map<String, Value>,
    source: Map<String, Value>,
}

impl Portfolio {
    /// Parses a document from JSON text. Only a non-object top level fails.
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    fn from_object(source: Map<String, Value>) -> Self {
        let extra = source
            .iter()
            .filter(|(key, _)| !Section::ALL.iter().any(|s| s.key() == key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Self {
            about: source.get("about").cloned().and_then(scalar_text),
            skills: records(&source, Section::Skills),
            projects: records(&source, Section::Projects),
            experience: records(&source, Section::Experience),
            education: records(&source, Section::Education),
            certifications: records(&source, Section::Certifications),
            extra,
            source,
        }
    }

    /// True for the empty-state document (nothing loaded or load failed).
    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Whether the document has the section's key, whatever its shape.
    pub fn has(&self, section: Section) -> bool {
        self.source.contains_key(section.key())
    }

    /// Top-level keys present in the document, known sections first.
    pub fn section_names(&self) -> Vec<String> {
        Section::ALL
            .into_iter()
            .filter(|s| self.has(*s))
            .map(|s| s.key().to_string())
            .chain(self.extra.keys().cloned())
            .collect()
    }

    /// Number of entries in a list section (`about` counts as one when set).
    pub fn record_count(&self, section: Section) -> usize {
        match self.source.get(section.key()) {
            Some(Value::Array(items)) => items.len(),
            Some(Value::Null) | None => 0,
            Some(_) => 1,
        }
    }

    /// Pretty JSON for one section, exactly as it appears in the document.
    /// Missing list sections render as `[]` and a missing `about` as `""`.
    pub fn section_json(&self, section: Section) -> String {
        match self.source.get(section.key()) {
            Some(value) => pretty(value, "[]"),
            None if section == Section::About => "\"\"".to_string(),
            None => "[]".to_string(),
        }
    }

    /// Pretty JSON for the whole document.
    pub fn to_json(&self) -> String {
        pretty(self, "{}")
    }
}

impl Serialize for Portfolio {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.source.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Portfolio {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Map::deserialize(deserializer).map(Portfolio::from_object)
    }
}

/// A section record with a catch-all `extra` map.
trait Record: Default + Serialize + DeserializeOwned {
    fn extra_mut(&mut self) -> &mut Map<String, Value>;

    /// Reads a record from a JSON object. Values the typed fields could not
    /// take (a list where text was expected, say) move into `extra`.
    fn from_object(object: &Map<String, Value>) -> Self {
        let mut record: Self =
            serde_json::from_value(Value::Object(object.clone())).unwrap_or_default();
        let kept = match serde_json::to_value(&record) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        for (key, value) in object {
            if !value.is_null() && !kept.contains_key(key) {
                record.extra_mut().insert(key.clone(), value.clone());
            }
        }
        record
    }
}

macro_rules! impl_record {
    ($($ty:ty),*) => {
        $(impl Record for $ty {
            fn extra_mut(&mut self) -> &mut Map<String, Value> {
                &mut self.extra
            }
        })*
    };
}

impl_record!(Skill, Project, Experience, Education, Certification);

fn records<T: Record>(source: &Map<String, Value>, section: Section) -> Option<Vec<T>> {
    let items = source.get(section.key())?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(Value::as_object)
            .map(T::from_object)
            .collect(),
    )
}

fn pretty<T: Serialize + ?Sized>(value: &T, fallback: &str) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| fallback.to_string())
}

/// A `{label, url}` reference shown next to an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub label: String,
    pub url: String,
}

impl Link {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }
}

/// One unit of dense retrieval: a stable identifier such as `projects:2`
/// and the text that was embedded for it. Stored as an `[id, text]` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct Chunk {
    pub id: String,
    pub text: String,
}

impl From<(String, String)> for Chunk {
    fn from((id, text): (String, String)) -> Self {
        Self { id, text }
    }
}

impl From<Chunk> for (String, String) {
    fn from(chunk: Chunk) -> Self {
        (chunk.id, chunk.text)
    }
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn opt_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_text(Value::deserialize(deserializer)?))
}

fn text_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().filter_map(scalar_text).collect(),
        other => scalar_text(other).into_iter().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_parse_is_case_insensitive() {
        assert_eq!(Section::parse("EDUCATION"), Some(Section::Education));
        assert_eq!(Section::parse(" projects "), Some(Section::Projects));
        assert_eq!(Section::parse("Overview"), None);
    }

    #[test]
    fn test_missing_fields_default() {
        let doc = Portfolio::from_json(r#"{"projects": [{}, {"name": "Folio"}]}"#).unwrap();
        let projects = doc.projects.as_ref().unwrap();
        assert_eq!(projects.len(), 2);
        assert!(projects[0].name.is_none());
        assert!(projects[0].stack.is_empty());
        assert_eq!(projects[1].name.as_deref(), Some("Folio"));
        assert!(doc.skills.is_none());
    }

    #[test]
    fn test_lenient_scalars() {
        let doc = Portfolio::from_json(
            r#"{"skills": [{"name": "Rust", "level": 5, "lastUsed": 2024, "current": true}],
                "projects": [{"name": "x", "stack": "Rust", "repo": null}]}"#,
        )
        .unwrap();
        let skill = &doc.skills.as_ref().unwrap()[0];
        assert_eq!(skill.level.as_deref(), Some("5"));
        assert_eq!(skill.last_used.as_deref(), Some("2024"));
        assert_eq!(skill.extra.get("current"), Some(&Value::Bool(true)));
        let project = &doc.projects.as_ref().unwrap()[0];
        assert_eq!(project.stack, vec!["Rust".to_string()]);
        assert!(project.repo.is_none());
    }

    #[test]
    fn test_odd_shaped_fields_are_kept() {
        let doc = Portfolio::from_json(
            r#"{"experience": [{"company": "Acme", "role": "Eng",
                "description": ["Led migration", "Built search"],
                "duration": {"from": 2020, "to": 2023}}]}"#,
        )
        .unwrap();
        let section: Value = serde_json::from_str(&doc.section_json(Section::Experience)).unwrap();
        assert_eq!(section[0]["description"][1], "Built search");
        assert_eq!(section[0]["duration"]["from"], 2020);

        let job = &doc.experience.as_ref().unwrap()[0];
        assert!(job.description.is_none());
        assert_eq!(job.extra["description"][0], "Led migration");
        let typed: Value = serde_json::to_value(job).unwrap();
        assert_eq!(typed["duration"]["to"], 2023);
    }

    #[test]
    fn test_non_object_records_do_not_fail_the_document() {
        let doc = Portfolio::from_json(
            r#"{"about": "hi", "skills": ["Rust", "Go"], "projects": [{"name": "Folio"}, 7],
                "education": "BSc, State University"}"#,
        )
        .unwrap();
        assert_eq!(doc.about.as_deref(), Some("hi"));
        assert_eq!(doc.skills.as_deref(), Some(&[][..]));
        assert_eq!(doc.record_count(Section::Skills), 2);
        assert_eq!(doc.projects.as_ref().unwrap().len(), 1);
        assert!(doc.education.is_none());
        assert!(doc.has(Section::Education));

        let skills: Value = serde_json::from_str(&doc.section_json(Section::Skills)).unwrap();
        assert_eq!(skills, serde_json::json!(["Rust", "Go"]));
        assert_eq!(
            doc.section_json(Section::Education),
            "\"BSc, State University\""
        );
    }

    #[test]
    fn test_non_object_document_is_an_error() {
        assert!(Portfolio::from_json("[1, 2]").is_err());
    }

    #[test]
    fn test_unknown_keys_survive_serialization() {
        let doc = Portfolio::from_json(
            r#"{"about": "hi", "contact": {"email": "a@b.c"}, "projects": [{"name": "p", "status": "live"}]}"#,
        )
        .unwrap();
        let full: Value = serde_json::from_str(&doc.to_json()).unwrap();
        assert_eq!(full["contact"]["email"], "a@b.c");
        assert_eq!(full["projects"][0]["status"], "live");
        assert!(full.get("skills").is_none());
        assert_eq!(doc.section_names(), vec!["about", "projects", "contact"]);
    }

    #[test]
    fn test_missing_section_renders_empty() {
        let doc = Portfolio::default();
        assert!(doc.is_empty());
        assert_eq!(doc.section_json(Section::Skills), "[]");
        assert_eq!(doc.section_json(Section::About), "\"\"");
        assert_eq!(doc.to_json(), "{}");
    }

    #[test]
    fn test_chunk_is_a_pair_on_the_wire() {
        let chunks: Vec<Chunk> = serde_json::from_str(r#"[["about", "About: hi"]]"#).unwrap();
        assert_eq!(chunks[0].id, "about");
        assert_eq!(
            serde_json::to_string(&chunks).unwrap(),
            r#"[["about","About: hi"]]"#
        );
    }
}
