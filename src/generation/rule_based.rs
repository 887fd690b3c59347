//! Templated answers without a language model.

use async_trait::async_trait;
use serde_json::{Map, Value};

use folio_core::models::Link;

use super::{truncate_context, Generator};

const MAX_PROJECT_LINKS: usize = 4;
const MAX_CERT_LINKS: usize = 3;
const MAX_PLAIN_CHARS: usize = 1200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Topic {
    Skills,
    Projects,
    Experience,
    Education,
    Certifications,
    Overview,
}

/// Checked in order; first hit wins.
const TOPIC_WORDS: &[(Topic, &[&str])] = &[
    (Topic::Skills, &["skill", "tech", "stack", "technology"]),
    (Topic::Projects, &["project", "built", "develop", "work on"]),
    (Topic::Experience, &["experience", "work", "job", "company"]),
    (Topic::Education, &["education", "degree", "university", "study"]),
    (Topic::Certifications, &["certification", "certified", "cert"]),
];

impl Topic {
    fn from_question(question: &str) -> Self {
        let q = question.to_lowercase();
        TOPIC_WORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| q.contains(w)))
            .map_or(Topic::Overview, |(topic, _)| *topic)
    }

    fn key(self) -> &'static str {
        match self {
            Topic::Skills => "skills",
            Topic::Projects => "projects",
            Topic::Experience => "experience",
            Topic::Education => "education",
            Topic::Certifications => "certifications",
            Topic::Overview => "about",
        }
    }

    /// Guesses which section a bare record list came from.
    fn sniff(records: &[Value]) -> Option<Self> {
        let first = records.first()?.as_object()?;
        let has = |keys: &[&str]| keys.iter().any(|k| first.contains_key(*k));
        if has(&["summary", "stack", "repo", "demo", "impact"]) {
            Some(Topic::Projects)
        } else if has(&["company", "role", "achievements"]) {
            Some(Topic::Experience)
        } else if has(&["degree", "institution", "graduation"]) {
            Some(Topic::Education)
        } else if has(&["issuer", "url"]) {
            Some(Topic::Certifications)
        } else if has(&["level", "lastUsed", "category"]) {
            Some(Topic::Skills)
        } else {
            None
        }
    }
}

/// Shapes a selected context can take.
enum ContextData {
    /// The whole portfolio document.
    Document(Map<String, Value>),
    /// One section's record list.
    Records(Vec<Value>),
    /// The `about` text.
    About(String),
    /// Non-JSON text, e.g. dense retrieval chunks.
    Plain(String),
}

impl ContextData {
    fn parse(context: &str) -> Self {
        match serde_json::from_str::<Value>(context) {
            Ok(Value::Object(map)) => ContextData::Document(map),
            Ok(Value::Array(items)) => ContextData::Records(items),
            Ok(Value::String(about)) => ContextData::About(about),
            _ => ContextData::Plain(context.to_string()),
        }
    }

    fn records(&self, topic: Topic) -> &[Value] {
        match self {
            ContextData::Document(map) => map
                .get(topic.key())
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
            ContextData::Records(items) => items,
            _ => &[],
        }
    }

    fn about(&self) -> Option<&str> {
        let about = match self {
            ContextData::Document(map) => map.get("about").and_then(Value::as_str),
            ContextData::About(about) => Some(about.as_str()),
            _ => None,
        };
        about.filter(|s| !s.trim().is_empty())
    }
}

/// Answers from the context with fixed templates. Never touches the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedGenerator;

#[async_trait]
impl Generator for RuleBasedGenerator {
    fn name(&self) -> &str {
        "rule_based"
    }

    async fn answer(&self, question: &str, context: &str) -> (String, Vec<Link>) {
        answer_from(question, context)
    }
}

fn answer_from(question: &str, context: &str) -> (String, Vec<Link>) {
    let data = ContextData::parse(context);

    if let ContextData::Plain(text) = &data {
        return answer_plain(text);
    }

    let mut topic = Topic::from_question(question);
    if let ContextData::Records(items) = &data {
        // The selector already picked this section; answer about it.
        if let Some(sniffed) = Topic::sniff(items) {
            topic = sniffed;
        }
    }

    match topic {
        Topic::Skills => (answer_skills(data.records(topic)), Vec::new()),
        Topic::Projects => answer_projects(data.records(topic)),
        Topic::Experience => (answer_experience(data.records(topic)), Vec::new()),
        Topic::Education => (answer_education(data.records(topic)), Vec::new()),
        Topic::Certifications => answer_certifications(data.records(topic)),
        Topic::Overview => (answer_overview(&data), Vec::new()),
    }
}

fn field<'a>(record: &'a Value, key: &str) -> &'a str {
    record.get(key).and_then(Value::as_str).unwrap_or("")
}

fn list<'a>(record: &'a Value, key: &str) -> Vec<&'a str> {
    record
        .get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if prev_alpha {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        prev_alpha = c.is_alphabetic();
    }
    out
}

fn answer_plain(text: &str) -> (String, Vec<Link>) {
    if text.trim().is_empty() {
        return ("I don't have information about that yet.".to_string(), Vec::new());
    }
    (
        format!(
            "Here's what I found in the portfolio:\n\n{}",
            truncate_context(text.trim(), MAX_PLAIN_CHARS)
        ),
        Vec::new(),
    )
}

fn answer_skills(skills: &[Value]) -> String {
    if skills.is_empty() {
        return "I don't have skills information available.".to_string();
    }

    let names: Vec<&str> = skills.iter().take(6).map(|s| field(s, "name")).collect();
    let mut response = format!(
        "I have expertise in {} technologies including {}.",
        skills.len(),
        names.join(", ")
    );

    // Grouped by category, in first-seen order.
    let mut categories: Vec<(String, Vec<&str>)> = Vec::new();
    for skill in skills {
        let category = match field(skill, "category") {
            "" => "other",
            c => c,
        };
        let name = field(skill, "name");
        match categories.iter_mut().find(|(c, _)| c == category) {
            Some((_, members)) => members.push(name),
            None => categories.push((category.to_string(), vec![name])),
        }
    }

    response.push_str("\n\n");
    for (category, members) in &categories {
        let shown: Vec<&str> = members.iter().take(3).copied().collect();
        response.push_str(&format!("• {}: {}\n", title_case(category), shown.join(", ")));
    }
    response.trim().to_string()
}

fn answer_projects(projects: &[Value]) -> (String, Vec<Link>) {
    if projects.is_empty() {
        return ("I don't have project information available.".to_string(), Vec::new());
    }

    let mut links = Vec::new();
    let mut response = format!("I've built {} notable projects:\n\n", projects.len());

    for project in projects.iter().take(3) {
        let name = match field(project, "name") {
            "" => "Unnamed Project",
            n => n,
        };
        response.push_str(&format!("**{}**\n", name));

        let summary = field(project, "summary");
        if !summary.is_empty() {
            response.push_str(&format!("{}\n", summary));
        }
        let stack: Vec<&str> = list(project, "stack").into_iter().take(4).collect();
        if !stack.is_empty() {
            response.push_str(&format!("Stack: {}\n", stack.join(", ")));
        }
        let impact = field(project, "impact");
        if !impact.is_empty() {
            response.push_str(&format!("Impact: {}\n", impact));
        }

        let repo = field(project, "repo");
        if !repo.is_empty() {
            links.push(Link::new(format!("{} - GitHub", name), repo));
        }
        let demo = field(project, "demo");
        if !demo.is_empty() {
            links.push(Link::new(format!("{} - Demo", name), demo));
        }
        response.push('\n');
    }

    links.truncate(MAX_PROJECT_LINKS);
    (response.trim().to_string(), links)
}

fn answer_experience(experience: &[Value]) -> String {
    if experience.is_empty() {
        return "I don't have work experience information available.".to_string();
    }

    let mut response = format!("I have {} professional experiences:\n\n", experience.len());
    for exp in experience.iter().take(3) {
        response.push_str(&format!("**{}** at {}\n", field(exp, "role"), field(exp, "company")));
        for key in ["duration", "description"] {
            let value = field(exp, key);
            if !value.is_empty() {
                response.push_str(&format!("{}\n", value));
            }
        }
        let achievements = list(exp, "achievements");
        if !achievements.is_empty() {
            response.push_str("Key achievements:\n");
            for achievement in achievements.iter().take(2) {
                response.push_str(&format!("• {}\n", achievement));
            }
        }
        response.push('\n');
    }
    response.trim().to_string()
}

fn answer_education(education: &[Value]) -> String {
    if education.is_empty() {
        return "I don't have education information available.".to_string();
    }

    let mut response = String::from("Education:\n\n");
    for edu in education {
        response.push_str(&format!(
            "**{} in {}**\n{}",
            field(edu, "degree"),
            field(edu, "field"),
            field(edu, "institution")
        ));
        let graduation = field(edu, "graduation");
        if !graduation.is_empty() {
            response.push_str(&format!(" ({})", graduation));
        }
        response.push_str("\n\n");
    }
    response.trim().to_string()
}

fn answer_certifications(certs: &[Value]) -> (String, Vec<Link>) {
    if certs.is_empty() {
        return (
            "I don't have certification information available.".to_string(),
            Vec::new(),
        );
    }

    let mut response = String::from("Certifications:\n\n");
    let mut links = Vec::new();
    for cert in certs {
        let name = field(cert, "name");
        response.push_str(&format!("• {}", name));
        let issuer = field(cert, "issuer");
        if !issuer.is_empty() {
            response.push_str(&format!(" - {}", issuer));
        }
        let date = field(cert, "date");
        if !date.is_empty() {
            response.push_str(&format!(" ({})", date));
        }
        response.push('\n');

        let url = field(cert, "url");
        if !url.is_empty() && !name.is_empty() {
            links.push(Link::new(name, url));
        }
    }

    links.truncate(MAX_CERT_LINKS);
    (response.trim().to_string(), links)
}

fn answer_overview(data: &ContextData) -> String {
    if let Some(about) = data.about() {
        return about.to_string();
    }

    let count = |topic: Topic| data.records(topic).len();
    format!(
        "I'm a professional with {} work experiences, {} notable projects, and expertise in {} technologies. \
         Feel free to ask about my skills, projects, or experience!",
        count(Topic::Experience),
        count(Topic::Projects),
        count(Topic::Skills)
    )
}
