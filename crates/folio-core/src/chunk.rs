//! Portfolio-to-chunk conversion for the dense index.
//!
//! Each record becomes one [`Chunk`] whose identifier is
//! `<section>:<index>` (the `about` text is the single chunk `about`).
//! The text is a short labelled rendering of the record so that the
//! embedding sees field names alongside values.
//!
//! # Example
//!
//! ```rust
//! use folio_core::chunk::build_chunks;
//! use folio_core::models::Portfolio;
//!
//! let doc = Portfolio::from_json(r#"{"about": "Rust dev", "skills": [{"name": "Rust"}]}"#).unwrap();
//! let chunks = build_chunks(&doc);
//! assert_eq!(chunks[0].id, "about");
//! assert_eq!(chunks[1].id, "skills:0");
//! ```

use crate::models::{
    Certification, Chunk, Education, Experience, Portfolio, Project, Section, Skill,
};

/// Builds the ordered chunk list for a portfolio.
///
/// Order: about, skills, projects, experience, education, certifications;
/// records keep their document order within a section.
pub fn build_chunks(portfolio: &Portfolio) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    if let Some(about) = &portfolio.about {
        chunks.push(Chunk {
            id: Section::About.key().to_string(),
            text: format!("About: {}", about),
        });
    }

    push_section(&mut chunks, Section::Skills, &portfolio.skills, skill_text);
    push_section(&mut chunks, Section::Projects, &portfolio.projects, project_text);
    push_section(&mut chunks, Section::Experience, &portfolio.experience, experience_text);
    push_section(&mut chunks, Section::Education, &portfolio.education, education_text);
    push_section(
        &mut chunks,
        Section::Certifications,
        &portfolio.certifications,
        certification_text,
    );

    chunks
}

fn push_section<T>(
    chunks: &mut Vec<Chunk>,
    section: Section,
    records: &Option<Vec<T>>,
    render: fn(&T) -> String,
) {
    for (idx, record) in records.iter().flatten().enumerate() {
        chunks.push(Chunk {
            id: format!("{}:{}", section.key(), idx),
            text: render(record),
        });
    }
}

fn field(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

fn skill_text(skill: &Skill) -> String {
    let mut text = format!(
        "Skill: {} - Level: {} - Last used: {}",
        field(&skill.name),
        field(&skill.level),
        field(&skill.last_used)
    );
    if let Some(category) = &skill.category {
        text.push_str(&format!(" - Category: {}", category));
    }
    text
}

fn project_text(project: &Project) -> String {
    let mut text = format!(
        "Project: {}\nSummary: {}\nStack: {}\nImpact: {}\n",
        field(&project.name),
        field(&project.summary),
        project.stack.join(", "),
        field(&project.impact)
    );
    if !project.highlights.is_empty() {
        text.push_str(&format!("Highlights: {}", project.highlights.join(" ")));
    }
    text
}

fn experience_text(exp: &Experience) -> String {
    let mut text = format!(
        "Experience: {} at {}\nDuration: {}\nDescription: {}\n",
        field(&exp.role),
        field(&exp.company),
        field(&exp.duration),
        field(&exp.description)
    );
    if !exp.achievements.is_empty() {
        text.push_str(&format!("Achievements: {}", exp.achievements.join(" ")));
    }
    text
}

fn education_text(edu: &Education) -> String {
    let mut text = format!(
        "Education: {} in {} from {}\nGraduated: {}",
        field(&edu.degree),
        field(&edu.field),
        field(&edu.institution),
        field(&edu.graduation)
    );
    if !edu.relevant_courses.is_empty() {
        text.push_str(&format!("\nCourses: {}", edu.relevant_courses.join(", ")));
    }
    text
}

fn certification_text(cert: &Certification) -> String {
    format!(
        "Certification: {} from {} ({})",
        field(&cert.name),
        field(&cert.issuer),
        field(&cert.date)
    )
}
