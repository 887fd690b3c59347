use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

use folio::config::parse_config;
use folio::generation::{Generator, RuleBasedGenerator};
use folio::selector::{ContextSelector, Strategy};

const PORTFOLIO: &str = r#"{
  "about": "Backend engineer who writes Rust.",
  "skills": [
    {"name": "Rust", "level": "Expert", "category": "languages"},
    {"name": "Go", "level": "Advanced", "category": "languages"}
  ],
  "projects": [
    {"name": "Folio", "summary": "Portfolio Q&A", "stack": ["Rust"], "repo": "https://github.com/me/folio", "demo": "https://folio.dev"}
  ],
  "education": [
    {"degree": "BSc", "field": "CS", "institution": "State University", "graduation": "2018"}
  ],
  "certifications": [
    {"name": "CKA", "issuer": "CNCF", "url": "https://cert.example/cka"}
  ]
}"#;

fn folio_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("folio");
    path
}

fn setup_test_env(enable_dense: bool) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let data_dir = root.join("portfolio");
    fs::create_dir_all(&data_dir).unwrap();
    fs::write(data_dir.join("portfolio.json"), PORTFOLIO).unwrap();

    let config_content = format!(
        r#"[portfolio]
path = "{root}/portfolio/portfolio.json"

[retrieval]
enable_dense = {enable_dense}
index_path = "{root}/portfolio/folio.index"
meta_path = "{root}/portfolio/folio.meta.json"

[embedding]
provider = "disabled"

[generation]
provider = "rule_based"

[server]
bind = "127.0.0.1:0"
"#,
        root = root.display(),
        enable_dense = enable_dense,
    );

    let config_path = config_dir.join("folio.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_folio(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = folio_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("FOLIO_ENABLE_DENSE")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run folio binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_sections_lists_counts() {
    let (_tmp, config) = setup_test_env(false);
    let (stdout, stderr, ok) = run_folio(&config, &["sections"]);
    assert!(ok, "sections failed: {}", stderr);
    assert!(stdout.contains("SECTION"));
    let skills = stdout.lines().find(|l| l.starts_with("skills")).unwrap();
    assert!(skills.contains(" 2 "), "{}", skills);
    let experience = stdout.lines().find(|l| l.starts_with("experience")).unwrap();
    assert!(experience.ends_with("no"), "{}", experience);
}

#[test]
fn test_sections_fails_on_invalid_document() {
    let (tmp, config) = setup_test_env(false);
    fs::write(tmp.path().join("portfolio/portfolio.json"), "{ not json").unwrap();
    let (_stdout, stderr, ok) = run_folio(&config, &["sections"]);
    assert!(!ok);
    assert!(stderr.contains("Invalid portfolio JSON"), "{}", stderr);
}

#[test]
fn test_context_uses_section_hint() {
    let (_tmp, config) = setup_test_env(false);
    let (stdout, stderr, ok) = run_folio(
        &config,
        &["context", "which projects did you build", "--section", "EDUCATION"],
    );
    assert!(ok, "context failed: {}", stderr);
    assert!(stdout.contains("--- Context (keyword) ---"));
    assert!(stdout.contains("State University"));
    assert!(!stdout.contains("Portfolio Q&A"));
}

#[test]
fn test_context_without_match_is_full_document() {
    let (_tmp, config) = setup_test_env(false);
    let (stdout, _stderr, ok) = run_folio(&config, &["context", "hello there"]);
    assert!(ok);
    assert!(stdout.contains("\"about\""));
    assert!(stdout.contains("\"certifications\""));
    // The whole document is an object, so no links are extracted from it.
    assert!(!stdout.contains("--- Links ---"));
}

#[test]
fn test_ask_prints_answer_and_links() {
    let (_tmp, config) = setup_test_env(false);
    let (stdout, stderr, ok) = run_folio(&config, &["ask", "What projects have you built?"]);
    assert!(ok, "ask failed: {}", stderr);
    assert!(stdout.contains("**Folio**"));
    assert!(stdout.contains("Folio - GitHub: https://github.com/me/folio"));
    assert!(stdout.contains("Folio - Demo: https://folio.dev"));
    assert!(stdout.contains("[rule_based | keyword context | chip: Overview]"));
}

#[test]
fn test_dense_enabled_without_index_matches_keyword() {
    let (_tmp_a, keyword_only) = setup_test_env(false);
    let (_tmp_b, dense) = setup_test_env(true);

    for question in ["what are your skills", "any certifications?", "hi"] {
        let (a, _, ok_a) = run_folio(&keyword_only, &["context", question]);
        let (b, _, ok_b) = run_folio(&dense, &["context", question]);
        assert!(ok_a && ok_b);
        assert_eq!(a, b, "differs for {:?}", question);
    }
}

#[test]
fn test_index_status_unbuilt() {
    let (_tmp, config) = setup_test_env(true);
    let (stdout, stderr, ok) = run_folio(&config, &["index", "status"]);
    assert!(ok, "status failed: {}", stderr);
    assert!(stdout.contains("dense retrieval: enabled"));
    assert!(stdout.contains("state: unbuilt"));
}

#[test]
fn test_index_build_requires_embedding_provider() {
    let (tmp, config) = setup_test_env(false);
    let (_stdout, stderr, ok) = run_folio(&config, &["index", "build"]);
    assert!(!ok);
    assert!(stderr.contains("disabled"), "{}", stderr);
    assert!(!tmp.path().join("portfolio/folio.index").exists());
}

#[test]
fn test_missing_config_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let (_stdout, stderr, ok) = run_folio(&tmp.path().join("nope.toml"), &["sections"]);
    assert!(!ok);
    assert!(stderr.contains("Failed to read config file"), "{}", stderr);
}

#[test]
fn test_invalid_config_is_an_error() {
    let (tmp, _) = setup_test_env(false);
    let config = tmp.path().join("config/bad.toml");
    fs::write(&config, "[generation]\nprovider = \"hf_local\"\n").unwrap();
    let (_stdout, stderr, ok) = run_folio(&config, &["sections"]);
    assert!(!ok);
    assert!(stderr.contains("Unknown generation provider"), "{}", stderr);
}

/// Library-level pipeline: edits to the document are seen on the next
/// question once its mtime moves forward.
#[tokio::test]
async fn test_pipeline_picks_up_document_edits() {
    let (tmp, config_path) = setup_test_env(true);
    let config = parse_config(&fs::read_to_string(&config_path).unwrap()).unwrap();
    let selector = ContextSelector::from_config(&config);
    let generator = RuleBasedGenerator;

    let selection = selector.select(None, "what skills do you have").await;
    assert_eq!(selection.strategy, Strategy::Keyword);
    let (answer, _) = generator.answer("what skills do you have", &selection.context).await;
    assert!(answer.contains("2 technologies including Rust, Go"));

    let doc_path = tmp.path().join("portfolio/portfolio.json");
    fs::write(
        &doc_path,
        r#"{"skills": [{"name": "Zig", "category": "languages"}]}"#,
    )
    .unwrap();
    let later = SystemTime::now() + Duration::from_secs(5);
    fs::File::options()
        .write(true)
        .open(&doc_path)
        .unwrap()
        .set_modified(later)
        .unwrap();

    let selection = selector.select(None, "what skills do you have").await;
    let (answer, _) = generator.answer("what skills do you have", &selection.context).await;
    assert!(answer.contains("1 technologies including Zig"), "{}", answer);
    assert_eq!(selector.store().reload_count(), 2);
}
