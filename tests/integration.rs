use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn ragdesk_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_ragdesk"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();
    fs::write(
        data_dir.join("billing.md"),
        "# Billing\n\nInvoices are emailed on the first of the month.\n\nOur refund policy allows returns within 30 days.",
    )
    .unwrap();
    fs::write(
        data_dir.join("pricing.md"),
        "# Pricing\n\nThe Starter plan costs $29 per month.\n\nThe Professional plan costs $99 per month.",
    )
    .unwrap();
    fs::write(data_dir.join("draft.txt"), "refund refund refund").unwrap();

    let config_content = format!(
        r#"[corpus]
dir = "{}/data"

[retrieval]
top_k = 3

[generation]
provider = "offline"
fragment_delay_ms = 0

[server]
bind = "127.0.0.1:0"
"#,
        root.display()
    );

    let config_path = config_dir.join("ragdesk.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_ragdesk(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ragdesk_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("OPENAI_API_KEY")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ragdesk binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_search_finds_refund_paragraph() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) =
        run_ragdesk(&config_path, &["search", "What is your refund policy?"]);
    assert!(success, "search failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("1. [20] billing.md §3"), "got: {}", stdout);
    assert!(stdout.contains("Our refund policy allows returns within 30 days."));
    assert!(!stdout.contains("draft.txt"));
}

#[test]
fn test_search_respects_limit() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_ragdesk(&config_path, &["search", "plan costs", "--limit", "1"]);
    assert!(success);
    assert!(stdout.contains("1. "));
    assert!(!stdout.contains("2. "), "got: {}", stdout);
}

#[test]
fn test_search_no_results() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_ragdesk(&config_path, &["search", "kubernetes deployment"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_ask_streams_answer_and_sources() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_ragdesk(&config_path, &["ask", "Can I get a refund?"]);
    assert!(success, "ask failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("30-day money-back guarantee"));
    assert!(stdout.contains("Sources:"));
    assert!(stdout.contains("billing.md §3"));
    assert!(!stdout.contains("[CITATIONS]"));
}

#[test]
fn test_ask_without_matches_apologizes() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_ragdesk(&config_path, &["ask", "Tell me about quantum foam"]);
    assert!(success);
    assert!(stdout.contains("I apologize"));
    assert!(!stdout.contains("Sources:"));
}

#[test]
fn test_corpus_lists_documents() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_ragdesk(&config_path, &["corpus"]);
    assert!(success);
    assert!(stdout.contains("billing.md"));
    assert!(stdout.contains("pricing.md"));
    assert!(stdout.contains("2 documents, 6 paragraphs"), "got: {}", stdout);
}

#[test]
fn test_doc_section() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_ragdesk(&config_path, &["doc", "pricing.md", "--section", "2"]);
    assert!(success);
    assert_eq!(stdout.trim(), "The Starter plan costs $29 per month.");

    let (_, stderr, success) = run_ragdesk(&config_path, &["doc", "missing.md"]);
    assert!(!success);
    assert!(stderr.contains("document not found"));
}

#[test]
fn test_missing_config_falls_back_to_defaults() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");

    let output = Command::new(ragdesk_binary())
        .current_dir(tmp.path())
        .arg("--config")
        .arg(&missing)
        .args(["search", "anything"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("No results."));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("config/bad.toml");
    fs::write(&bad, "[retrieval]\ntop_k = 0\n").unwrap();

    let (_, stderr, success) = run_ragdesk(&bad, &["search", "refund"]);
    assert!(!success);
    assert!(stderr.contains("top_k"));
}
