use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn gx_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_gx"))
}

const VERSES: &str = r#"[
  {"chapter": 1, "verse": 1, "text": "In the beginning God created the heavens and the earth.",
   "hebrew": "בְּרֵאשִׁית בָּרָא אֱלֹהִים אֵת הַשָּׁמַיִם וְאֵת הָאָרֶץ", "strongs": "H7225 H1254 H430 H853 H8064 H853 H776"},
  {"chapter": 1, "verse": 2, "text": "Now the earth was formless and empty.",
   "hebrew": "וְהָאָרֶץ הָיְתָה תֹהוּ וָבֹהוּ", "strongs": "H776 H1961 H8414 H922"},
  {"chapter": 1, "verse": 3, "text": "And God said, Let there be light, and there was light.",
   "hebrew": "וַיֹּאמֶר אֱלֹהִים יְהִי אוֹר וַיְהִי אוֹר", "strongs": "H559 H430 H1961 H216 H1961 H216"},
  {"chapter": 1, "verse": 4, "text": "And God saw the light, that it was good.",
   "hebrew": "וַיַּרְא אֱלֹהִים אֶת הָאוֹר כִּי טוֹב", "strongs": "H7200 H430 H853 H216 H3588 H2896"}
]"#;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();
    fs::write(root.join("data/verses.json"), VERSES).unwrap();

    let config_content = format!(
        r#"[corpus]
verses = "{root}/data/verses.json"
records_dir = "{root}/records"

[db]
path = "{root}/data/gx.sqlite"

[models.tiny]
language = "english"
chunk_size = 60
chunk_overlap = 15

[models.tiny_he]
language = "hebrew"
chunk_size = 40
chunk_overlap = 8

[server]
bind = "127.0.0.1:7332"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("gx.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_gx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = gx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("--progress")
        .arg("off")
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run gx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn records_path(config_path: &Path, model: &str) -> PathBuf {
    config_path
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("records")
        .join(format!("agentic_{}_records.json", model))
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_gx(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("ok"));
    assert!(tmp.path().join("data/gx.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_gx(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_gx(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_chunk_writes_records_for_every_model() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_gx(&config_path, &["chunk"]);
    assert!(success, "chunk failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("chunk tiny\n"));
    assert!(stdout.contains("chunk tiny_he\n"));
    assert!(stdout.ends_with("ok\n"));

    for model in ["tiny", "tiny_he"] {
        let raw = fs::read_to_string(records_path(&config_path, model)).unwrap();
        let records: Vec<serde_json::Value> = serde_json::from_str(&raw).unwrap();
        assert!(!records.is_empty());
        assert_eq!(records[0]["id"], format!("agentic_{}_001", model));
        assert!(records[0]["title"].as_str().unwrap().starts_with("Genesis 1:1"));
        assert_eq!(records[0]["verses"][0]["chapter"], 1);
        assert!(records
            .iter()
            .all(|r| r["verses"].as_array().is_some_and(|v| !v.is_empty())));
    }
}

#[test]
fn test_chunk_dry_run_writes_nothing() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_gx(&config_path, &["chunk", "--model", "tiny", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("chunk tiny (dry-run)"));
    assert!(!stdout.contains("tiny_he"));
    assert!(!records_path(&config_path, "tiny").exists());
}

#[test]
fn test_chunk_unknown_model() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_gx(&config_path, &["chunk", "--model", "nope"]);
    assert!(!success);
    assert!(stderr.contains("Unknown model"));
}

#[test]
fn test_missing_corpus_is_fatal() {
    let (tmp, config_path) = setup_test_env();
    fs::remove_file(tmp.path().join("data/verses.json")).unwrap();

    let (_, stderr, success) = run_gx(&config_path, &["chunk"]);
    assert!(!success);
    assert!(stderr.contains("missing corpus data"));
}

#[test]
fn test_verify_after_chunk() {
    let (_tmp, config_path) = setup_test_env();

    run_gx(&config_path, &["chunk"]);
    let (stdout, stderr, success) = run_gx(&config_path, &["verify"]);
    assert!(success, "verify failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("verify agentic_tiny\n"));
    assert!(stdout.contains("verify agentic_tiny_he\n"));
    assert!(stdout.contains("total issues: "));
}

#[test]
fn test_verify_without_records() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_gx(&config_path, &["verify"]);
    assert!(success);
    assert!(stdout.contains("no chunk record files"));
}

#[test]
fn test_span() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_gx(&config_path, &["span", "1:2", "1:3"]);
    assert!(success);
    assert_eq!(
        stdout.trim_end(),
        "Now the earth was formless and empty. And God said, Let there be light, and there was light."
    );

    let (stdout, _, success) = run_gx(&config_path, &["span", "1:2", "1:2", "--language", "hebrew"]);
    assert!(success);
    assert_eq!(stdout.trim_end(), "וְהָאָרֶץ הָיְתָה תֹהוּ וָבֹהוּ");
}

#[test]
fn test_index_errors_when_disabled() {
    let (_tmp, config_path) = setup_test_env();

    run_gx(&config_path, &["chunk"]);
    let (_, stderr, success) =
        run_gx(&config_path, &["index", "--model", "tiny", "--level", "agentic_tiny"]);
    assert!(!success);
    assert!(stderr.contains("disabled"));
}

#[test]
fn test_index_dry_run_counts_records() {
    let (_tmp, config_path) = setup_test_env();

    run_gx(&config_path, &["chunk", "--model", "tiny"]);
    let (stdout, stderr, success) = run_gx(
        &config_path,
        &["index", "--model", "tiny", "--level", "agentic_tiny", "--dry-run"],
    );
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("index tiny agentic_tiny (dry-run)"));
    assert!(stdout.contains("records needing embeddings: "));
}

#[test]
fn test_index_rejects_mismatched_level() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) =
        run_gx(&config_path, &["index", "--model", "tiny", "--level", "pericope"]);
    assert!(!success);
    assert!(stderr.contains("Invalid combination"));
}

#[test]
fn test_search_errors_when_disabled() {
    let (_tmp, config_path) = setup_test_env();

    run_gx(&config_path, &["init"]);
    let (_, stderr, success) = run_gx(
        &config_path,
        &["search", "--model", "tiny", "--level", "agentic_tiny", "Gen 1:1-2"],
    );
    assert!(!success);
    assert!(stderr.contains("embeddings are disabled"));
}

#[test]
fn test_search_requires_database() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_gx(
        &config_path,
        &["search", "--model", "tiny", "--level", "agentic_tiny", "1:1"],
    );
    assert!(!success);
    assert!(stderr.contains("Database not found"));
}

#[test]
fn test_search_rejects_other_books() {
    let (_tmp, config_path) = setup_test_env();

    run_gx(&config_path, &["init"]);
    let (_, stderr, success) = run_gx(
        &config_path,
        &["search", "--model", "tiny", "--level", "agentic_tiny", "Exodus 1:1"],
    );
    assert!(!success);
    assert!(stderr.contains("only Genesis is indexed"));
}
