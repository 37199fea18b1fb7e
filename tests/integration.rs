use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn bidvault_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("bidvault");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    // Test documents
    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    let mut proposal = String::from(
        "Technical Proposal for Community Health Services\n\n\
         Prepared for the Ministry of Health, funded by the World Bank, 2021.\n\n",
    );
    proposal.push_str(&"The programme will strengthen county clinics and train community health workers. ".repeat(20));
    fs::write(files_dir.join("proposal.txt"), proposal).unwrap();
    fs::write(files_dir.join("short.txt"), "too short to ingest").unwrap();
    fs::write(files_dir.join("slides.pptx"), "unsupported").unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/bidvault.sqlite"

[chunking]
chunk_size = 2000
overlap = 300
min_chunk_size = 200
"#,
        root.display()
    );

    let config_path = config_dir.join("bidvault.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_bidvault(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = bidvault_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run bidvault binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn files_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("files")
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_bidvault(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));

    let db_path = config_path
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("data/bidvault.sqlite");
    assert!(db_path.exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_bidvault(&config_path, &["init"]);
    let (_, _, success2) = run_bidvault(&config_path, &["init"]);
    assert!(success1);
    assert!(success2);
}

#[test]
fn test_dry_run_ingest_txt() {
    let (_tmp, config_path) = setup_test_env();
    run_bidvault(&config_path, &["init"]);

    let file = files_dir(&config_path).join("proposal.txt");
    let (stdout, stderr, success) = run_bidvault(
        &config_path,
        &["ingest", file.to_str().unwrap(), "--dry-run"],
    );
    assert!(success, "stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("ok"), "stdout={}", stdout);
    assert!(stdout.contains("text"));
    assert!(stdout.contains("document id:"));
}

#[test]
fn test_ingest_without_embeddings_requires_dry_run() {
    let (_tmp, config_path) = setup_test_env();
    run_bidvault(&config_path, &["init"]);

    let file = files_dir(&config_path).join("proposal.txt");
    let (_, stderr, success) = run_bidvault(&config_path, &["ingest", file.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("embedding"), "stderr={}", stderr);
}

#[test]
fn test_ingest_unsupported_extension_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_bidvault(&config_path, &["init"]);

    let file = files_dir(&config_path).join("slides.pptx");
    let (stdout, _, success) = run_bidvault(
        &config_path,
        &["ingest", file.to_str().unwrap(), "--dry-run"],
    );
    assert!(!success);
    assert!(stdout.contains("unsupported file type"), "stdout={}", stdout);
}

#[test]
fn test_ingest_too_short_document_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_bidvault(&config_path, &["init"]);

    let file = files_dir(&config_path).join("short.txt");
    let (stdout, _, success) = run_bidvault(
        &config_path,
        &["ingest", file.to_str().unwrap(), "--dry-run"],
    );
    assert!(!success);
    assert!(stdout.contains("FAIL"), "stdout={}", stdout);
}

#[test]
fn test_ingest_folder_dry_run_reports_each_file() {
    let (_tmp, config_path) = setup_test_env();
    run_bidvault(&config_path, &["init"]);

    let dir = files_dir(&config_path);
    let (stdout, stderr, success) = run_bidvault(
        &config_path,
        &["ingest-folder", dir.to_str().unwrap(), "--dry-run"],
    );
    assert!(success, "stdout={}, stderr={}", stdout, stderr);
    // proposal.txt succeeds, short.txt fails, slides.pptx is skipped.
    assert!(stdout.contains("1 ingested, 1 failed (2 files total)"), "stdout={}", stdout);
}

#[test]
fn test_invalid_tag_value_is_rejected() {
    let (_tmp, config_path) = setup_test_env();
    run_bidvault(&config_path, &["init"]);

    let file = files_dir(&config_path).join("proposal.txt");
    let (_, stderr, success) = run_bidvault(
        &config_path,
        &[
            "ingest",
            file.to_str().unwrap(),
            "--dry-run",
            "--sector",
            "astrology",
        ],
    );
    assert!(!success);
    assert!(stderr.contains("astrology"), "stderr={}", stderr);
}

#[test]
fn test_search_without_embeddings_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_bidvault(&config_path, &["init"]);

    let (_, stderr, success) = run_bidvault(&config_path, &["search", "health workers"]);
    assert!(!success);
    assert!(stderr.contains("embedding"), "stderr={}", stderr);
}

#[test]
fn test_stats_on_empty_database() {
    let (_tmp, config_path) = setup_test_env();
    run_bidvault(&config_path, &["init"]);

    let (stdout, stderr, success) = run_bidvault(&config_path, &["stats"]);
    assert!(success, "stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Documents:   0"));
    assert!(stdout.contains("Chunks:      0"));
}

#[test]
fn test_delete_unknown_document_reports_zero() {
    let (_tmp, config_path) = setup_test_env();
    run_bidvault(&config_path, &["init"]);

    let (stdout, _, success) = run_bidvault(&config_path, &["delete", "no-such-doc"]);
    assert!(success);
    assert!(stdout.contains("Deleted 0 chunks"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");
    let (_, stderr, success) = run_bidvault(&missing, &["init"]);
    assert!(!success);
    assert!(stderr.contains("config"), "stderr={}", stderr);
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_tmp, config_path) = setup_test_env();
    // overlap >= chunk_size must be refused
    fs::write(
        &config_path,
        "[db]\npath = \"/tmp/x.sqlite\"\n[chunking]\nchunk_size = 100\noverlap = 100\n",
    )
    .unwrap();
    let (_, stderr, success) = run_bidvault(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("overlap"), "stderr={}", stderr);
}
