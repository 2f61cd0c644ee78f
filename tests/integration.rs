//! End-to-end tests driving the `llmc` binary against a real working tree
//! and config file, exercising the full init/index/search/graph/repo CLI
//! surface.

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use tempfile::TempDir;

fn llmc_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // deps
    path.pop(); // debug/release
    path.push("llmc");
    if cfg!(windows) {
        path.set_extension("exe");
    }
    path
}

/// Writes a small sample working tree plus an `llmc.toml` into a fresh temp
/// directory and returns it alongside the config path.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let files_dir = tmp.path().join("files");
    fs::create_dir_all(&files_dir).unwrap();

    fs::write(
        files_dir.join("alpha.py"),
        "def add(a, b):\n    return a + b\n\n\nclass Greeter:\n    def greet(self, name):\n        return add(1, 2)\n",
    )
    .unwrap();
    fs::write(
        files_dir.join("notes.md"),
        "# Alpha Notes\n\nThis module implements arithmetic helpers.\n",
    )
    .unwrap();

    let config_path = tmp.path().join("llmc.toml");
    fs::write(
        &config_path,
        format!(
            r#"
[db]
path = ".llmc/index_v2.db"

[indexer]
root = "{root}"
"#,
            root = files_dir.display().to_string().replace('\\', "/")
        ),
    )
    .unwrap();

    (tmp, config_path)
}

fn run_llmc(tmp: &TempDir, config_path: &PathBuf, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(llmc_binary())
        .current_dir(tmp.path())
        .arg("--config")
        .arg(config_path)
        .args(args)
        .output()
        .expect("failed to run llmc binary");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

#[test]
fn init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_llmc(&tmp, &config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn init_is_idempotent() {
    let (tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_llmc(&tmp, &config_path, &["init"]);
    assert!(success1, "first init failed");

    let (_, _, success2) = run_llmc(&tmp, &config_path, &["init"]);
    assert!(success2, "second init failed (not idempotent)");
}

#[test]
fn index_discovers_and_splits_files() {
    let (tmp, config_path) = setup_test_env();

    run_llmc(&tmp, &config_path, &["init"]);
    let (stdout, stderr, success) = run_llmc(&tmp, &config_path, &["index"]);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("indexed 2 files"), "got: {}", stdout);
}

#[test]
fn index_is_idempotent_no_duplicate_spans() {
    let (tmp, config_path) = setup_test_env();

    run_llmc(&tmp, &config_path, &["init"]);
    let (stdout1, _, _) = run_llmc(&tmp, &config_path, &["index"]);
    assert!(stdout1.contains("indexed 2 files"));

    let (stdout2, _, _) = run_llmc(&tmp, &config_path, &["index"]);
    assert!(
        stdout2.contains("0 spans inserted"),
        "expected no new spans on unchanged re-index, got: {}",
        stdout2
    );
}

#[test]
fn index_picks_up_modified_file_on_rerun() {
    let (tmp, config_path) = setup_test_env();

    run_llmc(&tmp, &config_path, &["init"]);
    run_llmc(&tmp, &config_path, &["index"]);

    std::thread::sleep(std::time::Duration::from_millis(50));
    fs::write(
        tmp.path().join("files/alpha.py"),
        "def add(a, b, c):\n    return a + b + c\n",
    )
    .unwrap();

    let (stdout, _, success) = run_llmc(&tmp, &config_path, &["index"]);
    assert!(success);
    assert!(
        stdout.contains("indexed 1 files"),
        "expected only the modified file reindexed, got: {}",
        stdout
    );
}

#[test]
fn index_removes_entries_for_deleted_files() {
    let (tmp, config_path) = setup_test_env();

    run_llmc(&tmp, &config_path, &["init"]);
    run_llmc(&tmp, &config_path, &["index"]);

    fs::remove_file(tmp.path().join("files/notes.md")).unwrap();

    let (stdout, _, success) = run_llmc(&tmp, &config_path, &["index"]);
    assert!(success);
    assert!(
        stdout.contains("1 files removed"),
        "expected one removed file, got: {}",
        stdout
    );
}

#[test]
fn search_finds_indexed_function_by_keyword() {
    let (tmp, config_path) = setup_test_env();

    run_llmc(&tmp, &config_path, &["init"]);
    run_llmc(&tmp, &config_path, &["index"]);

    let (stdout, stderr, success) = run_llmc(&tmp, &config_path, &["search", "add"]);
    assert!(success, "search failed: stdout={}, stderr={}", stdout, stderr);
    assert!(
        stdout.contains("alpha.py"),
        "expected alpha.py in results, got: {}",
        stdout
    );
}

#[test]
fn search_is_deterministic_across_runs() {
    let (tmp, config_path) = setup_test_env();

    run_llmc(&tmp, &config_path, &["init"]);
    run_llmc(&tmp, &config_path, &["index"]);

    let (stdout1, _, _) = run_llmc(&tmp, &config_path, &["search", "arithmetic"]);
    let (stdout2, _, _) = run_llmc(&tmp, &config_path, &["search", "arithmetic"]);
    assert_eq!(stdout1, stdout2, "search results should be deterministic");
}

#[test]
fn search_with_no_matches_does_not_fail() {
    let (tmp, config_path) = setup_test_env();

    run_llmc(&tmp, &config_path, &["init"]);
    run_llmc(&tmp, &config_path, &["index"]);

    let (_, stderr, success) = run_llmc(&tmp, &config_path, &["search", "xyznonexistentterm"]);
    assert!(success, "empty search should not fail: stderr={}", stderr);
}

#[test]
fn graph_build_reports_processed_span_count() {
    let (tmp, config_path) = setup_test_env();

    run_llmc(&tmp, &config_path, &["init"]);
    run_llmc(&tmp, &config_path, &["index"]);

    let (stdout, stderr, success) = run_llmc(&tmp, &config_path, &["graph", "build"]);
    assert!(success, "graph build failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("rebuilt graph for"), "got: {}", stdout);
}

#[test]
fn repo_status_reports_counts_after_indexing() {
    let (tmp, config_path) = setup_test_env();

    run_llmc(&tmp, &config_path, &["init"]);
    run_llmc(&tmp, &config_path, &["index"]);

    let (stdout, stderr, success) = run_llmc(&tmp, &config_path, &["repo", "status"]);
    assert!(success, "repo status failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("files: 2"), "got: {}", stdout);
    assert!(!stdout.contains("last full index: never"), "got: {}", stdout);
}

#[test]
fn repo_status_before_indexing_shows_never() {
    let (tmp, config_path) = setup_test_env();

    run_llmc(&tmp, &config_path, &["init"]);

    let (stdout, _, success) = run_llmc(&tmp, &config_path, &["repo", "status"]);
    assert!(success);
    assert!(stdout.contains("last full index: never"), "got: {}", stdout);
}

#[test]
fn completions_prints_to_stdout_without_a_config_file() {
    let tmp = TempDir::new().unwrap();
    let missing_config = tmp.path().join("does-not-exist.toml");

    let (stdout, stderr, success) = run_llmc(&tmp, &missing_config, &["completions", "bash"]);
    assert!(success, "completions failed: stderr={}", stderr);
    assert!(stdout.contains("llmc"), "expected completion script, got: {}", stdout);
}
