//! End-to-end CLI tests for the bookdl binary.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const SAMPLE_CATALOG: &str = r#"{
  "Ιλιάδα": {
    "links": {"PDF": "https://books.example/iliad.pdf", "EPUB": "https://books.example/iliad.epub"},
    "scraped": false,
    "metadata": {"author": "Όμηρος"}
  },
  "Οδύσσεια": {
    "links": {"PDF": "https://books.example/odyssey.pdf"},
    "scraped": true
  },
  "Ποιήματα": {
    "links": {"Audio book": "https://books.example/poems.mp3"},
    "scraped": false
  }
}"#;

/// Command isolated from the user's config and working directory.
fn bookdl(workdir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("bookdl").unwrap();
    cmd.current_dir(workdir)
        .env("XDG_CONFIG_HOME", workdir.join("xdg"))
        .env_remove("RUST_LOG");
    cmd
}

fn write_catalog(dir: &Path, content: &str) -> std::path::PathBuf {
    let path = dir.join("books.json");
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_binary_help_displays_usage() {
    let temp_dir = TempDir::new().unwrap();
    bookdl(temp_dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--wave-size"));
}

#[test]
fn test_binary_version_displays_version() {
    let temp_dir = TempDir::new().unwrap();
    bookdl(temp_dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("bookdl"));
}

#[test]
fn test_binary_invalid_wave_size_returns_error() {
    let temp_dir = TempDir::new().unwrap();
    bookdl(temp_dir.path())
        .args(["--wave-size", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_binary_missing_catalog_fails() {
    let temp_dir = TempDir::new().unwrap();
    bookdl(temp_dir.path())
        .args(["--catalog", "absent.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot load catalog"));
}

#[test]
fn test_binary_dry_run_previews_without_side_effects() {
    let temp_dir = TempDir::new().unwrap();
    let catalog_path = write_catalog(temp_dir.path(), SAMPLE_CATALOG);

    bookdl(temp_dir.path())
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("[fetch] Ιλιάδα: 1 document"))
        .stdout(predicate::str::contains("PDF -> https://books.example/iliad.pdf"))
        .stdout(predicate::str::contains("[skip] Οδύσσεια"))
        .stdout(predicate::str::contains("[audio-only] Ποιήματα"))
        .stdout(predicate::str::contains("Dry run - no files downloaded"));

    assert_eq!(std::fs::read_to_string(&catalog_path).unwrap(), SAMPLE_CATALOG);
    assert!(!temp_dir.path().join("downloads").exists());
    assert!(temp_dir.path().join("book_downloader.log").exists());
}

#[test]
fn test_binary_run_without_fetchable_items_prints_summary() {
    let temp_dir = TempDir::new().unwrap();
    let catalog = r#"{
      "Οδύσσεια": {"links": {"PDF": "https://books.example/odyssey.pdf"}, "scraped": true},
      "Ποιήματα": {"links": {"Audio book": "https://books.example/poems.mp3"}, "extra": 7}
    }"#;
    let catalog_path = write_catalog(temp_dir.path(), catalog);

    bookdl(temp_dir.path())
        .args(["--output-dir", "out", "--log-file", "logs/run.log", "-q"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Skipped (already downloaded): 1"))
        .stdout(predicate::str::contains("Audio only:                   1"))
        .stdout(predicate::str::contains("Total:                        2"));

    assert!(temp_dir.path().join("out").join("audio_books").is_dir());
    assert!(temp_dir.path().join("out").join("mobile_apps").is_dir());
    assert!(temp_dir.path().join("logs").join("run.log").exists());

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&catalog_path).unwrap()).unwrap();
    assert_eq!(saved["Ποιήματα"]["audio_book"], serde_json::json!(true));
    assert_eq!(saved["Ποιήματα"]["extra"], serde_json::json!(7));
    assert_eq!(saved["Οδύσσεια"]["scraped"], serde_json::json!(true));
}

#[test]
fn test_binary_reads_config_file() {
    let temp_dir = TempDir::new().unwrap();
    write_catalog(temp_dir.path(), SAMPLE_CATALOG);
    let config_dir = temp_dir.path().join("xdg").join("bookdl");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("config.toml"), "wave_size = 0\n").unwrap();

    bookdl(temp_dir.path())
        .arg("--dry-run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("wave_size"));
}
