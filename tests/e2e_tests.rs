//! End-to-end CLI tests for mdkb.
//!
//! These tests exercise the full CLI binary with isolated test environments.
//! Each test creates its own content root and config to ensure isolation.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;
use zip::write::FileOptions;

// =============================================================================
// Test Environment Helper
// =============================================================================

/// Isolated test environment with its own content root and config.
struct TestEnv {
    _temp_dir: TempDir,
    root: PathBuf,
    content_path: PathBuf,
    config_path: PathBuf,
}

impl TestEnv {
    /// Create a new empty test environment.
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().to_path_buf();

        let content_path = root.join("content");
        fs::create_dir_all(&content_path).expect("Failed to create content dir");
        let sessions = root.join("sessions");
        fs::create_dir_all(&sessions).expect("Failed to create session dir");

        // Create config pointing to the content root
        let config_path = root.join("config.toml");
        let config_content = format!(
            "[content]\nroot = \"{}\"\n\n[import]\ntemp_roots = [\"{}\"]\n",
            content_path.display(),
            sessions.display()
        );
        fs::write(&config_path, config_content).expect("Failed to write config");

        Self {
            _temp_dir: temp_dir,
            root,
            content_path,
            config_path,
        }
    }

    /// Create a test environment with sample documents.
    fn with_documents() -> Self {
        let env = Self::new();

        env.put(
            "rust/error-handling.md",
            "---\ntitle: \"Error Handling\"\ntags: [\"rust\", \"errors\"]\n---\n# Error Handling in Rust\n\nUse Result and Option types for error handling.\nThe ? operator propagates errors.\n",
        );
        env.put(
            "aws/lambda-patterns.md",
            "---\ntitle: \"Lambda Patterns\"\ntags: [\"aws\", \"lambda\"]\n---\n# AWS Lambda Patterns\n\nBest practices for AWS Lambda functions.\nUse environment variables for configuration.\n",
        );
        env.put("inbox.md", "Loose note at the root about rust toolchains.\n");

        env
    }

    fn put(&self, relative: &str, content: &str) {
        let path = self.content_path.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        fs::write(path, content).expect("Failed to write doc");
    }

    fn zip(&self, name: &str, entries: &[(&str, &str)]) -> PathBuf {
        let path = self.root.join(name);
        let mut writer = zip::ZipWriter::new(File::create(&path).expect("Failed to create zip"));
        for (entry, content) in entries {
            writer
                .start_file(*entry, FileOptions::default())
                .expect("Failed to start entry");
            writer
                .write_all(content.as_bytes())
                .expect("Failed to write entry");
        }
        writer.finish().expect("Failed to finish zip");
        path
    }

    /// Get a Command configured for this test environment.
    fn command(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("mdkb");
        cmd.env("MDKB_CONFIG", &self.config_path);
        cmd
    }

    /// Get the content root.
    fn content(&self) -> &Path {
        &self.content_path
    }

    fn backups(&self) -> PathBuf {
        self.root.join(".backups")
    }
}

fn backup_count(dir: &Path, filename: &str) -> usize {
    fs::read_dir(dir).map_or(0, |entries| {
        entries
            .flatten()
            .filter(|e| {
                e.file_name()
                    .to_string_lossy()
                    .ends_with(&format!("_{filename}"))
            })
            .count()
    })
}

// =============================================================================
// 1. Help / No Command Tests
// =============================================================================

#[test]
fn tc_1_1_no_subcommand_shows_help() {
    let env = TestEnv::new();

    env.command()
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("search"))
        .stdout(predicate::str::contains("import"))
        .stdout(predicate::str::contains("export"));
}

#[test]
fn tc_1_2_version_flag() {
    let env = TestEnv::new();

    env.command()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mdkb"));
}

// =============================================================================
// 2. Search Command Tests
// =============================================================================

#[test]
fn tc_2_1_search_with_matches() {
    let env = TestEnv::with_documents();

    env.command()
        .args(["search", "lambda"])
        .assert()
        .success()
        .stdout(predicate::str::contains("aws/lambda-patterns.md"))
        .stdout(predicate::str::contains("1 result(s) found"));
}

#[test]
fn tc_2_2_search_with_no_matches() {
    let env = TestEnv::with_documents();

    env.command()
        .args(["search", "xyznonexistent123"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "No matches found for 'xyznonexistent123'",
        ));
}

#[test]
fn tc_2_3_search_with_limit() {
    let env = TestEnv::with_documents();

    // "use" appears in both knowledgebase documents
    env.command()
        .args(["search", "use", "--limit", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 result(s) found"));
}

#[test]
fn tc_2_4_search_scoped_to_knowledgebase() {
    let env = TestEnv::with_documents();

    env.command()
        .args(["search", "rust", "--kb", "aws"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No matches found"));

    env.command()
        .args(["search", "rust", "--kb", "root"])
        .assert()
        .success()
        .stdout(predicate::str::contains("inbox.md"))
        .stdout(predicate::str::contains("rust/error-handling.md"));
}

#[test]
fn tc_2_5_search_by_tag() {
    let env = TestEnv::with_documents();

    env.command()
        .args(["search", "tag:lambda"])
        .assert()
        .success()
        .stdout(predicate::str::contains("aws/lambda-patterns.md [100]"))
        .stdout(predicate::str::contains("error-handling").not());
}

#[test]
fn tc_2_6_search_exclusion() {
    let env = TestEnv::with_documents();

    env.command()
        .args(["search", "rust -toolchains"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rust/error-handling.md"))
        .stdout(predicate::str::contains("inbox.md").not());
}

#[test]
fn tc_2_7_search_query_too_long() {
    let env = TestEnv::with_documents();

    env.command()
        .args(["search", &"a".repeat(1001)])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid input"));
}

#[test]
fn tc_2_8_search_json_output() {
    let env = TestEnv::with_documents();

    let output = env
        .command()
        .args(["search", "lambda", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let hits: serde_json::Value = serde_json::from_slice(&output).expect("valid JSON");
    assert_eq!(hits[0]["path"], "aws/lambda-patterns.md");
    assert!(hits[0]["score"].as_u64().unwrap() >= 100);
}

#[test]
fn tc_2_9_suggest_terms() {
    let env = TestEnv::with_documents();

    env.command()
        .args(["suggest", "prop"])
        .assert()
        .success()
        .stdout(predicate::str::contains("propagates"));
}

// =============================================================================
// 3. List / Get Command Tests
// =============================================================================

#[test]
fn tc_3_1_list_all_documents() {
    let env = TestEnv::with_documents();

    env.command()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("rust/error-handling.md"))
        .stdout(predicate::str::contains("aws/lambda-patterns.md"))
        .stdout(predicate::str::contains("inbox.md"))
        .stdout(predicate::str::contains("[aws, lambda]"));
}

#[test]
fn tc_3_2_list_no_documents() {
    let env = TestEnv::new();

    env.command()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No documents"));
}

#[test]
fn tc_3_3_list_knowledgebase() {
    let env = TestEnv::with_documents();

    env.command()
        .args(["list", "--kb", "rust"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rust/error-handling.md"))
        .stdout(predicate::str::contains("lambda").not())
        .stdout(predicate::str::contains("inbox.md").not());
}

#[test]
fn tc_3_4_list_unknown_knowledgebase() {
    let env = TestEnv::with_documents();

    env.command()
        .args(["list", "--kb", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
}

#[test]
fn tc_3_5_get_existing_document() {
    let env = TestEnv::with_documents();

    env.command()
        .args(["get", "aws/lambda-patterns.md"])
        .assert()
        .success()
        .stdout(predicate::str::contains("title: \"Lambda Patterns\""))
        .stdout(predicate::str::contains("# AWS Lambda Patterns"));
}

#[test]
fn tc_3_6_get_body_only() {
    let env = TestEnv::with_documents();

    env.command()
        .args(["get", "aws/lambda-patterns.md", "--body"])
        .assert()
        .success()
        .stdout(predicate::str::contains("# AWS Lambda Patterns"))
        .stdout(predicate::str::contains("title:").not());
}

#[test]
fn tc_3_7_get_document_not_found() {
    let env = TestEnv::with_documents();

    env.command()
        .args(["get", "aws/missing.md"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
}

#[test]
fn tc_3_8_get_path_traversal_attempt() {
    let env = TestEnv::with_documents();

    env.command()
        .args(["get", "../config.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid input"));
}

#[test]
fn tc_3_9_list_knowledgebases() {
    let env = TestEnv::with_documents();

    env.command()
        .arg("kbs")
        .assert()
        .success()
        .stdout(predicate::str::contains("aws"))
        .stdout(predicate::str::contains("Rust"))
        .stdout(predicate::str::contains("1 document(s)"));
}

// =============================================================================
// 4. Write Command Tests
// =============================================================================

#[test]
fn tc_4_1_save_from_stdin() {
    let env = TestEnv::new();

    env.command()
        .args(["save", "Meeting Notes", "--kb", "work"])
        .write_stdin("Agenda\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved work/Meeting-Notes.md"));

    let written = fs::read_to_string(env.content().join("work/Meeting-Notes.md")).unwrap();
    assert_eq!(written, "Agenda\n");
}

#[test]
fn tc_4_2_save_from_file() {
    let env = TestEnv::new();
    let source = env.root.join("draft.txt");
    fs::write(&source, "From a file\n").unwrap();

    env.command()
        .args(["save", "draft.md", "--file"])
        .arg(&source)
        .assert()
        .success();

    assert_eq!(
        fs::read_to_string(env.content().join("draft.md")).unwrap(),
        "From a file\n"
    );
}

#[test]
fn tc_4_3_save_overwrite_creates_backup() {
    let env = TestEnv::with_documents();

    env.command()
        .args(["save", "inbox.md"])
        .write_stdin("Replaced\n")
        .assert()
        .success();

    assert_eq!(backup_count(&env.backups(), "inbox.md"), 1);
    assert_eq!(
        fs::read_to_string(env.content().join("inbox.md")).unwrap(),
        "Replaced\n"
    );
}

#[test]
fn tc_4_4_save_with_new_title_renames() {
    let env = TestEnv::with_documents();

    env.command()
        .args(["save", "aws/lambda-patterns.md", "--title", "Serverless Patterns"])
        .write_stdin("Updated\n")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Saved aws/serverless-patterns.md (renamed from aws/lambda-patterns.md)",
        ));

    assert!(!env.content().join("aws/lambda-patterns.md").exists());
    assert!(env.content().join("aws/serverless-patterns.md").exists());
}

#[test]
fn tc_4_5_new_document_with_tags() {
    let env = TestEnv::new();

    env.command()
        .args([
            "new",
            "--title",
            "Release Checklist",
            "--tags",
            " ops , release ,",
            "--kb",
            "work",
        ])
        .write_stdin("- bump version\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created work/release-checklist.md"));

    let written = fs::read_to_string(env.content().join("work/release-checklist.md")).unwrap();
    assert!(written.starts_with("---\n"));
    assert!(written.contains("title: \"Release Checklist\""));
    assert!(written.contains("tags: [\"ops\", \"release\"]"));
    assert!(written.ends_with("- bump version\n"));
}

#[test]
fn tc_4_6_new_duplicate_document() {
    let env = TestEnv::with_documents();

    env.command()
        .args(["new", "--title", "Error Handling", "--kb", "rust"])
        .write_stdin("again")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Conflict"));
}

#[test]
fn tc_4_7_new_invalid_tag() {
    let env = TestEnv::new();

    env.command()
        .args(["new", "--title", "Tagged", "--tags", "ok,[bad]"])
        .write_stdin("body")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid character"));
}

#[test]
fn tc_4_8_new_title_too_long() {
    let env = TestEnv::new();

    env.command()
        .args(["new", "--title", &"t".repeat(201)])
        .write_stdin("body")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Title too long"));
}

#[test]
fn tc_4_9_save_file_not_found() {
    let env = TestEnv::new();

    env.command()
        .args(["save", "x.md", "--file", "/nonexistent/input.md"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}

#[test]
fn tc_4_10_delete_backs_up_and_removes() {
    let env = TestEnv::with_documents();

    env.command()
        .args(["delete", "rust/error-handling.md"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted rust/error-handling.md"));

    assert!(!env.content().join("rust/error-handling.md").exists());
    assert_eq!(backup_count(&env.backups(), "error-handling.md"), 1);
}

#[test]
fn tc_4_11_delete_missing_document() {
    let env = TestEnv::with_documents();

    env.command()
        .args(["delete", "rust/missing.md"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
}

// =============================================================================
// 5. Tag Command Tests
// =============================================================================

#[test]
fn tc_5_1_tags_list() {
    let env = TestEnv::with_documents();

    env.command()
        .args(["tags", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rust"))
        .stdout(predicate::str::contains("lambda"));
}

#[test]
fn tc_5_2_tags_scoped_after_subcommand() {
    let env = TestEnv::with_documents();

    env.command()
        .args(["tags", "list", "--kb", "aws"])
        .assert()
        .success()
        .stdout(predicate::str::contains("lambda"))
        .stdout(predicate::str::contains("errors").not());
}

#[test]
fn tc_5_3_tags_files_exact() {
    let env = TestEnv::with_documents();
    env.put(
        "rust/errors-deep-dive.md",
        "---\ntags: [\"errors-advanced\"]\n---\nMore.\n",
    );

    env.command()
        .args(["tags", "files", "errors", "--exact"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rust/error-handling.md"))
        .stdout(predicate::str::contains("errors-deep-dive").not());

    env.command()
        .args(["tags", "files", "errors"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rust/errors-deep-dive.md [80]"));
}

#[test]
fn tc_5_4_tags_rename() {
    let env = TestEnv::with_documents();

    env.command()
        .args(["tags", "rename", "aws", "cloud/aws"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Renamed 'aws' to 'cloud/aws' in 1 document(s)",
        ));

    let doc = fs::read_to_string(env.content().join("aws/lambda-patterns.md")).unwrap();
    assert!(doc.contains("\"cloud/aws\""));

    env.command()
        .args(["tags", "tree"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cloud\n  aws"));
}

#[test]
fn tc_5_5_tags_remove() {
    let env = TestEnv::with_documents();

    env.command()
        .args(["tags", "remove", "errors"])
        .assert()
        .success()
        .stdout(predicate::str::contains("from 1 document(s)"));

    let doc = fs::read_to_string(env.content().join("rust/error-handling.md")).unwrap();
    assert!(!doc.contains("\"errors\""));
    assert!(doc.contains("\"rust\""));
}

#[test]
fn tc_5_6_tags_stats() {
    let env = TestEnv::with_documents();

    env.command()
        .args(["tags", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"Tags:\s+4\n").unwrap())
        .stdout(predicate::str::contains("Documents without tags: 1"));
}

#[test]
fn tc_5_7_tags_suggest_from_text() {
    let env = TestEnv::with_documents();

    env.command()
        .args(["tags", "suggest", "Deploying a lambda behind an API"])
        .assert()
        .success()
        .stdout(predicate::str::contains("lambda"));
}

// =============================================================================
// 6. Import / Export Command Tests
// =============================================================================

#[test]
fn tc_6_1_import_analyze_then_confirm() {
    let env = TestEnv::with_documents();
    let archive = env.zip(
        "aws.zip",
        &[("lambda-patterns.md", "incoming"), ("s3-notes.md", "new")],
    );

    let output = env
        .command()
        .args(["import", "analyze", "--json"])
        .arg(&archive)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let analysis: serde_json::Value = serde_json::from_slice(&output).expect("valid JSON");
    assert_eq!(analysis["knowledgebase"], "aws");
    assert_eq!(analysis["new_count"], 1);
    assert_eq!(analysis["conflict_count"], 1);

    let session = analysis["session_id"].as_str().unwrap().to_string();
    env.command()
        .args(["import", "confirm", &session])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Imported 1 file(s) into aws (1 skipped",
        ));

    assert!(env.content().join("aws/s3-notes.md").exists());
    let kept = fs::read_to_string(env.content().join("aws/lambda-patterns.md")).unwrap();
    assert!(kept.contains("Lambda Patterns"));

    // Session is consumed
    env.command()
        .args(["import", "confirm", &session])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expired"));
}

#[test]
fn tc_6_2_import_direct_overwrite_all() {
    let env = TestEnv::with_documents();
    let archive = env.zip("upload.zip", &[("lambda-patterns.md", "incoming")]);

    env.command()
        .args(["import", "direct", "--kb", "aws", "--overwrite-all"])
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 1 file(s) into aws"));

    assert_eq!(
        fs::read_to_string(env.content().join("aws/lambda-patterns.md")).unwrap(),
        "incoming"
    );
    assert_eq!(backup_count(&env.backups(), "lambda-patterns.md"), 1);
}

#[test]
fn tc_6_3_import_rejects_non_zip() {
    let env = TestEnv::new();
    let bogus = env.root.join("notes.tar");
    fs::write(&bogus, "data").unwrap();

    env.command()
        .args(["import", "analyze"])
        .arg(&bogus)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid input"));
}

#[test]
fn tc_6_4_import_confirm_invalid_session() {
    let env = TestEnv::new();

    env.command()
        .args(["import", "confirm", "../../etc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid session id"));
}

#[test]
fn tc_6_5_export_knowledgebase() {
    let env = TestEnv::with_documents();
    let output = env.root.join("out.zip");

    env.command()
        .args(["export", "--kb", "rust", "--output"])
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported 1 document(s)"));

    let mut archive = zip::ZipArchive::new(File::open(&output).unwrap()).unwrap();
    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    assert!(names.contains(&"error-handling.md".to_string()));
    assert!(names.contains(&"index.md".to_string()));
    assert!(names.contains(&"export_info.json".to_string()));

    let mut index = String::new();
    std::io::Read::read_to_string(&mut archive.by_name("index.md").unwrap(), &mut index).unwrap();
    assert!(index.contains("Error Handling"));
}

#[test]
fn tc_6_6_export_empty_knowledgebase_fails() {
    let env = TestEnv::new();
    fs::create_dir_all(env.content().join("empty")).unwrap();

    env.command()
        .args(["export", "--kb", "empty", "--output"])
        .arg(env.root.join("out.zip"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
}

// =============================================================================
// 7. Configuration Tests
// =============================================================================

#[test]
fn tc_7_1_invalid_config_toml() {
    let env = TestEnv::new();
    fs::write(&env.config_path, "[content\nroot = ").unwrap();

    env.command()
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid config"));
}

#[test]
fn tc_7_2_default_knowledgebase_from_config() {
    let env = TestEnv::new();
    let config = fs::read_to_string(&env.config_path).unwrap().replace(
        "[content]\n",
        "[content]\ndefault_knowledgebase = \"inbox\"\n",
    );
    fs::write(&env.config_path, config).unwrap();

    env.command()
        .args(["save", "idea.md"])
        .write_stdin("x")
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved inbox/idea.md"));
}
