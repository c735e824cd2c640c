//! Integration tests for strata CLI.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

fn strata_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_strata"))
}

/// Run the CLI against a config path that does not exist, so the user's
/// own config never leaks into a test.
fn strata(dir: &Path, args: &[&str]) -> Output {
    let config = dir.join("missing.toml");
    Command::new(strata_bin())
        .arg("--config")
        .arg(&config)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute command")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim_end().to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn test_help() {
    let output = Command::new(strata_bin())
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    assert!(stdout(&output).contains("Pluggable three-stage data export"));
}

#[test]
fn test_list() {
    let dir = tempfile::tempdir().unwrap();
    let output = strata(dir.path(), &["list"]);

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("Available stages"));
    assert!(out.contains("transform:"));
    assert!(out.contains("json"));
    assert!(out.contains("xml-declaration"));
    assert!(out.contains("Total:"));
}

#[test]
fn test_presets() {
    let dir = tempfile::tempdir().unwrap();
    let output = strata(dir.path(), &["presets"]);

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("web"));
    assert!(out.contains("archive"));
    assert!(out.contains("legacy-xml"));
}

#[test]
fn test_export_defaults_to_json() {
    let dir = tempfile::tempdir().unwrap();
    let output = strata(dir.path(), &["export", "  hello  "]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), r#"{"data":"hello"}"#);
}

#[test]
fn test_export_legacy_xml() {
    let dir = tempfile::tempdir().unwrap();
    let output = strata(
        dir.path(),
        &[
            "export",
            "Sample Data",
            "--transform",
            "XML",
            "--format",
            "xml-declaration",
        ],
    );

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(
        stdout(&output),
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <data>Sample Data</data>\n\
         <!-- Exported by strata -->"
    );
}

#[test]
fn test_export_csv_preset() {
    let dir = tempfile::tempdir().unwrap();
    let output = strata(
        dir.path(),
        &["export", "a b c", "--preset", "archive", "--compression", "none"],
    );

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "data,a_b_c");
}

#[test]
fn test_export_unknown_key_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = strata(dir.path(), &["export", "x", "--compression", "zstd"]);

    assert!(!output.status.success());
    assert!(stdout(&output).is_empty());
    assert!(stderr(&output).contains("no compression stage registered for key 'zstd'"));
}

#[test]
fn test_export_empty_input_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = strata(dir.path(), &["export", "   "]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("invalid argument"));
}

#[test]
fn test_export_zero_retry_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = strata(dir.path(), &["export", "x", "--retry", "0"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("invalid configuration"));
}

#[test]
fn test_describe_with_layers() {
    let dir = tempfile::tempdir().unwrap();
    let output = strata(
        dir.path(),
        &["describe", "--log", "--retry", "2", "--format", "indent"],
    );

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("  1. Retry(Logging(Json))"));
    assert!(out.contains("  2. Retry(Logging(None))"));
    assert!(out.contains("  3. Retry(Logging(Indent(2)))"));
}

#[test]
fn test_describe_per_attempt_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let output = strata(
        dir.path(),
        &[
            "describe",
            "--retry",
            "3",
            "--timeout-ms",
            "1000",
            "--per-attempt-timeout",
        ],
    );

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("  1. Retry(Timeout(Json))"));
}

#[test]
fn test_run_pipeline_file() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = dir.path().join("pipeline.yaml");
    fs::write(
        &pipeline,
        r#"
transform:
  key: yaml
  layers:
    - kind: logging
compression: none
format: indent
"#,
    )
    .unwrap();

    let output = strata(dir.path(), &["run", pipeline.to_str().unwrap(), "hi there"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "  data: hi there");
}

#[test]
fn test_describe_pipeline_file_with_layer_flags() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = dir.path().join("pipeline.toml");
    fs::write(
        &pipeline,
        r#"
transform = "csv"
compression = "none"
format = "plain"
"#,
    )
    .unwrap();

    let output = strata(
        dir.path(),
        &[
            "describe",
            "--pipeline",
            pipeline.to_str().unwrap(),
            "--log",
            "--retry",
            "3",
            "--timeout-ms",
            "1000",
        ],
    );

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("  1. Timeout(Retry(Logging(Csv)))"));
    assert!(out.contains("  3. Timeout(Retry(Logging(Plain)))"));
}

#[test]
fn test_export_pipeline_file_with_zero_retry_fails() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = dir.path().join("pipeline.yaml");
    fs::write(&pipeline, "transform: json\ncompression: none\nformat: plain\n").unwrap();

    let output = strata(
        dir.path(),
        &[
            "export",
            "x",
            "--pipeline",
            pipeline.to_str().unwrap(),
            "--retry",
            "0",
        ],
    );

    assert!(!output.status.success());
    assert!(stderr(&output).contains("invalid configuration"));
}

#[test]
fn test_run_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");
    let output = strata(dir.path(), &["run", missing.to_str().unwrap(), "x"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Failed to read pipeline file"));
}

#[test]
fn test_export_observations() {
    let dir = tempfile::tempdir().unwrap();
    let output = strata(
        dir.path(),
        &["export", "hello", "--log", "--retry", "2", "--observations"],
    );

    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let events: Vec<serde_json::Value> = stderr(&output)
        .lines()
        .filter(|line| line.starts_with('{'))
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    let attempts = events.iter().filter(|e| e["kind"] == "attempt").count();
    let timings = events.iter().filter(|e| e["kind"] == "timing").count();
    assert_eq!(attempts, 3);
    assert_eq!(timings, 3);
    assert!(events.iter().all(|e| e.get("label").is_some()));
}

#[test]
fn test_config_file_preset() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    fs::write(
        &config,
        r#"
[defaults]
format = "indent"

[presets.shout]
transform = "xml"
"#,
    )
    .unwrap();

    let output = Command::new(strata_bin())
        .arg("--config")
        .arg(&config)
        .args(["export", "loud", "--preset", "shout"])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "  <data>loud</data>");
}

#[test]
fn test_broken_config_warns_and_continues() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    fs::write(&config, "this is [not toml").unwrap();

    let output = Command::new(strata_bin())
        .arg("--config")
        .arg(&config)
        .args(["export", "ok"])
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), r#"{"data":"ok"}"#);
    assert!(stderr(&output).contains("Failed to parse config file"));
}

#[test]
fn test_export_from_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let mut child = Command::new(strata_bin())
        .arg("--config")
        .arg(dir.path().join("missing.toml"))
        .args(["export", "-", "--transform", "csv"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn command");

    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"from stdin\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "data,from_stdin");
}
