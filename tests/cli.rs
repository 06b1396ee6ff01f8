use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn run_passages(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_passages"))
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run passages binary");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

fn setup_test_env(extra: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();
    fs::write(
        data_dir.join("Physics_2020.txt"),
        "Newton formulated the laws of motion.",
    )
    .unwrap();

    let config_path = root.join("passages.toml");
    fs::write(
        &config_path,
        format!(
            "[documents]\ndir = \"{}\"\n\n[index]\ndir = \"{}\"\n{}",
            data_dir.display(),
            root.join("vector_db").display(),
            extra
        ),
    )
    .unwrap();

    (tmp, config_path)
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_passages(&tmp.path().join("nope.toml"), &["build"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "stderr: {}", stderr);
}

#[test]
fn test_invalid_config_fails_validation() {
    let (_tmp, config) = setup_test_env("\n[chunking]\nchunk_size = 100\noverlap = 100\n");
    let (_, stderr, success) = run_passages(&config, &["build"]);
    assert!(!success);
    assert!(stderr.contains("overlap"), "stderr: {}", stderr);
}

#[test]
fn test_build_requires_embedding_provider() {
    let (tmp, config) = setup_test_env("");
    let (_, stderr, success) = run_passages(&config, &["build"]);
    assert!(!success);
    assert!(stderr.contains("embedding provider is disabled"), "stderr: {}", stderr);
    assert!(!tmp.path().join("vector_db").exists());
}

#[test]
fn test_generate_requires_generation_provider() {
    let (_tmp, config) = setup_test_env("");
    let (_, stderr, success) = run_passages(&config, &["generate", "who was newton?"]);
    assert!(!success);
    assert!(stderr.contains("generation provider is disabled"), "stderr: {}", stderr);
}

#[test]
fn test_unknown_provider_rejected() {
    let (_tmp, config) = setup_test_env("\n[embedding]\nprovider = \"magic\"\n");
    let (_, stderr, success) = run_passages(&config, &["build"]);
    assert!(!success);
    assert!(stderr.contains("Failed to parse config file"), "stderr: {}", stderr);
}
