//! CLI integration tests
//!
//! Exercises the offline commands of the wmtp binary using assert_cmd.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn wmtp() -> Command {
    let mut cmd = Command::cargo_bin("wmtp")
        .expect("Failed to locate wmtp binary - ensure it's built before running tests");
    cmd.env_remove("WMTP_URL")
        .env_remove("WMTP_CERT_HASH")
        .env_remove("RUST_LOG");
    cmd
}

fn config_arg(dir: &TempDir) -> String {
    dir.path().join("client.toml").display().to_string()
}

#[test]
fn test_cli_help() {
    wmtp()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("wmtp"))
        .stdout(predicate::str::contains("WebTransport"));
}

#[test]
fn test_cli_version() {
    wmtp()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("wmtp"));
}

#[test]
fn test_cli_subcommand_help() {
    wmtp()
        .args(["login", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("email"));

    wmtp()
        .args(["send", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--data"));
}

#[test]
fn test_cli_invalid_command() {
    wmtp().arg("frobnicate").assert().failure();
}

#[test]
fn test_cli_login_requires_email() {
    wmtp().arg("login").assert().failure();
}

#[test]
fn test_session_without_saved_session() {
    let dir = TempDir::new().unwrap();
    wmtp()
        .args(["--config", &config_arg(&dir)])
        .arg("--session-dir")
        .arg(dir.path().join("data"))
        .arg("session")
        .assert()
        .success()
        .stdout(predicate::str::contains("No saved session"));
}

#[test]
fn test_session_shows_saved_record() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    std::fs::create_dir_all(&data).unwrap();
    std::fs::write(
        data.join("wmtp_session.json"),
        r#"{"token":"abc123","email":"a@b.com","username":"a"}"#,
    )
    .unwrap();

    wmtp()
        .args(["--config", &config_arg(&dir)])
        .arg("--session-dir")
        .arg(&data)
        .arg("session")
        .assert()
        .success()
        .stdout(predicate::str::contains("abc123"))
        .stdout(predicate::str::contains("a@b.com"));

    wmtp()
        .args(["--config", &config_arg(&dir)])
        .arg("--session-dir")
        .arg(&data)
        .args(["session", "--forget"])
        .assert()
        .success();

    assert!(!data.join("wmtp_session.json").exists());
}

#[test]
fn test_hash_cert() {
    let dir = TempDir::new().unwrap();
    let pem = dir.path().join("cert.pem");
    // Body is base64 of the bytes "wmtp-test-certificate"
    std::fs::write(
        &pem,
        "-----BEGIN CERTIFICATE-----\nd210cC10ZXN0LWNlcnRpZmljYXRl\n-----END CERTIFICATE-----\n",
    )
    .unwrap();

    wmtp()
        .arg("hash-cert")
        .arg(&pem)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "wZAU6EtY6DrmzlvoBfLHEzl9OQq6WvJm6s7+FQdXan4=",
        ));
}

#[test]
fn test_hash_cert_missing_file() {
    wmtp()
        .args(["hash-cert", "/nonexistent/cert.pem"])
        .assert()
        .failure();
}

#[test]
fn test_config_init_then_show() {
    let dir = TempDir::new().unwrap();
    let config = config_arg(&dir);

    wmtp()
        .args(["--config", &config, "config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created configuration file"));
    assert!(Path::new(&config).exists());

    wmtp()
        .args(["--config", &config, "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("url = \"https://localhost:4433\""))
        .stdout(predicate::str::contains("[backoff]"));
}

#[test]
fn test_config_show_applies_overrides() {
    let dir = TempDir::new().unwrap();
    wmtp()
        .args(["--config", &config_arg(&dir)])
        .args(["--url", "https://mail.example.com:4433", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("https://mail.example.com:4433"));
}

#[test]
fn test_config_path() {
    let dir = TempDir::new().unwrap();
    let config = config_arg(&dir);
    wmtp()
        .args(["--config", &config, "config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("client.toml"));
}

#[test]
fn test_non_https_url_is_rejected() {
    let dir = TempDir::new().unwrap();
    wmtp()
        .args(["--config", &config_arg(&dir)])
        .args(["--url", "http://localhost:4433", "ping"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("https://"));
}

#[test]
fn test_bad_cert_hash_is_rejected() {
    let dir = TempDir::new().unwrap();
    wmtp()
        .args(["--config", &config_arg(&dir)])
        .args(["--cert-hash", "not-base64!", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn test_malformed_config_file_is_reported() {
    let dir = TempDir::new().unwrap();
    let config = config_arg(&dir);
    std::fs::write(&config, "url = [not toml").unwrap();

    wmtp()
        .args(["--config", &config, "ping"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}
