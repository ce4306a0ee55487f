//! CLI smoke tests: help, config path, argument errors, robot output.
//!
//! Every command points at an unreachable engine and a throwaway config so
//! nothing touches the network or the user's files.

mod common;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use infroute::test_utils::write_config;

use common::logger::TestLogger;

const DEAD_ENGINE: &str = "http://127.0.0.1:9";

fn infroute(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("infroute").unwrap();
    cmd.env("INFROUTE_CONFIG", config_dir.path().join("config.toml"))
        .env("OLLAMA_BASE_URL", DEAD_ENGINE)
        .env("NO_COLOR", "1")
        .env_remove("INFROUTE_USAGE_DB")
        .env_remove("RUST_LOG");
    for provider in [
        "ANTHROPIC_API_KEY",
        "OPENAI_API_KEY",
        "GEMINI_API_KEY",
        "GOOGLE_API_KEY",
        "XAI_API_KEY",
        "PERPLEXITY_API_KEY",
    ] {
        cmd.env_remove(provider);
    }
    cmd
}

#[test]
fn help_lists_commands() {
    let dir = TempDir::new().unwrap();
    infroute(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("route"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("models"));
}

#[test]
fn no_command_prints_quickstart() {
    let dir = TempDir::new().unwrap();
    infroute(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("QUICK START"));
}

#[test]
fn status_config_path_prints_override() {
    let dir = TempDir::new().unwrap();
    infroute(&dir)
        .args(["status", "--config-path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn unknown_provider_exits_with_config_error() {
    let log = TestLogger::new("unknown_provider_exits_with_config_error");
    let dir = TempDir::new().unwrap();
    log.phase("execute");
    infroute(&dir)
        .args(["route", "--provider", "acme", "hello"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("ROUTE-C001"))
        .stderr(predicate::str::contains("invalid provider: acme"));
    log.finish_ok();
}

#[test]
fn nothing_configured_exits_with_no_provider() {
    let dir = TempDir::new().unwrap();
    infroute(&dir)
        .args(["route", "--json", "What is 2+2?"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("\"error_code\":\"ROUTE-R002\""));
}

#[test]
fn invalid_config_file_is_reported() {
    let dir = TempDir::new().unwrap();
    let _ = write_config(&dir, "[general\ntimeout_seconds = ");
    infroute(&dir)
        .args(["status"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Invalid config file"));
}

#[test]
fn status_json_has_envelope() {
    let dir = TempDir::new().unwrap();
    let _ = write_config(&dir, "[general]\ntimeout_seconds = 5\n");
    let output = infroute(&dir)
        .args(["status", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(json["schemaVersion"], "infroute.v1");
    assert_eq!(json["command"], "status");
    assert!(json["data"]["providers"].is_array());
    assert_eq!(json["data"]["discovery"]["status"]["state"], "unreachable");
}
