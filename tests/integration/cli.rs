//! Tests for the tokenledger binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const RUN_LOG: &str = "\
[2025-21-05 14:03:11 INFO] **[OpenAI_Usage_Info Send]**
model: gpt-4
[2025-21-05 14:03:29 INFO] **[OpenAI_Usage_Info Receive]**
prompt_tokens: 1000
completion_tokens: 500
total_tokens: 1500
cost: $0.060000

[2025-21-05 14:03:29 INFO] Chief Executive Officer: **Chief Product Officer<->Chief Executive Officer on : DemandAnalysis, turn 0**

[2025-21-05 14:03:30 INFO] **[OpenAI_Usage_Info Send]**
model: gpt-4
[2025-21-05 14:03:33 INFO] **[OpenAI_Usage_Info Receive]**
prompt_tokens: 2000
completion_tokens: 1000
total_tokens: 3000
cost: $0.120000

[2025-21-05 14:03:33 INFO] Programmer: **Chief Technology Officer<->Programmer on : Coding, turn 0**
";

/// Get a Command instance for the tokenledger binary
#[allow(deprecated)]
fn tokenledger_cmd() -> Command {
    let mut cmd = Command::cargo_bin("tokenledger").expect("Failed to find tokenledger binary");
    cmd.env_remove("TOKENLEDGER_CATALOG")
        .env_remove("TOKENLEDGER_CATALOG_REPLACE")
        .env_remove("RUST_LOG");
    cmd
}

fn write_file(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("Failed to write fixture");
    path
}

#[test]
fn test_parse_writes_csv_to_stdout() {
    let dir = TempDir::new().expect("temp dir");
    let log = write_file(&dir, "run.log", RUN_LOG);

    tokenledger_cmd()
        .arg("parse")
        .arg(&log)
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "role,phase_name,turn,prompt_tokens,completion_tokens,total_tokens\n",
        ))
        .stdout(predicate::str::contains(
            "Chief Executive Officer,DemandAnalysis,0,1000,500,1500",
        ))
        .stdout(predicate::str::contains("Programmer,Coding,0,2000,1000,3000"));
}

#[test]
fn test_parse_timestamped_json_to_file() {
    let dir = TempDir::new().expect("temp dir");
    let log = write_file(&dir, "run.log", RUN_LOG);
    let output = dir.path().join("usage.json");

    tokenledger_cmd()
        .args(["parse", "--timestamped", "--format", "json", "--output"])
        .arg(&output)
        .arg(&log)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&output).expect("report")).expect("json");
    let records = report.as_array().expect("array of records");
    assert_eq!(records.len(), 2);
    assert_eq!(records[1]["phase_name"], "Coding");
    assert_eq!(records[1]["usage_info"]["send_time"], "2025-21-05 14:03:30");
}

#[test]
fn test_parse_rejects_phase_without_usage() {
    let dir = TempDir::new().expect("temp dir");
    let log = write_file(
        &dir,
        "bad.log",
        "[2025-21-05 14:03:29 INFO] Programmer: **[Start Chat] on : Coding, turn 0**\n",
    );

    tokenledger_cmd()
        .arg("parse")
        .arg(&log)
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Protocol violation at line 1"));
}

#[test]
fn test_parse_rejects_truncated_log() {
    let dir = TempDir::new().expect("temp dir");
    let truncated = &RUN_LOG[..RUN_LOG.find("completion_tokens").expect("metric")];
    let log = write_file(&dir, "truncated.log", truncated);

    tokenledger_cmd()
        .arg("parse")
        .arg(&log)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Malformed log"));
}

#[test]
fn test_summary_with_cost() {
    let dir = TempDir::new().expect("temp dir");
    let log = write_file(&dir, "run.log", RUN_LOG);

    tokenledger_cmd()
        .args(["summary", "--timestamped", "--model", "gpt-4"])
        .arg(&log)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "all phases: 2 exchanges, prompt_tokens=3000 completion_tokens=1500 total_tokens=4500",
        ))
        .stdout(predicate::str::contains("Coding: 1 exchanges"))
        .stdout(predicate::str::contains("$0.180000"))
        .stdout(predicate::str::contains("latency: mean 10500 ms"));
}

#[test]
fn test_cost_command() {
    tokenledger_cmd()
        .args([
            "cost",
            "--model",
            "gpt-4",
            "--prompt-tokens",
            "1000",
            "--completion-tokens",
            "500",
        ])
        .assert()
        .success()
        .stdout("$0.060000\n");
}

#[test]
fn test_unknown_model_is_configuration_error() {
    tokenledger_cmd()
        .args([
            "cost",
            "--model",
            "gpt-unknown",
            "--prompt-tokens",
            "1",
            "--completion-tokens",
            "1",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_budget_command_injects_max_completion_tokens() {
    let dir = TempDir::new().expect("temp dir");
    let messages = write_file(
        &dir,
        "messages.json",
        r#"[
            {"role": "system", "content": "You are the Chief Executive Officer."},
            {"role": "user", "content": "Develop a basic Gomoku game."}
        ]"#,
    );

    let output = tokenledger_cmd()
        .args(["budget", "--model", "gpt-4", "--messages"])
        .arg(&messages)
        .output()
        .expect("run budget");
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    let budget = &report["budget"];
    let prompt = budget["prompt_tokens"].as_i64().expect("prompt tokens");
    let expected = 8_192 - (prompt + 30) - 1_000;

    assert_eq!(budget["framing_overhead"], 30);
    assert_eq!(budget["max_completion_tokens"].as_i64(), Some(expected));
    assert_eq!(report["request"]["max_completion_tokens"].as_i64(), Some(expected));
}

#[test]
fn test_catalog_file_overrides_builtin() {
    let dir = TempDir::new().expect("temp dir");
    let catalog = write_file(
        &dir,
        "models.toml",
        r#"
[[models]]
id = "local-llama"
context_window = 4096
prompt_price_per_1k = 0.0
completion_price_per_1k = 0.0

[[models]]
id = "gpt-4"
context_window = 8192
prompt_price_per_1k = 0.01
completion_price_per_1k = 0.02
"#,
    );

    tokenledger_cmd()
        .arg("--catalog")
        .arg(&catalog)
        .args([
            "cost",
            "--model",
            "gpt-4",
            "--prompt-tokens",
            "1000",
            "--completion-tokens",
            "500",
        ])
        .assert()
        .success()
        .stdout("$0.020000\n");

    tokenledger_cmd()
        .arg("--catalog")
        .arg(&catalog)
        .arg("catalog")
        .assert()
        .success()
        .stdout(predicate::str::contains("id = \"local-llama\""))
        .stdout(predicate::str::contains("id = \"gpt-4o-mini\""));
}

#[test]
fn test_catalog_replace_via_environment() {
    let dir = TempDir::new().expect("temp dir");
    let catalog = write_file(
        &dir,
        "models.toml",
        "[[models]]\nid = \"local-llama\"\ncontext_window = 4096\nprompt_price_per_1k = 0.0\ncompletion_price_per_1k = 0.0\n",
    );

    tokenledger_cmd()
        .env("TOKENLEDGER_CATALOG", &catalog)
        .env("TOKENLEDGER_CATALOG_REPLACE", "1")
        .arg("catalog")
        .assert()
        .success()
        .stdout(predicate::str::contains("local-llama"))
        .stdout(predicate::str::contains("gpt-4").not());
}

#[test]
fn test_parse_does_not_read_catalog() {
    let dir = TempDir::new().expect("temp dir");
    let log = write_file(&dir, "run.log", RUN_LOG);
    let broken = write_file(&dir, "broken.toml", "[[models]]\nid = \"x\"\ncontext_window = 0\n");

    tokenledger_cmd()
        .env("TOKENLEDGER_CATALOG", &broken)
        .arg("parse")
        .arg(&log)
        .assert()
        .success()
        .stdout(predicate::str::contains("Programmer,Coding,0,2000,1000,3000"));

    tokenledger_cmd()
        .env("TOKENLEDGER_CATALOG", &broken)
        .args(["summary", "--timestamped"])
        .arg(&log)
        .assert()
        .success();

    tokenledger_cmd()
        .env("TOKENLEDGER_CATALOG", &broken)
        .args([
            "cost",
            "--model",
            "gpt-4",
            "--prompt-tokens",
            "1",
            "--completion-tokens",
            "1",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}
