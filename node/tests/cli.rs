use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{json, Value};
use tempfile::tempdir;

fn stdout_json(args: &[&str]) -> Value {
    let output = cargo_bin_cmd!("ledger-node")
        .args(args)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).expect("json")
}

fn mint_requests() -> Value {
    json!({
        "requests": [
            { "recipient": "111", "range_start": "0", "range_end": "10" },
            { "recipient": "222", "range_start": "11", "range_end": "15" }
        ]
    })
}

#[test]
fn mint_writes_chain_that_verifies() {
    let temp = tempdir().expect("tempdir");
    let input = temp.path().join("mint.json");
    let out = temp.path().join("chain.json");
    fs::write(&input, mint_requests().to_string()).expect("write requests");

    cargo_bin_cmd!("ledger-node")
        .args(["mint", "--input"])
        .arg(&input)
        .arg("--out")
        .arg(&out)
        .assert()
        .success();

    let chain: Value = serde_json::from_slice(&fs::read(&out).expect("chain")).expect("json");
    assert_eq!(chain["step_in"].as_array().expect("step_in").len(), 2);
    assert_eq!(chain["private_inputs"].as_array().expect("rounds").len(), 2);
    assert_eq!(chain["private_inputs"][0]["sender"], "0");

    let state = stdout_json(&["verify", "--input", out.to_str().expect("utf8 path")]);
    assert_eq!(state, chain["expected"]);
}

#[test]
fn keygen_sign_withdraw_verify_flow() {
    let temp = tempdir().expect("tempdir");
    let keys = stdout_json(&["keygen", "--seed", "alice"]);
    let secret = keys["secret_key"].as_str().expect("secret hex");
    let address = keys["address"].as_str().expect("address");

    let request = stdout_json(&[
        "sign",
        "--secret-key",
        secret,
        "--leaf-index",
        "0",
        "--start",
        "0",
        "--end",
        "10",
    ]);
    assert_eq!(request["sender"], address);

    let input = temp.path().join("withdraw.json");
    let batch = json!({
        "ledger": [{ "owner": address, "range_start": "0", "range_end": "10" }],
        "requests": [request],
    });
    fs::write(&input, batch.to_string()).expect("write batch");
    let chain = stdout_json(&["withdraw", "--input", input.to_str().expect("utf8 path")]);
    assert_eq!(chain["private_inputs"][0]["recipient"], "0");
    assert_eq!(chain["private_inputs"][0]["pubkey"].as_array().expect("pubkey").len(), 2);

    let chain_path = temp.path().join("chain.json");
    fs::write(&chain_path, chain.to_string()).expect("write chain");
    cargo_bin_cmd!("ledger-node")
        .args(["verify", "--input"])
        .arg(&chain_path)
        .assert()
        .success();
}

#[test]
fn tampered_chain_is_rejected() {
    let temp = tempdir().expect("tempdir");
    let input = temp.path().join("mint.json");
    fs::write(&input, mint_requests().to_string()).expect("write requests");
    let mut chain = stdout_json(&["mint", "--input", input.to_str().expect("utf8 path")]);
    chain["private_inputs"][1]["recipient"] = json!("333");

    let chain_path = temp.path().join("chain.json");
    fs::write(&chain_path, chain.to_string()).expect("write chain");
    cargo_bin_cmd!("ledger-node")
        .args(["verify", "--input"])
        .arg(&chain_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("chain rejected"));
}

#[test]
fn config_file_and_flags_bound_the_ledger() {
    let temp = tempdir().expect("tempdir");
    let input = temp.path().join("mint.json");
    fs::write(&input, mint_requests().to_string()).expect("write requests");
    let config = temp.path().join("ledger.json");
    fs::write(&config, br#"{"ledger_depth": 1}"#).expect("write config");

    // Depth 1 holds both requests.
    cargo_bin_cmd!("ledger-node")
        .arg("--config")
        .arg(&config)
        .args(["mint", "--input"])
        .arg(&input)
        .assert()
        .success();

    let crowded = temp.path().join("crowded.json");
    fs::write(
        &crowded,
        json!({
            "ledger": [{ "owner": "9", "range_start": "0", "range_end": "1" }],
            "requests": mint_requests()["requests"],
        })
        .to_string(),
    )
    .expect("write requests");
    cargo_bin_cmd!("ledger-node")
        .arg("--config")
        .arg(&config)
        .args(["mint", "--input"])
        .arg(&crowded)
        .assert()
        .failure()
        .stderr(predicate::str::contains("mint batch failed"));

    // The flag overrides the file.
    cargo_bin_cmd!("ledger-node")
        .arg("--config")
        .arg(&config)
        .args(["--ledger-depth", "3", "mint", "--input"])
        .arg(&crowded)
        .assert()
        .success();
}

#[test]
fn filter_emits_five_element_step_input() {
    let temp = tempdir().expect("tempdir");
    let input = temp.path().join("filter.json");
    let batch = json!({
        "snapshots": [
            [
                { "owner": "1234", "range_start": "0", "range_end": "10" },
                { "owner": "5678", "range_start": "11", "range_end": "15" }
            ],
            [
                { "owner": "1234", "range_start": "0", "range_end": "10" },
                { "owner": "1234", "range_start": "11", "range_end": "15" }
            ]
        ],
        "claims": [
            { "block_number": 0, "state_index": 0 },
            { "block_number": 0, "state_index": 1 }
        ]
    });
    fs::write(&input, batch.to_string()).expect("write batch");
    let chain = stdout_json(&["filter", "--input", input.to_str().expect("utf8 path")]);
    assert_eq!(chain["step_in"].as_array().expect("step_in").len(), 5);
    assert_eq!(chain["expected"][4], "1");
    assert!(chain["private_inputs"][0].get("history_pathElements").is_some());
}

#[test]
fn missing_input_reports_path() {
    cargo_bin_cmd!("ledger-node")
        .args(["mint", "--input", "/nonexistent/requests.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));
}
