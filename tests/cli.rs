mod common;

use std::fs;

use assert_cmd::Command;
use common::{TestWorkspace, fixture_path};
use predicates::prelude::*;
use predicates::str::contains;
use serde_json::Value;

/// Binary invocation rooted in `workspace` with its own store and directories.
fn inventory(workspace: &TestWorkspace) -> Command {
    let mut command = Command::cargo_bin("inventory-import").expect("binary exists");
    for key in [
        "BATCH_SIZE",
        "DELIMITER",
        "INPUT_ENCODING",
        "STORE",
        "PROFILE_DIR",
        "UPLOAD_DIR",
        "CACHE_TTL_SECS",
        "DICTIONARY",
    ] {
        command.env_remove(format!("INVENTORY_IMPORT_{key}"));
    }
    command
        .current_dir(workspace.path())
        .args(["--store"])
        .arg(workspace.store_path())
        .args(["--profiles"])
        .arg(workspace.profile_dir())
        .args(["--uploads"])
        .arg(workspace.upload_dir());
    command
}

fn stdout_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("command prints JSON")
}

#[test]
fn inspect_reports_fingerprint_and_resolution() {
    let workspace = TestWorkspace::new();
    let lot = fixture_path("dealer_lot.csv");
    inventory(&workspace)
        .args(["inspect", "-i", lot.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("Delimiter: ','"))
        .stdout(contains("Data rows: 5"))
        .stdout(contains("Columns: 9"))
        .stdout(contains("Profile: default"))
        .stdout(contains("exterior_color"))
        .stdout(contains("Unresolved:"));
}

#[test]
fn preview_pages_through_rows() {
    let workspace = TestWorkspace::new();
    let lot = fixture_path("dealer_lot.csv");
    let assert = inventory(&workspace)
        .args([
            "preview",
            "-i",
            lot.to_str().unwrap(),
            "--page",
            "2",
            "--page-size",
            "2",
        ])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(stdout.starts_with("VIN"));
    assert_eq!(stdout.matches("VIN").count(), 1);
    assert_eq!(stdout.lines().count(), 4);
    assert!(stdout.contains("5YJ3E1EA7KF317000"));
    assert!(stdout.contains("JTDKB20U093470123"));
    assert!(!stdout.contains("1HGCM82633A004352"));
    assert!(!stdout.contains("KNDJN2A20F7123456"));
}

#[test]
fn preview_of_empty_file_prints_nothing() {
    let workspace = TestWorkspace::new();
    let empty = workspace.write("empty.csv", "");
    inventory(&workspace)
        .args(["preview", "-i", empty.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn start_and_batch_drive_an_import_by_offset() {
    let workspace = TestWorkspace::new();
    let lot = fixture_path("dealer_lot.csv");
    let started = inventory(&workspace)
        .args(["start", "-i", lot.to_str().unwrap()])
        .assert()
        .success();
    let session = stdout_json(&started.get_output().stdout);
    assert_eq!(session["total_rows"], 5);
    assert_eq!(session["offset"], 0);

    let first = inventory(&workspace)
        .args(["batch", "-i", lot.to_str().unwrap(), "--offset", "0", "--limit", "3"])
        .assert()
        .success();
    let outcome = stdout_json(&first.get_output().stdout);
    assert_eq!(outcome["added"], 3);
    assert_eq!(outcome["processed"], 3);

    let second = inventory(&workspace)
        .args(["batch", "-i", lot.to_str().unwrap(), "--offset", "3", "--limit", "3"])
        .assert()
        .success();
    let outcome = stdout_json(&second.get_output().stdout);
    assert_eq!(outcome["added"], 2);
    assert_eq!(outcome["processed"], 2);

    let stored: Value =
        serde_json::from_str(&fs::read_to_string(workspace.store_path()).unwrap()).unwrap();
    assert_eq!(stored["records"].as_array().unwrap().len(), 5);
}

#[test]
fn import_then_export_csv() {
    let workspace = TestWorkspace::new();
    let lot = fixture_path("dealer_lot.csv");
    let imported = inventory(&workspace)
        .args(["import", "-i", lot.to_str().unwrap(), "--batch-size", "2"])
        .assert()
        .success();
    let session = stdout_json(&imported.get_output().stdout);
    assert_eq!(session["added"], 5);
    assert_eq!(session["batches"], 3);

    let out = workspace.path().join("export.csv");
    inventory(&workspace)
        .args(["export", "--format", "csv", "-o", out.to_str().unwrap()])
        .assert()
        .success();
    let contents = fs::read_to_string(&out).unwrap();
    assert!(contents.contains("\"Sunroof, Heated Seats\""));

    let mut reader = csv::Reader::from_reader(contents.as_bytes());
    let headers = reader.headers().unwrap().clone();
    let vin_idx = headers.iter().position(|h| h == "vin").expect("vin column");
    let price_idx = headers.iter().position(|h| h == "price").expect("price column");
    let rows = reader.records().map(Result::unwrap).collect::<Vec<_>>();
    assert_eq!(rows.len(), 5);
    assert_eq!(&rows[0][vin_idx], "1HGCM82633A004352");
    assert_eq!(&rows[0][price_idx], "4995");
}

#[test]
fn reimport_is_idempotent() {
    let workspace = TestWorkspace::new();
    let lot = fixture_path("dealer_lot.csv");
    for expected_updates in [0, 5] {
        let assert = inventory(&workspace)
            .args(["import", "-i", lot.to_str().unwrap()])
            .assert()
            .success();
        let session = stdout_json(&assert.get_output().stdout);
        assert_eq!(session["updated"], expected_updates);
    }
    let export = inventory(&workspace)
        .args(["export", "--format", "json"])
        .assert()
        .success();
    let records = stdout_json(&export.get_output().stdout);
    assert_eq!(records.as_array().unwrap().len(), 5);
}

#[test]
fn export_filters_by_make() {
    let workspace = TestWorkspace::new();
    let lot = fixture_path("dealer_lot.csv");
    inventory(&workspace)
        .args(["import", "-i", lot.to_str().unwrap()])
        .assert()
        .success();
    let export = inventory(&workspace)
        .args(["export", "--make", "Tesla"])
        .assert()
        .success();
    let records = stdout_json(&export.get_output().stdout);
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["model"], "Model 3");
}

#[test]
fn saved_profile_is_listed_shown_and_used() {
    let workspace = TestWorkspace::new();
    let feed = fixture_path("dealer_feed.tsv");
    inventory(&workspace)
        .args([
            "profile",
            "save",
            "-i",
            feed.to_str().unwrap(),
            "--id",
            "Metro Motors",
            "--name",
            "Metro Motors nightly feed",
        ])
        .assert()
        .success();
    assert!(workspace.profile_dir().join("metro_motors.yaml").is_file());

    inventory(&workspace)
        .args(["profile", "list"])
        .assert()
        .success()
        .stdout(contains("Metro Motors"));
    inventory(&workspace)
        .args(["profile", "show", "--id", "Metro Motors"])
        .assert()
        .success()
        .stdout(contains("Stock #"));

    let imported = inventory(&workspace)
        .args(["import", "-i", feed.to_str().unwrap()])
        .assert()
        .success();
    let session = stdout_json(&imported.get_output().stdout);
    assert_eq!(session["profile_id"], "Metro Motors");
    assert_eq!(session["added"], 2);
}

#[test]
fn unknown_profile_is_reported() {
    let workspace = TestWorkspace::new();
    inventory(&workspace)
        .args(["profile", "show", "--id", "nobody"])
        .assert()
        .failure()
        .stderr(contains("nobody"));
}

#[test]
fn uploads_are_listed_and_resolved_by_name() {
    let workspace = TestWorkspace::new();
    workspace.write(
        "uploads/tuesday.csv",
        "VIN,Make,Model\n1FTFW1ET5DFC10312,Ford,F-150\n",
    );
    workspace.write("uploads/readme.md", "not a feed");
    inventory(&workspace)
        .arg("files")
        .assert()
        .success()
        .stdout(contains("tuesday.csv"))
        .stdout(contains("readme.md").not());

    let imported = inventory(&workspace)
        .args(["import", "-i", "tuesday.csv"])
        .assert()
        .success();
    assert_eq!(stdout_json(&imported.get_output().stdout)["added"], 1);
}

#[test]
fn missing_input_fails() {
    let workspace = TestWorkspace::new();
    inventory(&workspace)
        .args(["import", "-i", "absent.csv"])
        .assert()
        .failure()
        .stderr(contains("absent.csv"));
}

#[test]
fn config_file_sets_batch_size() {
    let workspace = TestWorkspace::new();
    let config = workspace.write("import.yaml", "batch_size: 4\n");
    let lot = fixture_path("dealer_lot.csv");
    let imported = inventory(&workspace)
        .args(["--config", config.to_str().unwrap()])
        .args(["import", "-i", lot.to_str().unwrap()])
        .assert()
        .success();
    assert_eq!(stdout_json(&imported.get_output().stdout)["batches"], 2);
}

#[test]
fn fields_lists_the_dictionary() {
    let workspace = TestWorkspace::new();
    inventory(&workspace)
        .arg("fields")
        .assert()
        .success()
        .stdout(contains("vin"))
        .stdout(contains("multi_select"));
}
