#![allow(clippy::uninlined_format_args)]

mod support;

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use serde_json::{json, Value};
use support::read_json;
use tempfile::TempDir;

fn workspace() -> TempDir {
    match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(err) => panic!("failed to create temp dir: {err}"),
    }
}

fn write_json(path: &Path, value: &Value) {
    let body = match serde_json::to_string_pretty(value) {
        Ok(body) => body,
        Err(err) => panic!("failed to encode fixture: {err}"),
    };
    if let Err(err) = fs::write(path, body) {
        panic!("failed to write {}: {err}", path.display());
    }
}

fn cxr_output(dir: &Path, args: &[&str]) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_cxr"));
    command
        .arg("--dataset")
        .arg(dir.join("races.json"))
        .arg("--catalog")
        .arg(dir.join("catalog.json"))
        .env("RUST_LOG", "off");
    for arg in args {
        command.arg(arg);
    }

    match command.output() {
        Ok(output) => output,
        Err(err) => panic!("failed to run cxr command {:?}: {err}", args),
    }
}

fn stdout_json(output: &Output) -> Value {
    match serde_json::from_slice::<Value>(&output.stdout) {
        Ok(value) => value,
        Err(err) => panic!(
            "failed to parse stdout as JSON: {err}\nstdout={}\nstderr={}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        ),
    }
}

fn catalog_fixture() -> Value {
    json!([
        {"id": 1, "series": "UCI World Cup", "venue": "Tábor", "country": "CZE", "date": "2025-01-01", "category": "Elite Men"},
        {"id": 2, "series": "UCI World Cup", "venue": "Benidorm", "country": "ESP", "date": "2025-01-19", "category": "Elite Men"},
        {"id": 3, "series": "UCI World Cup", "venue": "Benidorm", "country": "ESP", "date": "2025-01-19", "category": "Women Elite"},
        {"id": 4, "series": "UCI World Cup", "venue": "Hoogerheide", "country": "NED", "date": "2025-01-26", "category": "Elite Men"},
        {"id": 5, "series": "UCI World Cup", "venue": "Maasmechelen", "country": "BEL", "date": "2025-01-11", "category": "Elite Women"}
    ])
}

fn dataset_fixture() -> Value {
    json!({
        "lastUpdated": "2025-01-12",
        "races": [
            {"date": "2025-01-01", "venue": "Tábor", "country": "CZE", "series": "UCI World Cup",
             "category": "Elite Men", "stars": 3, "gapTo2nd": 12, "gapTo3rd": 30, "within10s": 1,
             "isManual": true},
            {"id": 5, "date": "2025-01-11", "venue": "Maasmechelen", "country": "BEL", "series": "UCI World Cup",
             "category": "Elite Women", "stars": 4, "gapTo2nd": 7, "gapTo3rd": 22, "within10s": 2,
             "provisional": false, "isManual": false},
            {"date": "2024-12-15", "venue": "Namur", "country": "BEL", "series": "UCI World Cup",
             "category": "Elite Men", "stars": 2, "gapTo2nd": 41, "gapTo3rd": 55, "within10s": 1,
             "isManual": false}
        ]
    })
}

fn seed(dir: &Path, gaps: &Value) {
    write_json(&dir.join("catalog.json"), &catalog_fixture());
    write_json(&dir.join("races.json"), &dataset_fixture());
    write_json(&dir.join("gaps.json"), gaps);
}

fn race<'a>(document: &'a Value, date: &str, venue: &str, category: &str) -> &'a Value {
    let races = document["races"]
        .as_array()
        .unwrap_or_else(|| panic!("document has no races array: {document}"));
    races
        .iter()
        .find(|race| race["date"] == date && race["venue"] == venue && race["category"] == category)
        .unwrap_or_else(|| panic!("missing {date}/{venue}/{category} in {document}"))
}

#[test]
fn help_contract_lists_expected_subcommands() {
    let output = match Command::new(env!("CARGO_BIN_EXE_cxr")).arg("--help").output() {
        Ok(value) => value,
        Err(err) => panic!("failed to run help command: {err}"),
    };

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for required in ["rate", "catalog", "run", "dataset"] {
        assert!(
            stdout.contains(required),
            "expected help output to contain subcommand {required}; output={stdout}"
        );
    }
}

#[test]
fn rate_prints_metrics_for_gap_list() {
    let dir = workspace();
    let output = cxr_output(
        dir.path(),
        &["rate", "--gap", "0", "--gap", "s.t.", "--gap", "+0:15"],
    );
    assert!(output.status.success());

    let rating = stdout_json(&output);
    assert_eq!(rating["stars"], json!(5));
    assert_eq!(rating["gapTo2nd"], json!(0));
    assert_eq!(rating["gapTo3rd"], json!(15));
    assert_eq!(rating["within10s"], json!(2));
    assert_eq!(rating["provisional"], json!(true));
}

#[test]
fn rate_without_gaps_is_no_data() {
    let dir = workspace();
    let output = cxr_output(dir.path(), &["rate"]);
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["stars"], json!(0));
}

#[test]
fn catalog_list_skips_future_races() {
    let dir = workspace();
    write_json(&dir.path().join("catalog.json"), &catalog_fixture());

    let output = cxr_output(dir.path(), &["catalog", "list", "--as-of", "2025-01-19"]);
    assert!(output.status.success());

    let targets = stdout_json(&output);
    let ids = targets
        .as_array()
        .map(|races| races.iter().map(|race| race["id"].clone()).collect::<Vec<_>>())
        .unwrap_or_default();
    assert_eq!(ids, vec![json!(1), json!(2), json!(3), json!(5)]);
    assert_eq!(targets[2]["category"], json!("Elite Women"));
}

#[test]
fn run_merges_fresh_ratings_and_keeps_manual_entries() {
    let dir = workspace();
    seed(
        dir.path(),
        &json!({"races": [
            {"id": 1, "gaps": [0, 2, 15]},
            {"id": 2, "gaps": [0, 45, 50]},
            {"id": 3, "gaps": [0, "+1:30"]},
            {"id": 4, "gaps": [0, 1]}
        ]}),
    );

    let gaps = dir.path().join("gaps.json").to_string_lossy().to_string();

    let output = cxr_output(dir.path(), &["run", "--gaps", &gaps, "--as-of", "2025-01-20"]);
    assert!(
        output.status.success(),
        "run failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report = stdout_json(&output);
    assert_eq!(report["targets"], json!(4));
    assert_eq!(report["rated"], json!(3));
    assert_eq!(report["missing"], json!(1));
    assert_eq!(report["rejected"], json!(0));
    assert_eq!(report["merge"]["inserted"], json!(2));
    assert_eq!(report["merge"]["manual_preserved"], json!(1));
    assert_eq!(report["merge"]["carried_forward"], json!(2));
    assert_eq!(report["dataset_entries"], json!(5));

    let saved = read_json(&dir.path().join("races.json"));
    let tabor = race(&saved, "2025-01-01", "Tábor", "Elite Men");
    assert_eq!(tabor["stars"], json!(3));
    assert_eq!(tabor["isManual"], json!(true));

    let benidorm_men = race(&saved, "2025-01-19", "Benidorm", "Elite Men");
    assert_eq!(benidorm_men["stars"], json!(2));
    assert_eq!(benidorm_men["gapTo2nd"], json!(45));
    assert_eq!(benidorm_men["isManual"], json!(false));

    let benidorm_women = race(&saved, "2025-01-19", "Benidorm", "Elite Women");
    assert_eq!(benidorm_women["stars"], json!(1));
    assert_eq!(benidorm_women["gapTo3rd"], Value::Null);

    let maasmechelen = race(&saved, "2025-01-11", "Maasmechelen", "Elite Women");
    assert_eq!(maasmechelen["stars"], json!(4));

    let order = saved["races"]
        .as_array()
        .map(|races| {
            races
                .iter()
                .map(|race| race["venue"].as_str().unwrap_or_default().to_string())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    assert_eq!(
        order,
        vec!["Namur", "Tábor", "Maasmechelen", "Benidorm", "Benidorm"]
    );
}

#[test]
fn malformed_race_is_rejected_without_touching_its_entry() {
    let dir = workspace();
    seed(
        dir.path(),
        &json!({"races": [
            {"id": 5, "gaps": [0, 10, 5]},
            {"id": 2, "gaps": [0, 8]}
        ]}),
    );
    let gaps = dir.path().join("gaps.json").to_string_lossy().to_string();

    let output = cxr_output(dir.path(), &["run", "--gaps", &gaps, "--as-of", "2025-01-20"]);
    assert!(output.status.success());

    let report = stdout_json(&output);
    assert_eq!(report["rejected"], json!(1));
    assert_eq!(report["rated"], json!(1));
    let statuses = report["races"]
        .as_array()
        .map(|races| {
            races
                .iter()
                .filter(|race| race["status"] == "rejected")
                .map(|race| race["id"].clone())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    assert_eq!(statuses, vec![json!(5)]);

    let saved = read_json(&dir.path().join("races.json"));
    let maasmechelen = race(&saved, "2025-01-11", "Maasmechelen", "Elite Women");
    assert_eq!(maasmechelen["stars"], json!(4));
    assert_eq!(maasmechelen["gapTo2nd"], json!(7));
}

#[test]
fn fractional_gap_rejects_its_race_and_the_run_continues() {
    let dir = workspace();
    seed(
        dir.path(),
        &json!({"races": [
            {"id": 2, "gaps": [0, 8]},
            {"id": 5, "gaps": [0, 2.5]}
        ]}),
    );
    let gaps = dir.path().join("gaps.json").to_string_lossy().to_string();

    let output = cxr_output(dir.path(), &["run", "--gaps", &gaps, "--as-of", "2025-01-20"]);
    assert!(
        output.status.success(),
        "stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report = stdout_json(&output);
    assert_eq!(report["rated"], json!(1));
    assert_eq!(report["rejected"], json!(1));

    let saved = read_json(&dir.path().join("races.json"));
    let benidorm = race(&saved, "2025-01-19", "Benidorm", "Elite Men");
    assert_eq!(benidorm["stars"], json!(4));
    assert_eq!(benidorm["gapTo2nd"], json!(8));
    let maasmechelen = race(&saved, "2025-01-11", "Maasmechelen", "Elite Women");
    assert_eq!(maasmechelen["stars"], json!(4));
    assert_eq!(maasmechelen["gapTo2nd"], json!(7));
}

#[test]
fn empty_gap_list_overwrites_automatic_entry_with_no_data() {
    let dir = workspace();
    seed(dir.path(), &json!({"races": [{"id": 5, "gaps": []}]}));
    let gaps = dir.path().join("gaps.json").to_string_lossy().to_string();

    let output = cxr_output(dir.path(), &["run", "--gaps", &gaps, "--as-of", "2025-01-20"]);
    assert!(output.status.success());

    let saved = read_json(&dir.path().join("races.json"));
    let maasmechelen = race(&saved, "2025-01-11", "Maasmechelen", "Elite Women");
    assert_eq!(maasmechelen["stars"], json!(0));
    assert_eq!(maasmechelen["gapTo2nd"], Value::Null);
}

#[test]
fn corrupt_dataset_aborts_before_saving() {
    let dir = workspace();
    seed(dir.path(), &json!({"races": [{"id": 2, "gaps": [0, 1]}]}));
    let dataset = dir.path().join("races.json");
    if let Err(err) = fs::write(&dataset, "{\"races\": [") {
        panic!("failed to corrupt dataset: {err}");
    }
    let gaps = dir.path().join("gaps.json").to_string_lossy().to_string();

    let output = cxr_output(dir.path(), &["run", "--gaps", &gaps, "--as-of", "2025-01-20"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unreadable dataset"));

    let after = fs::read_to_string(&dataset)
        .unwrap_or_else(|err| panic!("failed to read dataset: {err}"));
    assert_eq!(after, "{\"races\": [");

    let check = cxr_output(dir.path(), &["dataset", "check"]);
    assert!(!check.status.success());
}

#[test]
fn dry_run_leaves_dataset_untouched() {
    let dir = workspace();
    seed(dir.path(), &json!({"races": [{"id": 2, "gaps": [0, 1]}]}));
    let before = fs::read_to_string(dir.path().join("races.json"))
        .unwrap_or_else(|err| panic!("failed to read dataset: {err}"));
    let gaps = dir.path().join("gaps.json").to_string_lossy().to_string();

    let output = cxr_output(
        dir.path(),
        &["run", "--gaps", &gaps, "--as-of", "2025-01-20", "--dry-run"],
    );
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["dry_run"], json!(true));

    let after = fs::read_to_string(dir.path().join("races.json"))
        .unwrap_or_else(|err| panic!("failed to read dataset: {err}"));
    assert_eq!(before, after);
}

#[test]
fn dataset_check_reports_counts() {
    let dir = workspace();
    seed(dir.path(), &json!({"races": []}));

    let output = cxr_output(dir.path(), &["dataset", "check"]);
    assert!(output.status.success());

    let check = stdout_json(&output);
    assert_eq!(check["healthy"], json!(true));
    assert_eq!(check["entries"], json!(3));
    assert_eq!(check["manual"], json!(1));
}
