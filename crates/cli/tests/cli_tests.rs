// End-to-end runs of the `subimpute` binary.
//
// Run with: cargo test -p imputer-cli --test cli_tests -- --nocapture

use std::path::Path;
use std::process::{Command, Output};

fn subimpute() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_subimpute"));
    cmd.env_remove("RUST_LOG");
    cmd
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// A categorical disaggregation of two states into two categories each.
fn write_state_run(dir: &Path, extra: &str) -> std::path::PathBuf {
    std::fs::write(
        dir.join("states.csv"),
        "state,size,deaths,death_rate\nCalifornia,40,10,0.25\nWashington,8,20,2.5\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("splits.csv"),
        "splitvar,state,size\ncat1,California,20\ncat2,California,20\ncat1,Washington,2\ncat2,Washington,6\n",
    )
    .unwrap();
    let config = dir.join("run.toml");
    std::fs::write(
        &config,
        format!(
            r#"{extra}
direction = "disaggregate"
grouping = "categorical"
supergroups_from = "state"
subgroups_from = "splitvar"
count = ["deaths"]
rate = ["death_rate"]

[files]
supergroups = "states.csv"
subgroups = "splits.csv"
"#
        ),
    )
    .unwrap();
    config
}

#[test]
fn run_prints_csv_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_state_run(dir.path(), "");

    let output = subimpute().arg("run").arg(&config).output().expect("subimpute run");
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(
        stdout(&output),
        "splitvar,state,size,deaths,death_rate\n\
         cat1,California,20,5,0.25\n\
         cat2,California,20,5,0.25\n\
         cat1,Washington,2,5,2.5\n\
         cat2,Washington,6,15,2.5\n"
    );
}

#[test]
fn run_json_stdout_is_one_array() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_state_run(dir.path(), "");

    let output = subimpute().arg("run").arg(&config).arg("--json").output().unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let value: serde_json::Value = serde_json::from_str(stdout(&output).trim()).unwrap();
    let rows = value.as_array().expect("array of records");
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[3]["deaths"], serde_json::json!(15.0));
}

#[test]
fn run_writes_output_file_and_summary() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_state_run(dir.path(), "");
    let out = dir.path().join("out.json");

    let output = subimpute()
        .arg("run")
        .arg(&config)
        .arg("-o")
        .arg(&out)
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let summary: serde_json::Value = serde_json::from_str(stdout(&output).trim()).unwrap();
    assert_eq!(summary["records"], serde_json::json!(4));
    assert_eq!(summary["direction"], serde_json::json!("disaggregate"));

    let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(written.as_array().unwrap().len(), 4);
}

#[test]
fn size_mismatch_exits_with_impute_code() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_state_run(dir.path(), "");
    std::fs::write(
        dir.path().join("splits.csv"),
        "splitvar,state,size\ncat1,California,20\ncat2,California,19\ncat1,Washington,2\ncat2,Washington,6\n",
    )
    .unwrap();

    let output = subimpute().arg("run").arg(&config).output().unwrap();
    assert_eq!(output.status.code(), Some(7));
    assert!(stderr(&output).contains("hint:  set normalize = true"), "stderr: {}", stderr(&output));
    assert!(stdout(&output).is_empty());

    let config = write_state_run(dir.path(), "normalize = true");
    std::fs::write(
        dir.path().join("splits.csv"),
        "splitvar,state,size\ncat1,California,20\ncat2,California,19\ncat1,Washington,2\ncat2,Washington,6\n",
    )
    .unwrap();
    let output = subimpute().arg("run").arg(&config).output().unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
}

#[test]
fn bad_config_exits_with_config_code() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_state_run(dir.path(), "rel_tol = -1.0");

    let output = subimpute().arg("validate").arg(&config).output().unwrap();
    assert_eq!(output.status.code(), Some(3));
    assert!(stderr(&output).contains("rel_tol"));
}

#[test]
fn missing_record_file_exits_with_io_code() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_state_run(dir.path(), "");
    std::fs::remove_file(dir.path().join("splits.csv")).unwrap();

    let output = subimpute().arg("run").arg(&config).output().unwrap();
    assert_eq!(output.status.code(), Some(4));
    assert!(stderr(&output).contains("splits.csv"));
}

#[test]
fn validate_reports_group_counts() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_state_run(dir.path(), "");

    let output = subimpute().arg("validate").arg(&config).arg("--json").output().unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let report: serde_json::Value = serde_json::from_str(stdout(&output).trim()).unwrap();
    assert_eq!(report["valid"], serde_json::json!(true));
    assert_eq!(report["supergroups"], serde_json::json!(2));
    assert_eq!(report["subgroups"], serde_json::json!(4));
}

#[test]
fn parse_age_lists_intervals() {
    let output = subimpute()
        .args(["parse-age", "0-4 years", "65+ years", "6 months-<2 years"])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(
        stdout(&output),
        "0-4 years\t[0, 5)\n65+ years\t[65, 100)\n6 months-<2 years\t[0.5, 2)\n"
    );
}

#[test]
fn parse_age_rejects_unknown_label() {
    let output = subimpute().args(["parse-age", "teenagers"]).output().unwrap();
    assert_eq!(output.status.code(), Some(6));
    assert!(stderr(&output).contains("teenagers"));
}

#[test]
fn verbose_logs_go_to_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_state_run(dir.path(), "");

    let output = subimpute().arg("run").arg(&config).arg("-v").output().unwrap();
    assert!(output.status.success());
    assert!(stderr(&output).contains("disaggregating"));
    assert!(!stdout(&output).contains("disaggregating"));
}
