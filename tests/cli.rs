use assert_cmd::Command;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn temp_workspace() -> TempDir {
    tempfile::tempdir().expect("create tempdir")
}

fn write_dataset(dir: &Path, name: &str, rows: &[(&str, &str)]) {
    let mut text = String::new();
    for (features, class) in rows {
        text.push_str(&format!("\"{features}\",{class}\n"));
    }
    fs::write(dir.join(name), text).expect("write dataset");
}

fn stdout_json(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("stdout is valid JSON")
}

#[test]
fn count_prints_merged_table() {
    let workspace = temp_workspace();
    write_dataset(
        workspace.path(),
        "data.csv",
        &[("[[1,2]]", "0"), ("[[2,3]]", "1")],
    );

    let mut count = Command::cargo_bin("fastnb").expect("binary exists");
    count.current_dir(workspace.path()).args([
        "--quiet",
        "count",
        "data.csv",
        "--chunk-size",
        "1",
        "--per-sample",
        "--no-progress",
    ]);
    let table = stdout_json(&mut count);
    let expected: Value =
        serde_json::from_str(r#"{"0":1,"0|1":1,"0|2":1,"1":1,"1|2":1,"1|3":1}"#).unwrap();
    assert_eq!(table, expected);
}

#[test]
fn count_writes_table_and_metrics_files() {
    let workspace = temp_workspace();
    write_dataset(
        workspace.path(),
        "data.csv",
        &[("[[1],[1]]", "0"), ("[[4]]", "2"), ("[[5,6]]", "2")],
    );

    let mut count = Command::cargo_bin("fastnb").expect("binary exists");
    count.current_dir(workspace.path()).args([
        "--quiet",
        "count",
        "data.csv",
        "--chunk-size",
        "2",
        "--threads",
        "2",
        "--serialized-reads",
        "--no-progress",
        "-o",
        "out/table.json",
        "--metrics",
        "out/metrics.json",
    ]);
    count.assert().success();

    let table: Value = serde_json::from_str(
        &fs::read_to_string(workspace.path().join("out/table.json")).unwrap(),
    )
    .expect("table JSON");
    assert_eq!(table["0"], 2);
    assert_eq!(table["0|1"], 2);
    assert_eq!(table["2"], 3);

    let metrics: Value = serde_json::from_str(
        &fs::read_to_string(workspace.path().join("out/metrics.json")).unwrap(),
    )
    .expect("metrics JSON");
    assert_eq!(metrics["total_records"], 3);
    assert_eq!(metrics["chunks"].as_array().map(Vec::len), Some(2));
}

#[test]
fn count_fails_on_malformed_record() {
    let workspace = temp_workspace();
    write_dataset(
        workspace.path(),
        "data.csv",
        &[("[[1]]", "0"), ("[[2]]", "two"), ("[[3]]", "1")],
    );

    let mut count = Command::cargo_bin("fastnb").expect("binary exists");
    let output = count
        .current_dir(workspace.path())
        .args(["--quiet", "count", "data.csv", "--chunk-size", "1", "--no-progress"])
        .assert()
        .failure()
        .get_output()
        .clone();
    assert!(output.stdout.is_empty(), "no partial table is printed");
    let stderr = String::from_utf8(output.stderr).expect("stderr is UTF-8");
    assert!(
        stderr.contains("malformed record at index 1"),
        "stderr names the record: {stderr}"
    );
}

#[test]
fn count_fails_on_empty_source() {
    let workspace = temp_workspace();
    fs::write(workspace.path().join("empty.csv"), "").expect("write empty file");

    let mut count = Command::cargo_bin("fastnb").expect("binary exists");
    let output = count
        .current_dir(workspace.path())
        .args(["--quiet", "count", "empty.csv", "--no-progress"])
        .assert()
        .failure()
        .get_output()
        .clone();
    let stderr = String::from_utf8(output.stderr).expect("stderr is UTF-8");
    assert!(stderr.contains("contains no records"), "{stderr}");
}

#[test]
fn plan_reports_chunk_ranges_from_config_file() {
    let workspace = temp_workspace();
    let rows: Vec<(String, String)> = (0..7)
        .map(|i| (format!("[[{i}]]"), (i % 2).to_string()))
        .collect();
    let borrowed: Vec<(&str, &str)> = rows.iter().map(|(f, c)| (f.as_str(), c.as_str())).collect();
    write_dataset(workspace.path(), "rows.csv", &borrowed);
    fs::write(
        workspace.path().join("loader.json"),
        r#"{"source_path": "rows.csv", "chunk_size": 3}"#,
    )
    .expect("write config");

    let mut plan = Command::cargo_bin("fastnb").expect("binary exists");
    plan.current_dir(workspace.path())
        .args(["--quiet", "plan", "--config", "loader.json", "--json"]);
    let summary = stdout_json(&mut plan);
    assert_eq!(summary["total_records"], 7);
    assert_eq!(summary["num_chunks"], 3);
    let sizes: Vec<u64> = summary["chunks"]
        .as_array()
        .expect("chunks array")
        .iter()
        .map(|chunk| chunk["size"].as_u64().expect("size"))
        .collect();
    assert_eq!(sizes, vec![3, 3, 1]);
}

#[test]
fn no_headers_flag_overrides_config_file() {
    let workspace = temp_workspace();
    write_dataset(
        workspace.path(),
        "rows.csv",
        &[("[[1]]", "0"), ("[[2]]", "1"), ("[[3]]", "0")],
    );
    fs::write(
        workspace.path().join("loader.json"),
        r#"{"source_path": "rows.csv", "has_headers": true}"#,
    )
    .expect("write config");

    let mut from_config = Command::cargo_bin("fastnb").expect("binary exists");
    from_config
        .current_dir(workspace.path())
        .args(["--quiet", "plan", "--config", "loader.json", "--json"]);
    assert_eq!(stdout_json(&mut from_config)["total_records"], 2);

    let mut overridden = Command::cargo_bin("fastnb").expect("binary exists");
    overridden.current_dir(workspace.path()).args([
        "--quiet",
        "plan",
        "--config",
        "loader.json",
        "--no-headers",
        "--json",
    ]);
    assert_eq!(stdout_json(&mut overridden)["total_records"], 3);

    let mut conflicting = Command::cargo_bin("fastnb").expect("binary exists");
    conflicting
        .current_dir(workspace.path())
        .args(["plan", "rows.csv", "--has-headers", "--no-headers"])
        .assert()
        .failure();
}
