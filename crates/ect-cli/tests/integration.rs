//! Integration tests for the ect CLI.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn ect(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ect"))
        // Keep the user's config file out of the way.
        .args(["--config", "/nonexistent/ect/config.toml"])
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute command")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn write_cities(dir: &Path) -> String {
    let path = dir.join("cities.csv");
    fs::write(
        &path,
        "name,population,location\n\
         Hamburg,1800000,\"10.0, 53.5\"\n\
         Bergen,285000,\"5.3, 60.4\"\n\
         Tromso,285000,\"18.9, 69.6\"\n",
    )
    .unwrap();
    path.to_string_lossy().into_owned()
}

fn write_graph(dir: &Path) -> String {
    let path = dir.join("lowest.json");
    fs::write(
        &path,
        r#"{
            "name": "cities",
            "inputs": { "file": { "type": "str" } },
            "outputs": { "lowest": "min.return" },
            "steps": [
                { "id": "min", "op": "data_frame_min",
                  "inputs": { "df": "read.return", "var": { "value": "population" } } },
                { "id": "read", "op": "read_csv", "inputs": { "file": "file" } }
            ]
        }"#,
    )
    .unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn test_help() {
    let output = ect(&["--help"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Run operations and workflow graphs"));
}

#[test]
fn test_version() {
    let output = ect(&["--version"]);
    assert!(output.status.success());
    assert_eq!(
        stdout(&output),
        format!("ect {}\n", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn test_list() {
    let output = ect(&["list"]);
    assert!(output.status.success());
    let stdout = stdout(&output);
    assert!(stdout.starts_with("5 operations found\n"), "{stdout}");
    assert!(stdout.contains("   1: read_csv\n"));
    assert!(stdout.contains("   5: data_frame_query\n"));
}

#[test]
fn test_list_pattern_is_case_insensitive() {
    let output = ect(&["list", "--pattern", "DATA_frame_m*"]);
    assert!(output.status.success());
    assert_eq!(
        stdout(&output),
        "2 operations found\n   1: data_frame_min\n   2: data_frame_max\n"
    );

    let output = ect(&["list", "-p", "nothing*"]);
    assert_eq!(stdout(&output), "No operations found\n");
}

#[test]
fn test_list_by_tag() {
    let output = ect(&["list", "--tag", "io"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "One operation found\n   1: read_csv\n");
}

#[test]
fn test_info_json() {
    let output = ect(&["info", "data_frame_query", "--json"]);
    assert!(output.status.success());
    let sig: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(sig["name"], "data_frame_query");
    assert_eq!(sig["version"], "1.0");
    assert_eq!(sig["inputs"]["query_expr"]["type"], "str");
    assert_eq!(sig["accepts_monitor"], true);
}

#[test]
fn test_info_unknown_operation() {
    let output = ect(&["info", "no_such_op"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Unknown operation 'no_such_op'"));
}

#[test]
fn test_run_operation() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write_cities(dir.path());

    let output = ect(&["run", "read_csv", &format!("file={csv}")]);
    assert!(output.status.success(), "{}", stderr(&output));
    let stdout = stdout(&output);
    assert!(stdout.contains("Running operation read_csv"));
    assert!(stdout.contains("Output: name\tpopulation\tlocation\n"), "{stdout}");
    assert!(stdout.contains("(3 rows)"));
}

#[test]
fn test_run_graph() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write_cities(dir.path());
    let graph = write_graph(dir.path());

    let output = ect(&["run", &graph, &format!("file='{csv}'")]);
    assert!(output.status.success(), "{}", stderr(&output));
    let stdout = stdout(&output);
    assert!(stdout.contains("Output: lowest = "), "{stdout}");
    assert!(stdout.contains("Bergen\t285000"));
    assert!(!stdout.contains("Tromso"));
    assert!(stdout.contains("(1 rows)"));
}

#[test]
fn test_run_graph_with_monitor() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write_cities(dir.path());
    let graph = write_graph(dir.path());

    let output = ect(&["run", "--monitor", &graph, &format!("file={csv}")]);
    assert!(output.status.success(), "{}", stderr(&output));
    let stdout = stdout(&output);
    assert!(stdout.contains("cities: started\n"), "{stdout}");
    assert!(stdout.contains("cities: 100%\n"));
    assert!(stdout.contains("cities: done\n"));
}

#[test]
fn test_run_graph_rejects_positional_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let graph = write_graph(dir.path());

    let output = ect(&["run", &graph, "42"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("positional arguments"));
}

#[test]
fn test_run_graph_unbound_input() {
    let dir = tempfile::tempdir().unwrap();
    let graph = write_graph(dir.path());

    let output = ect(&["run", &graph]);
    assert!(!output.status.success());
    assert!(
        stderr(&output).contains("input 'file' required by step 'read' is not bound"),
        "{}",
        stderr(&output)
    );
}

#[test]
fn test_run_rejects_bad_keyword() {
    let output = ect(&["run", "read_csv", "1file=x.csv"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("not a valid identifier"));
}

#[test]
fn test_run_unknown_operation() {
    let output = ect(&["run", "no_such_op"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Unknown operation 'no_such_op'"));
}

#[test]
fn test_quiet_mode() {
    let output = ect(&["-q", "list"]);
    assert!(output.status.success());
    assert!(stdout(&output).is_empty());
}

#[test]
fn test_config_defaults_apply() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    fs::write(&config, "[defaults]\nquiet = true\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_ect"))
        .arg("--config")
        .arg(&config)
        .arg("list")
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());
    assert!(stdout(&output).is_empty());
}

#[test]
fn test_completions() {
    let output = ect(&["completions", "bash"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("ect"));
}
