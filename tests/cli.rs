//! Tests for the `pipeflow` binary.

use std::{fs, path::Path, process::Command};

use pipeflow::{RunSnapshot, RunStatus};
use serde_json::json;
use tempfile::TempDir;

fn pipeflow(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_pipeflow")).args(args).output().unwrap()
}

fn write_graph(
    dir: &Path,
    graph: serde_json::Value,
) -> String {
    let path = dir.join("graph.json");
    fs::write(&path, serde_json::to_vec(&graph).unwrap()).unwrap();
    path.to_string_lossy().into_owned()
}

fn pipeline() -> serde_json::Value {
    json!({
        "id": "cli",
        "nodes": [
            {"id": "src", "type": "Data Source", "inputs": [], "data": {"data": [{"n": 1}, {"n": 2}]}},
            {"id": "out", "type": "Output Handler", "outputs": []}
        ],
        "connections": [{"source": "src", "target": "out"}]
    })
}

#[test]
fn test_validate_ok_and_invalid() {
    let dir = TempDir::new().unwrap();
    let graph = write_graph(dir.path(), pipeline());
    let output = pipeflow(&["validate", &graph]);
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("--- Execution Order ---"));

    let cyclic = write_graph(
        dir.path(),
        json!({
            "nodes": [{"id": "a", "type": "Data Source"}, {"id": "b", "type": "Data Source"}],
            "connections": [{"source": "a", "target": "b"}, {"source": "b", "target": "a"}]
        }),
    );
    let output = pipeflow(&["validate", &cyclic]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stdout).contains("cycle detected"));
}

#[test]
fn test_run_writes_snapshot() {
    let dir = TempDir::new().unwrap();
    let graph = write_graph(dir.path(), pipeline());
    let state = dir.path().join("state");
    let state_arg = state.to_string_lossy().into_owned();

    let output = pipeflow(&["run", &graph, "--state-dir", &state_arg, "--json", "--seed", "1"]);
    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let events: Vec<serde_json::Value> = stdout.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    let run_id = events[0]["runId"].as_str().unwrap().to_string();

    let status = pipeflow(&["status", &run_id, "--state-dir", &state_arg]);
    assert_eq!(status.status.code(), Some(0));
    let snapshot: RunSnapshot = serde_json::from_slice(&status.stdout).unwrap();
    assert_eq!(snapshot.status, RunStatus::Succeeded);
    assert_eq!(snapshot.node("out").unwrap().output, Some(json!([{"n": 1}, {"n": 2}])));
}

#[test]
fn test_run_exit_codes() {
    let dir = TempDir::new().unwrap();
    let state = dir.path().join("state").to_string_lossy().into_owned();

    let failing = write_graph(dir.path(), json!({"nodes": [{"id": "src", "type": "Data Source", "inputs": []}]}));
    assert_eq!(pipeflow(&["run", &failing, "--state-dir", &state]).status.code(), Some(1));

    let dangling = write_graph(dir.path(), json!({"nodes": [], "connections": [{"source": "x", "target": "y"}]}));
    assert_eq!(pipeflow(&["run", &dangling, "--state-dir", &state]).status.code(), Some(2));
}

#[test]
fn test_cancel_marker() {
    let dir = TempDir::new().unwrap();
    let snapshot = json!({
        "id": "r1",
        "workflowId": "wf",
        "status": "running",
        "createdAt": 1,
        "nodes": {}
    });
    fs::write(dir.path().join("r1.json"), serde_json::to_vec(&snapshot).unwrap()).unwrap();
    let state = dir.path().to_string_lossy().into_owned();

    let output = pipeflow(&["cancel", "r1", "--state-dir", &state]);
    assert_eq!(output.status.code(), Some(0));
    assert!(dir.path().join("r1.cancel").exists());

    assert_ne!(pipeflow(&["cancel", "nope", "--state-dir", &state]).status.code(), Some(0));
    assert_ne!(pipeflow(&["status", "nope", "--state-dir", &state]).status.code(), Some(0));
}
