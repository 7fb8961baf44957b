//! CLI-boundary version of the "same input, same output" property: two
//! invocations of a side-effect-free command against the same indexed
//! project must agree once the envelope's per-invocation `_meta` (corr_id,
//! timestamp) is stripped out.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn strip_meta(stdout: &[u8]) -> serde_json::Value {
    let mut value: serde_json::Value =
        serde_json::from_slice(stdout).expect("command must emit valid JSON");
    if let Some(obj) = value.as_object_mut() {
        obj.remove("_meta");
    }
    value
}

#[test]
fn search_json_output_is_stable_across_invocations_once_meta_is_stripped() {
    let project = tempfile::tempdir().unwrap();
    fs::write(
        project.path().join("widgets.rs"),
        "fn getUserById(id: u32) -> u32 {\n    id\n}\n",
    )
    .unwrap();

    Command::cargo_bin("pampax")
        .unwrap()
        .arg("--project")
        .arg(project.path())
        .arg("--format")
        .arg("json")
        .arg("index")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"files_indexed\""));

    let run_search = || {
        Command::cargo_bin("pampax")
            .unwrap()
            .arg("--project")
            .arg(project.path())
            .arg("--format")
            .arg("json")
            .arg("search")
            .arg("getUserById")
            .output()
            .unwrap()
    };

    let first = run_search();
    let second = run_search();
    assert!(first.status.success());
    assert!(second.status.success());

    let first_body = strip_meta(&first.stdout);
    let second_body = strip_meta(&second.stdout);
    assert_eq!(
        first_body, second_body,
        "two invocations of a read-only search must agree once _meta is excluded"
    );
}

#[test]
fn health_json_output_is_stable_across_invocations_once_meta_is_stripped() {
    let project = tempfile::tempdir().unwrap();
    fs::write(project.path().join("widgets.rs"), "fn noop() {}\n").unwrap();

    Command::cargo_bin("pampax")
        .unwrap()
        .arg("--project")
        .arg(project.path())
        .arg("index")
        .assert()
        .success();

    let run_health = || {
        Command::cargo_bin("pampax")
            .unwrap()
            .arg("--project")
            .arg(project.path())
            .arg("--format")
            .arg("json")
            .arg("health")
            .output()
            .unwrap()
    };

    let first = run_health();
    let second = run_health();

    let first_body = strip_meta(&first.stdout);
    let second_body = strip_meta(&second.stdout);
    assert_eq!(first_body, second_body);
}
